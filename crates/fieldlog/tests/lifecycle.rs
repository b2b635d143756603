//! Integration tests for the log lifecycle.
//!
//! Covers the path a device takes end to end:
//! 1. Root discovery on a simulated mount parent
//! 2. Writing through the rotating sink with bounded retention
//! 3. Listing, tailing and resolving names across roots
//! 4. Streaming zip downloads of selected and all files

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fieldlog::{
    DiskSpace, FieldlogConfig, FileSelector, FixedDiskSpace, LogError, LogService, NormalizedLine,
    RootKind, TailFormat, TailOutput, TailRequest, WriteOutcome,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

struct Device {
    _base: TempDir,
    local: PathBuf,
    sd: PathBuf,
    config: FieldlogConfig,
}

/// A device with a local root and one removable volume mounted at `mnt/usb0`.
fn device() -> Device {
    let base = TempDir::new().expect("temp dir");
    let local = base.path().join("app/fieldlog");
    let mnt = base.path().join("mnt");
    let sd = mnt.join("usb0/fieldlog");
    fs::create_dir_all(&sd).expect("mkdir sd");

    let mut config = FieldlogConfig::default();
    config.roots.local_dir = Some(local.clone());
    config.roots.mount_parents = vec![mnt];
    config.writer.max_file_bytes = 64;
    config.writer.max_archives = 5;
    config.writer.min_free_bytes = 1024;

    Device {
        _base: base,
        local,
        sd,
        config,
    }
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, content).expect("write");
}

fn zip_entries(bytes: Vec<u8>) -> Vec<(String, String)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut entries: Vec<(String, String)> = (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).expect("entry");
            let mut content = String::new();
            file.read_to_string(&mut content).expect("read entry");
            (file.name().to_string(), content)
        })
        .collect();
    entries.sort();
    entries
}

fn plenty() -> Arc<dyn DiskSpace> {
    Arc::new(FixedDiskSpace::new(u64::MAX))
}

// ============================================================================
// Discovery and writing
// ============================================================================

#[test]
fn sink_lands_on_removable_root() {
    let dev = device();
    let svc = LogService::from_config(&dev.config).expect("service");

    let roots = svc.roots();
    assert_eq!(roots.len(), 2);
    assert!(roots.iter().any(|r| r.id == "local" && r.kind == RootKind::Local));
    assert!(roots.iter().any(|r| r.id == "sd-usb0" && r.path == dev.sd));

    let writer = svc.open_writer(plenty()).expect("writer");
    assert_eq!(writer.path(), dev.sd.join("api.log"));
    assert!(dev.local.is_dir());
}

#[tokio::test]
async fn volume_mounted_after_startup_is_served() {
    let dev = device();
    let svc = LogService::from_config(&dev.config).expect("service");
    assert_eq!(svc.roots().len(), 2);

    let mnt = dev.sd.parent().and_then(Path::parent).expect("mount parent");
    write(&mnt.join("usb1/fieldlog"), "app.log", "late volume\n");

    assert_eq!(svc.roots().len(), 3);
    let listed = svc.list_logs(false);
    assert!(
        listed.iter().any(|l| l.name == "app.log" && l.root == "sd-usb1"),
        "{listed:?}"
    );

    let output = svc
        .tail(
            &TailRequest::new("app.log", "sd-usb1").with_format(TailFormat::Raw),
            CancellationToken::new(),
        )
        .await
        .expect("tail");
    assert_eq!(output, TailOutput::Raw("late volume".to_string()));
}

#[test]
fn sink_stays_local_when_removable_not_preferred() {
    let mut dev = device();
    dev.config.roots.prefer_removable_sink = false;
    let svc = LogService::from_config(&dev.config).expect("service");
    let writer = svc.open_writer(plenty()).expect("writer");
    assert_eq!(writer.path(), dev.local.join("api.log"));
}

#[test]
fn eight_rotations_leave_five_archives() {
    let dev = device();
    let svc = LogService::from_config(&dev.config).expect("service");
    let writer = svc.open_writer(plenty()).expect("writer");

    // Two 40-byte lines never fit under 64 bytes, so every write after the first rotates.
    for i in 0..9 {
        let outcome = writer
            .write_line(&format!("{i:02} {}", "x".repeat(36)))
            .expect("write");
        assert_eq!(outcome.persisted(), 40);
    }

    let stats = writer.stats().snapshot();
    assert_eq!(stats.rotations, 8);
    let archives = writer.retention().archives().expect("archives");
    assert_eq!(archives.len(), 5);
    assert!(writer.path().exists());

    let listed = svc.list_logs(true);
    let sd_files: Vec<_> = listed.iter().filter(|l| l.root == "sd-usb0").collect();
    assert_eq!(sd_files.len(), 6);
    let active_only = svc.list_logs(false);
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].name, "api.log");
}

#[test]
fn rotation_keeps_every_byte() {
    let dev = device();
    let svc = LogService::from_config(&dev.config).expect("service");
    let writer = svc.open_writer(plenty()).expect("writer");

    let mut expected = String::new();
    for i in 0..4 {
        let line = format!("line-{i}-{}", "y".repeat(30));
        writer.write_line(&line).expect("write");
        expected.push_str(&line);
        expected.push('\n');
    }

    let mut actual = String::new();
    for archive in writer.retention().archives().expect("archives") {
        actual.push_str(&fs::read_to_string(archive).expect("read"));
    }
    actual.push_str(&fs::read_to_string(writer.path()).expect("read"));
    assert_eq!(actual, expected);
}

#[test]
fn low_disk_sheds_writes_without_error() {
    let dev = device();
    let svc = LogService::from_config(&dev.config).expect("service");
    let disk = Arc::new(FixedDiskSpace::new(u64::MAX));
    let writer = svc
        .open_writer(Arc::clone(&disk) as Arc<dyn DiskSpace>)
        .expect("writer");

    writer.write_line("before").expect("write");
    disk.set(10);
    let outcome = writer.write_line("during").expect("write never errors");
    assert!(matches!(outcome, WriteOutcome::Dropped { available: 10, required: 1024 }));

    let stats = writer.stats().snapshot();
    assert_eq!(stats.dropped_writes, 1);
    assert!(stats.cleanup_passes >= 1);
    assert_eq!(
        fs::read_to_string(writer.path()).expect("read"),
        "before\n"
    );
}

// ============================================================================
// Resolution and tail
// ============================================================================

#[tokio::test]
async fn same_name_on_two_roots_requires_root() {
    let dev = device();
    fs::create_dir_all(&dev.local).expect("mkdir");
    write(&dev.local, "app.log", "local one\nlocal two\n");
    write(&dev.sd, "app.log", "sd one\n");
    let svc = LogService::from_config(&dev.config).expect("service");

    let local = svc
        .tail(
            &TailRequest::new("app.log", "local").with_format(TailFormat::Raw),
            CancellationToken::new(),
        )
        .await
        .expect("tail local");
    assert_eq!(local, TailOutput::Raw("local one\nlocal two".to_string()));

    let sd = svc
        .tail(
            &TailRequest::new("app.log", "sd-usb0").with_format(TailFormat::Raw),
            CancellationToken::new(),
        )
        .await
        .expect("tail sd");
    assert_eq!(sd, TailOutput::Raw("sd one".to_string()));

    let mut request = TailRequest::new("app.log", "");
    request.format = TailFormat::Raw;
    match svc.tail(&request, CancellationToken::new()).await {
        Err(LogError::Ambiguous { candidates, .. }) => {
            assert_eq!(candidates, vec!["local".to_string(), "sd-usb0".to_string()]);
        }
        other => panic!("expected ambiguous, got {other:?}"),
    }
}

#[tokio::test]
async fn tail_defaults_and_clamps_line_count() {
    let mut dev = device();
    dev.config.reader.default_lines = 3;
    dev.config.reader.max_lines = 5;
    let content: String = (0..20).map(|i| format!("{i}\n")).collect();
    write(&dev.sd, "long.log", &content);
    let svc = LogService::from_config(&dev.config).expect("service");

    let TailOutput::Records(records) = svc
        .tail(&TailRequest::new("long.log", "sd-usb0"), CancellationToken::new())
        .await
        .expect("tail")
    else {
        panic!("expected records");
    };
    let raws: Vec<&str> = records.iter().map(NormalizedLine::raw).collect();
    assert_eq!(raws, vec!["17", "18", "19"]);

    let TailOutput::Records(records) = svc
        .tail(
            &TailRequest::new("long.log", "sd-usb0").with_max_lines(1000),
            CancellationToken::new(),
        )
        .await
        .expect("tail")
    else {
        panic!("expected records");
    };
    assert_eq!(records.len(), 5);
}

#[tokio::test]
async fn traversal_names_are_rejected() {
    let dev = device();
    let svc = LogService::from_config(&dev.config).expect("service");
    let result = svc
        .tail(
            &TailRequest::new("../../etc/passwd", "local"),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(LogError::InvalidName(_))));
}

// ============================================================================
// Downloads
// ============================================================================

#[tokio::test]
async fn download_skips_file_deleted_after_resolution() {
    let mut dev = device();
    // A pipe smaller than one zip header holds the producer on the first entry.
    dev.config.archive.pipe_capacity = 16;
    for name in ["a.log", "b.log", "c.log"] {
        write(&dev.sd, name, &format!("{name} body\n"));
    }
    let svc = LogService::from_config(&dev.config).expect("service");

    let stream = svc
        .download(
            &[
                FileSelector::new("a.log", "sd-usb0"),
                FileSelector::new("b.log", "sd-usb0"),
                FileSelector::new("c.log", "sd-usb0"),
            ],
            &CancellationToken::new(),
        )
        .expect("download");
    fs::remove_file(dev.sd.join("c.log")).expect("remove");

    let mut out = Vec::new();
    let summary = stream.write_to(&mut out).await.expect("stream");
    assert_eq!(summary.written.len(), 2);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(
        zip_entries(out),
        vec![
            ("sd-usb0/a.log".to_string(), "a.log body\n".to_string()),
            ("sd-usb0/b.log".to_string(), "b.log body\n".to_string()),
        ]
    );
}

#[tokio::test]
async fn download_requires_root_per_selector() {
    let dev = device();
    write(&dev.sd, "a.log", "a\n");
    let svc = LogService::from_config(&dev.config).expect("service");

    let result = svc.download(
        &[FileSelector {
            name: "a.log".to_string(),
            root_id: None,
        }],
        &CancellationToken::new(),
    );
    let err = result.expect_err("root required");
    assert_eq!(err.code(), "ambiguous");
}

#[tokio::test]
async fn download_all_groups_by_root() {
    let dev = device();
    write(&dev.local, "api.log", "local active\n");
    write(&dev.local, "api.20250101T120000.log", "local archive\n");
    write(&dev.sd, "nested/app.log", "sd nested\n");
    write(&dev.sd, "notes.txt", "not a log\n");
    let svc = LogService::from_config(&dev.config).expect("service");

    let stream = svc.download_all(&CancellationToken::new()).expect("download");
    let mut out = Vec::new();
    stream.write_to(&mut out).await.expect("stream");

    assert_eq!(
        zip_entries(out),
        vec![
            (
                "local/api.20250101T120000.log".to_string(),
                "local archive\n".to_string()
            ),
            ("local/api.log".to_string(), "local active\n".to_string()),
            ("sd-usb0/nested/app.log".to_string(), "sd nested\n".to_string()),
        ]
    );
}
