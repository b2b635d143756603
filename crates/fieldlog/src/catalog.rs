//! Log file inventory.
//!
//! This module provides:
//! - Log naming conventions ([`looks_like_log`], [`parse_archive_name`])
//! - [`FsCatalog`]: walks registered roots on every query

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::error::{LogError, Result};
use crate::traits::{LogCatalog, RootRegistry};
use crate::types::{LogFileInfo, Root};

/// `<stem>.<YYYYMMDDTHHMMSS>[-N][.<ext>]`
static ARCHIVE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<stem>.+?)\.(?P<ts>\d{8}T\d{6})(?:-(?P<seq>\d+))?(?:\.(?P<ext>[^.]+))?$")
        .unwrap_or_else(|_| unreachable!())
});

/// Components of a rotated archive file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName<'a> {
    /// Base name without extension.
    pub stem: &'a str,
    /// Compact UTC rotation timestamp.
    pub timestamp: &'a str,
    /// Collision counter for rotations within the same second.
    pub seq: u32,
    /// Original extension, if the base name had one.
    pub ext: Option<&'a str>,
}

/// Parses a rotated archive name, returning `None` for anything else.
#[must_use]
pub fn parse_archive_name(name: &str) -> Option<ArchiveName<'_>> {
    let caps = ARCHIVE_NAME_REGEX.captures(name)?;
    Some(ArchiveName {
        stem: caps.name("stem")?.as_str(),
        timestamp: caps.name("ts")?.as_str(),
        seq: caps
            .name("seq")
            .and_then(|s| s.as_str().parse().ok())
            .unwrap_or(0),
        ext: caps.name("ext").map(|m| m.as_str()),
    })
}

/// Whether `name` encodes a rotation timestamp.
#[must_use]
pub fn is_archive_name(name: &str) -> bool {
    ARCHIVE_NAME_REGEX.is_match(name)
}

/// Splits `api.log` into (`api`, `Some("log")`); names without a dot keep no extension.
#[must_use]
pub fn split_base_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Archive name for `base_name` rotated at `timestamp`; `seq > 0` disambiguates collisions.
#[must_use]
pub fn archive_name_for(base_name: &str, timestamp: &str, seq: u32) -> String {
    let (stem, ext) = split_base_name(base_name);
    let suffix = if seq == 0 {
        String::new()
    } else {
        format!("-{seq}")
    };
    match ext {
        Some(ext) => format!("{stem}.{timestamp}{suffix}.{ext}"),
        None => format!("{stem}.{timestamp}{suffix}"),
    }
}

/// Whether `name` is a rotated archive of `base_name`.
#[must_use]
pub fn is_archive_of(name: &str, base_name: &str) -> bool {
    let Some(archive) = parse_archive_name(name) else {
        return false;
    };
    let (stem, ext) = split_base_name(base_name);
    archive.stem == stem
        && match (archive.ext, ext) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        }
}

/// Log naming convention: a `.log` suffix (any case) or an allow-listed bare name,
/// including rotated archives of allow-listed names.
#[must_use]
pub fn looks_like_log(name: &str, bare_names: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.len() > ".log".len() && lower.ends_with(".log") {
        return true;
    }
    if bare_names.iter().any(|b| b.eq_ignore_ascii_case(name)) {
        return true;
    }
    parse_archive_name(name).is_some_and(|a| {
        a.ext.is_none() && bare_names.iter().any(|b| b.eq_ignore_ascii_case(a.stem))
    })
}

/// Trims a caller-supplied name and rejects anything that is not a plain base name.
///
/// # Errors
///
/// Returns [`LogError::InvalidName`] for empty names and names with separators.
pub fn validate_lookup_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.contains(['/', '\\', '\0'])
        || trimmed == "."
        || trimmed == ".."
    {
        return Err(LogError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

/// Catalog backed by the file system.
///
/// The root set is taken from the registry at construction and replaced
/// wholesale by every [`LogCatalog::refresh_roots`] call; readers keep
/// whichever snapshot they already hold.
pub struct FsCatalog {
    registry: Arc<dyn RootRegistry>,
    roots: RwLock<Arc<[Root]>>,
    bare_names: Vec<String>,
}

impl FsCatalog {
    /// Creates a catalog and takes the initial root snapshot.
    #[must_use]
    pub fn new(registry: Arc<dyn RootRegistry>, config: &CatalogConfig) -> Self {
        let roots: Arc<[Root]> = Arc::from(registry.list_roots());
        info!(count = roots.len(), "log roots registered");
        Self {
            registry,
            roots: RwLock::new(roots),
            bare_names: config.bare_names.clone(),
        }
    }

    fn walk_root(&self, root: &Root, include_archives: bool, out: &mut Vec<LogFileInfo>) {
        let mut pending = vec![root.path.clone()];
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };

            for entry in entries.filter_map(std::result::Result::ok) {
                // DirEntry::file_type does not follow symlinks; links are never walked.
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() {
                    pending.push(entry.path());
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                let name = entry.file_name().to_string_lossy().into_owned();
                if !looks_like_log(&name, &self.bare_names) {
                    continue;
                }
                if !include_archives && is_archive_name(&name) {
                    continue;
                }
                match file_info(&entry.path(), name, &root.id) {
                    Ok(info) => out.push(info),
                    Err(e) => {
                        debug!(path = %entry.path().display(), error = %e, "skipping log entry");
                    }
                }
            }
        }
    }
}

fn file_info(path: &Path, name: String, root_id: &str) -> std::io::Result<LogFileInfo> {
    let meta = fs::metadata(path)?;
    let modified: DateTime<Utc> = meta.modified()?.into();
    Ok(LogFileInfo {
        path: path.to_path_buf(),
        name,
        dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        size: meta.len(),
        modified_at: modified,
        root_id: root_id.to_string(),
    })
}

impl LogCatalog for FsCatalog {
    fn roots(&self) -> Arc<[Root]> {
        Arc::clone(&self.roots.read())
    }

    fn refresh_roots(&self) -> Arc<[Root]> {
        let fresh: Arc<[Root]> = Arc::from(self.registry.list_roots());
        *self.roots.write() = Arc::clone(&fresh);
        debug!(count = fresh.len(), "log roots refreshed");
        fresh
    }

    fn discover_in(&self, roots: &[Root], include_archives: bool) -> Vec<LogFileInfo> {
        let mut out = Vec::new();
        for root in roots {
            self.walk_root(root, include_archives, &mut out);
        }
        out
    }

    fn accepts_name(&self, name: &str) -> bool {
        looks_like_log(name, &self.bare_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roots::StaticRoots;
    use tempfile::TempDir;
    use test_case::test_case;

    fn bare() -> Vec<String> {
        CatalogConfig::default().bare_names
    }

    #[test_case("api.log", true ; "plain log")]
    #[test_case("API.LOG", true ; "upper case extension")]
    #[test_case("api.20250101T120000.log", true ; "rotated archive")]
    #[test_case("messages", true ; "allow listed bare name")]
    #[test_case("messages.20250101T120000", true ; "rotated bare name")]
    #[test_case(".log", false ; "extension only")]
    #[test_case("api.log.gz", false ; "compressed")]
    #[test_case("notes.txt", false ; "other extension")]
    #[test_case("passwd", false ; "bare name not allow listed")]
    fn naming_convention(name: &str, expected: bool) {
        assert_eq!(looks_like_log(name, &bare()), expected);
    }

    #[test]
    fn parse_archive_components() {
        let parsed = parse_archive_name("api.20250919T043738.log").expect("archive");
        assert_eq!(parsed.stem, "api");
        assert_eq!(parsed.timestamp, "20250919T043738");
        assert_eq!(parsed.seq, 0);
        assert_eq!(parsed.ext, Some("log"));

        let parsed = parse_archive_name("api.v2.20250919T043738-3.log").expect("archive");
        assert_eq!(parsed.stem, "api.v2");
        assert_eq!(parsed.seq, 3);

        assert!(parse_archive_name("api.log").is_none());
        assert!(parse_archive_name("api.2025.log").is_none());
    }

    #[test]
    fn archive_names_roundtrip_through_parser() {
        let name = archive_name_for("api.log", "20250919T043738", 0);
        assert_eq!(name, "api.20250919T043738.log");
        assert!(is_archive_of(&name, "api.log"));

        let name = archive_name_for("api.log", "20250919T043738", 2);
        assert_eq!(name, "api.20250919T043738-2.log");
        assert!(is_archive_of(&name, "api.log"));

        let name = archive_name_for("messages", "20250919T043738", 0);
        assert_eq!(name, "messages.20250919T043738");
        assert!(is_archive_of(&name, "messages"));
        assert!(!is_archive_of(&name, "api.log"));
        assert!(!is_archive_of("gateway.20250919T043738.log", "api.log"));
    }

    #[test]
    fn lookup_name_validation() {
        assert_eq!(validate_lookup_name(" api.log ").expect("valid"), "api.log");
        assert!(validate_lookup_name("").is_err());
        assert!(validate_lookup_name("a/b.log").is_err());
        assert!(validate_lookup_name("..").is_err());
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    fn catalog_over(roots: Vec<Root>) -> FsCatalog {
        FsCatalog::new(
            Arc::new(StaticRoots::new(roots)),
            &CatalogConfig::default(),
        )
    }

    #[test]
    fn discover_walks_roots_and_filters_names() {
        let local = TempDir::new().expect("temp dir");
        let sd = TempDir::new().expect("temp dir");
        write(local.path(), "api.log", "hello\n");
        write(local.path(), "api.20250101T120000.log", "old\n");
        write(local.path(), "nested/deeper/worker.log", "w\n");
        write(local.path(), "readme.txt", "ignore\n");
        write(sd.path(), "api.log", "sd\n");
        write(sd.path(), "messages", "kernel\n");

        let catalog = catalog_over(vec![
            Root::local(local.path()),
            Root::removable("sd-card", sd.path()),
        ]);

        let all = catalog.discover(true);
        assert_eq!(all.len(), 5);

        let current = catalog.discover(false);
        assert_eq!(current.len(), 4);
        assert!(current.iter().all(|f| !is_archive_name(&f.name)));

        let worker = current
            .iter()
            .find(|f| f.name == "worker.log")
            .expect("nested log found");
        assert_eq!(worker.root_id, "local");
        assert_eq!(worker.dir, local.path().join("nested/deeper"));
        assert_eq!(worker.size, 2);
    }

    #[test]
    fn discover_reflects_filesystem_without_caching() {
        let local = TempDir::new().expect("temp dir");
        let catalog = catalog_over(vec![Root::local(local.path())]);
        assert!(catalog.discover(true).is_empty());

        write(local.path(), "api.log", "line\n");
        assert_eq!(catalog.discover(true).len(), 1);

        fs::remove_file(local.path().join("api.log")).expect("remove");
        assert!(catalog.discover(true).is_empty());
    }

    #[test]
    fn discover_tolerates_missing_root() {
        let local = TempDir::new().expect("temp dir");
        write(local.path(), "api.log", "x\n");
        let catalog = catalog_over(vec![
            Root::local(local.path()),
            Root::removable("sd-gone", "/nonexistent/fieldlog"),
        ]);
        assert_eq!(catalog.discover(true).len(), 1);
    }

    #[test]
    fn resolve_one_across_real_roots() {
        let local = TempDir::new().expect("temp dir");
        let sd = TempDir::new().expect("temp dir");
        write(local.path(), "app.log", "local\n");
        write(sd.path(), "app.log", "sd\n");

        let catalog = catalog_over(vec![
            Root::local(local.path()),
            Root::removable("sd", sd.path()),
        ]);

        let found = catalog.resolve_one("app.log", Some("local")).expect("resolve");
        assert_eq!(found.path, local.path().join("app.log"));

        assert!(matches!(
            catalog.resolve_one("app.log", Some("")),
            Err(LogError::Ambiguous { .. })
        ));
    }

    #[test]
    fn refresh_publishes_new_snapshot() {
        let local = TempDir::new().expect("temp dir");
        let catalog = catalog_over(vec![Root::local(local.path())]);
        let before = catalog.roots();
        let after = catalog.refresh_roots();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0], after[0]);
    }

    #[cfg(unix)]
    #[test]
    fn discover_does_not_follow_symlinks() {
        let local = TempDir::new().expect("temp dir");
        let outside = TempDir::new().expect("temp dir");
        write(outside.path(), "secret.log", "nope\n");
        std::os::unix::fs::symlink(outside.path(), local.path().join("link"))
            .expect("create symlink");
        std::os::unix::fs::symlink(
            outside.path().join("secret.log"),
            local.path().join("alias.log"),
        )
        .expect("create symlink");

        let catalog = catalog_over(vec![Root::local(local.path())]);
        assert!(catalog.discover(true).is_empty());
    }
}
