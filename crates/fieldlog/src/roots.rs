//! Log root discovery.
//!
//! Roots are the trust boundary of the whole crate: the local directory beside
//! the installed binary plus any directory named after the configured
//! convention on a mounted volume.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::RootsConfig;
use crate::error::Result;
use crate::sandbox::absolutize;
use crate::traits::RootRegistry;
use crate::types::{Root, RootKind};

/// Registry that scans mount parents on every call.
#[derive(Debug, Clone)]
pub struct MountScanRegistry {
    local_dir: PathBuf,
    mount_parents: Vec<PathBuf>,
    root_dir_name: String,
    scan_depth: usize,
}

impl MountScanRegistry {
    /// Creates a registry from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the local root cannot be determined.
    pub fn new(config: &RootsConfig) -> Result<Self> {
        let local_dir = absolutize(&config.resolve_local_dir()?)?;
        Ok(Self {
            local_dir,
            mount_parents: config.mount_parents.clone(),
            root_dir_name: config.root_dir_name.clone(),
            scan_depth: config.scan_depth,
        })
    }

    /// Path of the local root.
    #[must_use]
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    fn scan_parent(&self, parent: &Path, found: &mut Vec<(PathBuf, String)>) {
        let mut pending = vec![(parent.to_path_buf(), 0usize)];
        while let Some((dir, depth)) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "mount scan skipped directory");
                    continue;
                }
            };
            for entry in entries.filter_map(std::result::Result::ok) {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if !file_type.is_dir() {
                    continue;
                }
                let path = entry.path();
                if entry.file_name().to_string_lossy() == self.root_dir_name.as_str() {
                    // A matched root is never searched for nested roots.
                    found.push((path.clone(), volume_label(parent, &path)));
                } else if depth + 1 < self.scan_depth {
                    pending.push((path, depth + 1));
                }
            }
        }
    }
}

impl RootRegistry for MountScanRegistry {
    fn list_roots(&self) -> Vec<Root> {
        let mut roots = Vec::new();

        match fs::create_dir_all(&self.local_dir) {
            Ok(()) => roots.push(Root::local(&self.local_dir)),
            Err(e) => warn!(
                path = %self.local_dir.display(),
                error = %e,
                "local log root unavailable"
            ),
        }

        let mut found = Vec::new();
        for parent in &self.mount_parents {
            let Ok(parent) = absolutize(parent) else {
                continue;
            };
            self.scan_parent(&parent, &mut found);
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found.dedup_by(|a, b| a.0 == b.0);

        let mut used: Vec<String> = vec![crate::types::LOCAL_ROOT_ID.to_string()];
        for (path, label) in found {
            if path == self.local_dir {
                continue;
            }
            let id = unique_id(&format!("sd-{label}"), &used);
            used.push(id.clone());
            roots.push(Root::removable(id, path));
        }

        roots.sort_by(|a, b| a.path.cmp(&b.path));
        roots
    }
}

/// First path component beneath the mount parent, made safe for use in ids.
fn volume_label(parent: &Path, root: &Path) -> String {
    let label = root
        .strip_prefix(parent)
        .ok()
        .and_then(|rel| {
            let mut components = rel.components();
            let first = components.next()?;
            // A root directly under the mount parent is labelled by the parent.
            components.next()?;
            Some(first.as_os_str().to_string_lossy().into_owned())
        })
        .or_else(|| parent.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "volume".to_string());

    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unique_id(base: &str, used: &[String]) -> String {
    if !used.iter().any(|u| u == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !used.iter().any(|u| u == candidate))
        .unwrap_or_else(|| base.to_string())
}

/// A fixed root list, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRoots {
    roots: Vec<Root>,
}

impl StaticRoots {
    /// Creates a registry over the given roots, ordered by path.
    #[must_use]
    pub fn new(mut roots: Vec<Root>) -> Self {
        roots.sort_by(|a, b| a.path.cmp(&b.path));
        Self { roots }
    }
}

impl RootRegistry for StaticRoots {
    fn list_roots(&self) -> Vec<Root> {
        self.roots.clone()
    }
}

/// Chooses the directory that receives the active log.
///
/// With `prefer_removable`, the first removable root that accepts a probe
/// write wins; otherwise, or when none does, the local root is used.
#[must_use]
pub fn choose_sink_dir(roots: &[Root], prefer_removable: bool) -> Option<PathBuf> {
    if prefer_removable {
        for root in roots.iter().filter(|r| r.kind == RootKind::Removable) {
            match probe_writable(&root.path) {
                Ok(()) => {
                    info!(root = %root.id, path = %root.path.display(), "log sink on removable root");
                    return Some(root.path.clone());
                }
                Err(e) => {
                    warn!(root = %root.id, error = %e, "removable root is not writable");
                }
            }
        }
    }

    let local = roots.iter().find(|r| r.kind == RootKind::Local)?;
    if let Err(e) = probe_writable(&local.path) {
        warn!(path = %local.path.display(), error = %e, "local root failed write probe");
    }
    Some(local.path.clone())
}

fn probe_writable(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(".fieldlog-probe");
    fs::write(&probe, b"ok")?;
    fs::remove_file(&probe)
}
