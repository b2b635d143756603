//! Traits at the component seams.
//!
//! Each collaborator the service depends on is reached through a trait so
//! tests substitute fakes by ordinary construction:
//! - [`RootRegistry`]: enumerates trusted roots
//! - [`LogCatalog`]: inventories log files beneath a root snapshot
//! - [`Sandbox`]: proves containment before any open
//! - [`DiskSpace`]: reports free bytes on a volume

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::{is_archive_name, looks_like_log, validate_lookup_name};
use crate::error::{LogError, Result};
use crate::types::{LogFileInfo, Root};

/// Source of the trusted root set.
pub trait RootRegistry: Send + Sync {
    /// Lists roots in stable path order.
    ///
    /// Unavailable mount points yield fewer roots, never an error.
    fn list_roots(&self) -> Vec<Root>;
}

/// Inventory of log files beneath registered roots.
///
/// Implementors provide the root snapshot and the directory walk; name lookup
/// and resolution are shared and always operate on a single snapshot.
pub trait LogCatalog: Send + Sync {
    /// Last published root snapshot. Callers keep the returned value for the whole operation.
    fn roots(&self) -> Arc<[Root]>;

    /// Re-runs root discovery and returns the new snapshot.
    ///
    /// Catalogs over a fixed root set keep the default, which returns
    /// [`LogCatalog::roots`].
    fn refresh_roots(&self) -> Arc<[Root]> {
        self.roots()
    }

    /// Walks `roots` and returns every matching log file.
    ///
    /// Per-entry I/O failures are skipped. Results are not cached.
    fn discover_in(&self, roots: &[Root], include_archives: bool) -> Vec<LogFileInfo>;

    /// Whether a base name follows the log naming convention.
    fn accepts_name(&self, name: &str) -> bool {
        looks_like_log(name, &[])
    }

    /// Discovers log files across the current root snapshot.
    fn discover(&self, include_archives: bool) -> Vec<LogFileInfo> {
        let roots = self.roots();
        self.discover_in(&roots, include_archives)
    }

    /// Finds every file whose base name equals `name` (case-insensitive).
    ///
    /// Within a root the most recently modified file comes first; across roots
    /// the local root precedes removable roots, which follow in path order.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidName`] if `name` is not a plain log file name.
    fn find_by_name(&self, name: &str) -> Result<Vec<LogFileInfo>> {
        let roots = self.roots();
        find_in(self, &roots, name)
    }

    /// Resolves `name` under the caller-supplied root.
    ///
    /// The root is mandatory even when only one file carries the name, because
    /// volumes can hold different files with the same name.
    ///
    /// # Errors
    ///
    /// - [`LogError::NotFound`] when no root holds the name, or the given root does not
    /// - [`LogError::Ambiguous`] when the name exists but no root was given
    fn resolve_one(&self, name: &str, root_id: Option<&str>) -> Result<LogFileInfo> {
        let roots = self.roots();
        self.resolve_one_in(&roots, name, root_id)
    }

    /// [`LogCatalog::resolve_one`] against a snapshot the caller already holds.
    ///
    /// # Errors
    ///
    /// See [`LogCatalog::resolve_one`].
    fn resolve_one_in(
        &self,
        roots: &[Root],
        name: &str,
        root_id: Option<&str>,
    ) -> Result<LogFileInfo> {
        let matches = find_in(self, roots, name)?;
        if matches.is_empty() {
            return Err(LogError::not_found(name));
        }

        let Some(root_id) = root_id.map(str::trim).filter(|r| !r.is_empty()) else {
            let mut candidates: Vec<String> = Vec::new();
            for info in &matches {
                if !candidates.contains(&info.root_id) {
                    candidates.push(info.root_id.clone());
                }
            }
            return Err(LogError::Ambiguous {
                name: name.to_string(),
                candidates,
            });
        };

        matches
            .into_iter()
            .find(|info| info.root_id == root_id)
            .ok_or_else(|| LogError::NotFound {
                name: name.to_string(),
                root: Some(root_id.to_string()),
            })
    }
}

fn find_in<C: LogCatalog + ?Sized>(
    catalog: &C,
    roots: &[Root],
    name: &str,
) -> Result<Vec<LogFileInfo>> {
    let name = validate_lookup_name(name)?;
    if !catalog.accepts_name(name) && !is_archive_name(name) {
        return Err(LogError::InvalidName(name.to_string()));
    }

    let mut matches: Vec<LogFileInfo> = catalog
        .discover_in(roots, true)
        .into_iter()
        .filter(|info| info.name.eq_ignore_ascii_case(name))
        .collect();

    let rank = root_priority(roots);
    matches.sort_by(|a, b| {
        let ra = rank.get(a.root_id.as_str()).copied().unwrap_or(usize::MAX);
        let rb = rank.get(b.root_id.as_str()).copied().unwrap_or(usize::MAX);
        ra.cmp(&rb)
            .then_with(|| b.modified_at.cmp(&a.modified_at))
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(matches)
}

/// Priority rank per root id: local first, then removable roots by path.
fn root_priority(roots: &[Root]) -> HashMap<&str, usize> {
    let mut ordered: Vec<&Root> = roots.iter().collect();
    ordered.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.path.cmp(&b.path)));
    ordered
        .into_iter()
        .enumerate()
        .map(|(rank, root)| (root.id.as_str(), rank))
        .collect()
}

/// Containment gate consulted before any file is opened for reading.
pub trait Sandbox: Send + Sync {
    /// Whether `candidate` lies beneath some registered root.
    fn is_contained(&self, candidate: &Path) -> bool;

    /// Checks containment, then opens the file for reading.
    ///
    /// # Errors
    ///
    /// - [`LogError::Forbidden`] if the path escapes every root
    /// - [`LogError::NotFound`] if the file vanished after it was listed
    /// - [`LogError::Io`] for any other open failure
    fn open(&self, candidate: &Path) -> Result<File> {
        if !self.is_contained(candidate) {
            return Err(LogError::Forbidden(candidate.to_path_buf()));
        }
        File::open(candidate).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                LogError::not_found(
                    candidate
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                )
            } else {
                LogError::Io(e)
            }
        })
    }
}

/// Free-space probe for the volume holding a path.
pub trait DiskSpace: Send + Sync {
    /// Bytes available to unprivileged writers on the volume containing `path`.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}
