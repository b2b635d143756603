//! Path containment.
//!
//! Every read goes through [`RootSandbox`]: a candidate path is made absolute,
//! its `.` and `..` segments are resolved lexically, and it must then lie at or
//! beneath one of the registered roots. Symlinks are not resolved here; the
//! catalog never follows them.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::traits::Sandbox;
use crate::types::Root;

/// Makes `path` absolute against the working directory and resolves `.`/`..`.
///
/// `..` at the file system root stays at the root.
///
/// # Errors
///
/// Returns an error if the path is relative and the working directory is unavailable.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize(&joined))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    out
}

/// Whether `candidate` resolves to a path at or beneath some root.
///
/// Paths that cannot be made absolute are rejected.
#[must_use]
pub fn is_contained(candidate: &Path, roots: &[Root]) -> bool {
    if candidate.as_os_str().is_empty() {
        return false;
    }
    let Ok(candidate) = absolutize(candidate) else {
        return false;
    };
    roots.iter().any(|root| {
        absolutize(&root.path).is_ok_and(|root_path| candidate.starts_with(&root_path))
    })
}

/// Sandbox over one root snapshot.
#[derive(Debug, Clone)]
pub struct RootSandbox {
    roots: Arc<[Root]>,
}

impl RootSandbox {
    /// Creates a sandbox bounded by `roots`.
    #[must_use]
    pub const fn new(roots: Arc<[Root]>) -> Self {
        Self { roots }
    }

    /// The roots this sandbox admits.
    #[must_use]
    pub fn roots(&self) -> &[Root] {
        &self.roots
    }
}

impl Sandbox for RootSandbox {
    fn is_contained(&self, candidate: &Path) -> bool {
        let contained = is_contained(candidate, &self.roots);
        if !contained {
            warn!(path = %candidate.display(), "path rejected by sandbox");
        }
        contained
    }
}
