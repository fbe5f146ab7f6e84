//! What can be mounted: a ready filesystem or a locator string.

use std::path::PathBuf;
use std::sync::Arc;

use super::backends::{LocalBackend, MemoryBackend};
use super::error::{VfsError, VfsResult};
use super::ops::VfsOps;

/// Source passed to [`MountFs::mount`](super::MountFs::mount).
#[derive(Clone)]
pub enum MountSource {
    /// A filesystem the caller already constructed.
    Handle(Arc<dyn VfsOps>),
    /// A locator such as `mem://` or `osfs:///srv/data`, opened by the
    /// façade's [`LocatorResolver`].
    Locator(String),
}

impl MountSource {
    /// Wrap a filesystem value.
    pub fn handle(fs: impl VfsOps + 'static) -> Self {
        Self::Handle(Arc::new(fs))
    }
}

impl std::fmt::Debug for MountSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountSource::Handle(fs) => f.debug_tuple("Handle").field(&fs.label()).finish(),
            MountSource::Locator(locator) => f.debug_tuple("Locator").field(locator).finish(),
        }
    }
}

impl From<Arc<dyn VfsOps>> for MountSource {
    fn from(fs: Arc<dyn VfsOps>) -> Self {
        Self::Handle(fs)
    }
}

impl From<&str> for MountSource {
    fn from(locator: &str) -> Self {
        Self::Locator(locator.to_string())
    }
}

impl From<String> for MountSource {
    fn from(locator: String) -> Self {
        Self::Locator(locator)
    }
}

/// Whether the façade closes a mounted filesystem when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Closed with the façade.
    Owned,
    /// Left to the caller.
    Attached,
}

impl Ownership {
    pub fn is_owned(self) -> bool {
        matches!(self, Ownership::Owned)
    }
}

/// Turns locator strings into filesystems.
pub trait LocatorResolver: Send + Sync {
    fn open(&self, locator: &str) -> VfsResult<Arc<dyn VfsOps>>;
}

/// Resolver for the built-in backends.
///
/// - `mem://` opens a fresh [`MemoryBackend`]
/// - `osfs://<dir>` and `file://<dir>` open a [`LocalBackend`]; a
///   `?read_only` suffix makes it read-only
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemeResolver;

impl LocatorResolver for SchemeResolver {
    fn open(&self, locator: &str) -> VfsResult<Arc<dyn VfsOps>> {
        let (scheme, rest) = locator
            .split_once("://")
            .ok_or_else(|| VfsError::mount(format!("not a locator: {locator}")))?;

        match scheme {
            "mem" => Ok(Arc::new(MemoryBackend::new())),
            "osfs" | "file" => {
                let (dir, read_only) = match rest.strip_suffix("?read_only") {
                    Some(dir) => (dir, true),
                    None => (rest, false),
                };
                let root = PathBuf::from(shellexpand::tilde(dir).as_ref());
                if !root.is_dir() {
                    return Err(VfsError::mount(format!(
                        "{} is not a directory",
                        root.display()
                    )));
                }
                let backend = if read_only {
                    LocalBackend::read_only(root)
                } else {
                    LocalBackend::new(root)
                };
                Ok(Arc::new(backend))
            }
            other => Err(VfsError::mount(format!("unknown scheme {other:?} in {locator}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_locator() {
        let fs = SchemeResolver.open("mem://").unwrap();
        assert_eq!(fs.label(), "<memfs>");
    }

    #[test]
    fn test_osfs_locator() {
        let dir = tempfile::TempDir::new().unwrap();
        let locator = format!("osfs://{}", dir.path().display());
        let fs = SchemeResolver.open(&locator).unwrap();
        assert!(!fs.read_only());

        let fs = SchemeResolver
            .open(&format!("file://{}?read_only", dir.path().display()))
            .unwrap();
        assert!(fs.read_only());
    }

    #[test]
    fn test_bad_locators() {
        assert!(matches!(
            SchemeResolver.open("no-scheme"),
            Err(VfsError::Mount(_))
        ));
        assert!(matches!(
            SchemeResolver.open("ftp://example.com"),
            Err(VfsError::Mount(_))
        ));
        assert!(matches!(
            SchemeResolver.open("osfs:///definitely/not/here"),
            Err(VfsError::Mount(_))
        ));
    }

    #[test]
    fn test_source_conversions() {
        assert!(matches!(MountSource::from("mem://"), MountSource::Locator(_)));
        let fs: Arc<dyn VfsOps> = Arc::new(MemoryBackend::new());
        assert!(matches!(MountSource::from(fs), MountSource::Handle(_)));
    }
}
