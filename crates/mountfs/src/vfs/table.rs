//! Mount table with longest-prefix routing.
//!
//! Pure bookkeeping: no I/O and no locking. [`MountFs`](super::MountFs)
//! owns the table behind its state lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::error::{VfsError, VfsResult};
use super::ops::VfsOps;
use super::path::VirtualPath;

/// A filesystem bound to a directory of the façade.
#[derive(Clone)]
pub struct MountPoint {
    pub path: VirtualPath,
    pub fs: Arc<dyn VfsOps>,
    /// Closed by the façade when it closes.
    pub owned: bool,
}

impl std::fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountPoint")
            .field("path", &self.path)
            .field("fs", &self.fs.label())
            .field("owned", &self.owned)
            .finish()
    }
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The mount path (e.g., "/mnt/project").
    pub path: VirtualPath,
    /// Whether this mount is read-only.
    pub read_only: bool,
    pub owned: bool,
    /// Label of the mounted filesystem.
    pub label: String,
}

/// Outcome of [`MountTable::resolve`].
#[derive(Clone)]
pub enum Resolution {
    /// A mount point is a prefix of the path; the longest one wins.
    Mounted {
        mount_path: VirtualPath,
        fs: Arc<dyn VfsOps>,
        /// Path inside the mounted filesystem.
        residual: VirtualPath,
    },
    /// Not mounted, but the root or a strict ancestor of a mount point.
    Implied,
    /// Not mounted and not on the route to any mount point.
    NoSuchPath,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Mounted {
                mount_path,
                residual,
                ..
            } => f
                .debug_struct("Mounted")
                .field("mount_path", mount_path)
                .field("residual", residual)
                .finish(),
            Resolution::Implied => write!(f, "Implied"),
            Resolution::NoSuchPath => write!(f, "NoSuchPath"),
        }
    }
}

/// Mount points keyed by path.
///
/// Keys are ordered segment-wise, so every mount below a path sits in one
/// contiguous run right after that path.
#[derive(Debug, Default)]
pub struct MountTable {
    mounts: BTreeMap<VirtualPath, MountPoint>,
}

fn same_handle(a: &Arc<dyn VfsOps>, b: &Arc<dyn VfsOps>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filesystem at `path`.
    ///
    /// Fails if `path` is already a mount point or `fs` is already mounted
    /// elsewhere. The table is unchanged on failure.
    pub fn mount(&mut self, path: VirtualPath, fs: Arc<dyn VfsOps>, owned: bool) -> VfsResult<()> {
        if self.mounts.contains_key(&path) {
            return Err(VfsError::mount(format!("{path} is already a mount point")));
        }
        if let Some(existing) = self.mounts.values().find(|m| same_handle(&m.fs, &fs)) {
            return Err(VfsError::mount(format!(
                "{} is already mounted at {}",
                fs.label(),
                existing.path
            )));
        }
        self.mounts.insert(path.clone(), MountPoint { path, fs, owned });
        Ok(())
    }

    /// Find what owns `path`.
    pub fn resolve(&self, path: &VirtualPath) -> Resolution {
        for depth in (0..=path.depth()).rev() {
            let candidate = path.prefix(depth);
            if let Some(mount) = self.mounts.get(&candidate) {
                let residual = path
                    .strip_prefix(&mount.path)
                    .unwrap_or_default();
                return Resolution::Mounted {
                    mount_path: mount.path.clone(),
                    fs: Arc::clone(&mount.fs),
                    residual,
                };
            }
        }

        if path.is_root() || self.has_mounts_below(path) {
            Resolution::Implied
        } else {
            Resolution::NoSuchPath
        }
    }

    /// True if some mount point lies strictly below `path`.
    pub fn has_mounts_below(&self, path: &VirtualPath) -> bool {
        self.mounts_below(path).next().is_some()
    }

    /// Mount paths strictly below `path`, in order.
    pub fn mounts_below<'a>(
        &'a self,
        path: &'a VirtualPath,
    ) -> impl Iterator<Item = &'a VirtualPath> + 'a {
        self.mounts
            .range(path.clone()..)
            .map(|(key, _)| key)
            .skip_while(move |key| *key == path)
            .take_while(move |key| key.starts_with(path))
    }

    pub fn get(&self, path: &VirtualPath) -> Option<&MountPoint> {
        self.mounts.get(path)
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// List all current mounts.
    pub fn list(&self) -> Vec<MountInfo> {
        self.mounts
            .values()
            .map(|m| MountInfo {
                path: m.path.clone(),
                read_only: m.fs.read_only(),
                owned: m.owned,
                label: m.fs.label(),
            })
            .collect()
    }

    /// Remove every mount point, shallowest first.
    pub fn drain(&mut self) -> Vec<MountPoint> {
        std::mem::take(&mut self.mounts).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::normalize(s).unwrap()
    }

    fn mem() -> Arc<dyn VfsOps> {
        Arc::new(MemoryBackend::new())
    }

    fn mounted_at(resolution: &Resolution) -> (VirtualPath, VirtualPath) {
        match resolution {
            Resolution::Mounted {
                mount_path,
                residual,
                ..
            } => (mount_path.clone(), residual.clone()),
            other => panic!("expected Mounted, got {other:?}"),
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = MountTable::new();
        table.mount(vp("/data"), mem(), false).unwrap();
        table.mount(vp("/data/archive"), mem(), false).unwrap();

        let (mount, residual) = mounted_at(&table.resolve(&vp("/data/archive/x.txt")));
        assert_eq!(mount, vp("/data/archive"));
        assert_eq!(residual, vp("x.txt"));

        let (mount, residual) = mounted_at(&table.resolve(&vp("/data/other/y")));
        assert_eq!(mount, vp("/data"));
        assert_eq!(residual, vp("other/y"));
    }

    #[test]
    fn test_exact_mount_point_has_root_residual() {
        let mut table = MountTable::new();
        table.mount(vp("/data"), mem(), false).unwrap();

        let (mount, residual) = mounted_at(&table.resolve(&vp("/data")));
        assert_eq!(mount, vp("/data"));
        assert!(residual.is_root());
    }

    #[test]
    fn test_partial_segment_overlap_is_not_a_match() {
        let mut table = MountTable::new();
        table.mount(vp("/data"), mem(), false).unwrap();

        assert!(matches!(
            table.resolve(&vp("/database")),
            Resolution::NoSuchPath
        ));
    }

    #[test]
    fn test_implied_and_missing() {
        let mut table = MountTable::new();
        assert!(matches!(table.resolve(&VirtualPath::root()), Resolution::Implied));
        assert!(matches!(table.resolve(&vp("/x")), Resolution::NoSuchPath));

        table.mount(vp("/mnt/a/b"), mem(), false).unwrap();
        assert!(matches!(table.resolve(&vp("/mnt")), Resolution::Implied));
        assert!(matches!(table.resolve(&vp("/mnt/a")), Resolution::Implied));
        assert!(matches!(table.resolve(&vp("/mnt/c")), Resolution::NoSuchPath));
        assert!(matches!(table.resolve(&vp("/mnt/a/bb")), Resolution::NoSuchPath));
    }

    #[test]
    fn test_root_mount_catches_everything() {
        let mut table = MountTable::new();
        table.mount(VirtualPath::root(), mem(), false).unwrap();

        let (mount, residual) = mounted_at(&table.resolve(&vp("/anything/at/all")));
        assert!(mount.is_root());
        assert_eq!(residual, vp("anything/at/all"));
    }

    #[test]
    fn test_duplicate_mount_rejected() {
        let mut table = MountTable::new();
        let first = mem();
        table.mount(vp("/data"), Arc::clone(&first), false).unwrap();

        let result = table.mount(vp("/data"), mem(), true);
        assert!(matches!(result, Err(VfsError::Mount(_))));
        assert_eq!(table.len(), 1);

        let existing = table.get(&vp("/data")).unwrap();
        assert!(same_handle(&existing.fs, &first));
        assert!(!existing.owned);
    }

    #[test]
    fn test_same_handle_twice_rejected() {
        let mut table = MountTable::new();
        let fs = mem();
        table.mount(vp("/a"), Arc::clone(&fs), false).unwrap();

        let result = table.mount(vp("/b"), fs, false);
        assert!(matches!(result, Err(VfsError::Mount(_))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_mounts_below() {
        let mut table = MountTable::new();
        table.mount(vp("/a"), mem(), false).unwrap();
        table.mount(vp("/a/b"), mem(), false).unwrap();
        table.mount(vp("/a/c/d"), mem(), false).unwrap();
        table.mount(vp("/ab"), mem(), false).unwrap();

        let a = vp("/a");
        let below: Vec<_> = table.mounts_below(&a).cloned().collect();
        assert_eq!(below, vec![vp("/a/b"), vp("/a/c/d")]);

        let root = VirtualPath::root();
        assert_eq!(table.mounts_below(&root).count(), 4);
    }

    #[test]
    fn test_drain_empties_table() {
        let mut table = MountTable::new();
        table.mount(vp("/a"), mem(), true).unwrap();
        table.mount(vp("/b"), mem(), false).unwrap();

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
    }
}
