//! Synthetic directories on the route to mount points.
//!
//! Nothing here is stored: children and metadata are derived from the
//! [`MountTable`] whenever a listing or stat needs them.

use std::collections::BTreeSet;
use std::ops::Range;

use super::path::VirtualPath;
use super::table::MountTable;
use super::types::{Details, FileType, Info, Namespaces};

/// Immediate child names contributed by mounts strictly below `path`.
pub fn synthetic_children(table: &MountTable, path: &VirtualPath) -> BTreeSet<String> {
    let depth = path.depth();
    table
        .mounts_below(path)
        .filter_map(|mount| mount.segments().get(depth).cloned())
        .collect()
}

/// Metadata for a directory that exists only in the mount namespace.
pub fn synthetic_info(name: impl Into<String>, namespaces: Namespaces) -> Info {
    Info {
        name: name.into(),
        kind: FileType::Directory,
        details: namespaces.details.then_some(Details {
            size: 0,
            modified: None,
            accessed: None,
            created: None,
        }),
        access: None,
    }
}

/// Merge a backend listing with synthetic children.
///
/// Backend order is preserved. A backend entry sharing a name with a
/// synthetic child is replaced in place by the synthetic directory; the
/// remaining synthetic names follow in sorted order.
pub fn merge_listing(
    real: Vec<Info>,
    mut synthetic: BTreeSet<String>,
    namespaces: Namespaces,
) -> Vec<Info> {
    let mut merged: Vec<Info> = real
        .into_iter()
        .map(|info| {
            if synthetic.remove(&info.name) {
                synthetic_info(info.name, namespaces)
            } else {
                info
            }
        })
        .collect();
    merged.extend(
        synthetic
            .into_iter()
            .map(|name| synthetic_info(name, namespaces)),
    );
    merged
}

/// Apply a `start..end` window to a listing.
pub fn paginate<T>(entries: Vec<T>, page: Option<Range<usize>>) -> Vec<T> {
    match page {
        None => entries,
        Some(range) => {
            let end = range.end.min(entries.len());
            let start = range.start.min(end);
            entries.into_iter().skip(start).take(end - start).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;
    use crate::vfs::ops::VfsOps;
    use std::sync::Arc;

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::normalize(s).unwrap()
    }

    fn table_with(paths: &[&str]) -> MountTable {
        let mut table = MountTable::new();
        for path in paths {
            let fs: Arc<dyn VfsOps> = Arc::new(MemoryBackend::new());
            table.mount(vp(path), fs, false).unwrap();
        }
        table
    }

    fn names(entries: &[Info]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_children_are_next_segments_without_duplicates() {
        let table = table_with(&["/mnt/a", "/mnt/a/deep", "/mnt/b/c", "/srv"]);

        let root: Vec<_> = synthetic_children(&table, &VirtualPath::root())
            .into_iter()
            .collect();
        assert_eq!(root, ["mnt", "srv"]);

        let mnt: Vec<_> = synthetic_children(&table, &vp("/mnt")).into_iter().collect();
        assert_eq!(mnt, ["a", "b"]);

        let a: Vec<_> = synthetic_children(&table, &vp("/mnt/a")).into_iter().collect();
        assert_eq!(a, ["deep"]);

        assert!(synthetic_children(&table, &vp("/srv")).is_empty());
        assert!(synthetic_children(&table, &vp("/nowhere")).is_empty());
    }

    #[test]
    fn test_synthetic_info_shape() {
        let info = synthetic_info("mnt", Namespaces::ALL);
        assert!(info.is_dir());
        assert_eq!(info.size(), Some(0));
        assert!(info.access.is_none());

        let basic = synthetic_info("mnt", Namespaces::BASIC);
        assert!(basic.details.is_none());
    }

    #[test]
    fn test_merge_mount_wins_on_collision() {
        let real = vec![Info::file("zeta"), Info::file("archive"), Info::directory("alpha")];
        let synthetic: BTreeSet<String> = ["archive", "beta"].iter().map(|s| s.to_string()).collect();

        let merged = merge_listing(real, synthetic, Namespaces::BASIC);
        assert_eq!(names(&merged), ["zeta", "archive", "alpha", "beta"]);
        assert!(merged[1].is_dir());
    }

    #[test]
    fn test_paginate_windows() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(paginate(items.clone(), None), [1, 2, 3, 4, 5]);
        assert_eq!(paginate(items.clone(), Some(1..3)), [2, 3]);
        assert_eq!(paginate(items.clone(), Some(3..100)), [4, 5]);
        assert!(paginate(items, Some(7..9)).is_empty());
    }
}
