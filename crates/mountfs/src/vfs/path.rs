//! Virtual path normalization.
//!
//! A [`VirtualPath`] is a root-relative sequence of segments. Every path the
//! façade sees goes through [`VirtualPath::normalize`] before it is used.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::{VfsError, VfsResult};

/// Normalized, absolute path inside the façade namespace.
///
/// Segments are never empty, `.`, `..`, or contain NUL. The root is the
/// empty sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Normalize a raw path string.
    ///
    /// Separators are `/`; a leading `/` is optional. `.` and empty
    /// segments are dropped, `..` removes the previous segment.
    pub fn normalize(raw: &str) -> VfsResult<Self> {
        if raw.contains('\0') {
            return Err(VfsError::invalid_path(raw.replace('\0', "\\0")));
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(VfsError::invalid_path(format!(
                            "{raw}: back reference above root"
                        )));
                    }
                }
                name => segments.push(name.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// Normalize a [`Path`]. Non-UTF-8 paths are rejected.
    pub fn from_path(path: &Path) -> VfsResult<Self> {
        let raw = path
            .to_str()
            .ok_or_else(|| VfsError::invalid_path(path.to_string_lossy()))?;
        Self::normalize(raw)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Final segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Split into the ancestor segments and the final segment.
    pub fn split(&self) -> (&[String], Option<&str>) {
        match self.segments.split_last() {
            Some((last, ancestors)) => (ancestors, Some(last.as_str())),
            None => (&[], None),
        }
    }

    /// Parent path; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (ancestors, last) = self.split();
        last.map(|_| Self {
            segments: ancestors.to_vec(),
        })
    }

    /// The first `n` segments.
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            segments: self.segments[..n.min(self.segments.len())].to_vec(),
        }
    }

    /// Segment-wise prefix test. Every path starts with the root.
    pub fn starts_with(&self, prefix: &VirtualPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True if `self` is a proper ancestor of `other`.
    pub fn is_strict_ancestor_of(&self, other: &VirtualPath) -> bool {
        other.depth() > self.depth() && other.starts_with(self)
    }

    /// Remaining segments after `prefix`, if `prefix` is a prefix.
    pub fn strip_prefix(&self, prefix: &VirtualPath) -> Option<Self> {
        self.segments
            .strip_prefix(prefix.segments.as_slice())
            .map(|rest| Self {
                segments: rest.to_vec(),
            })
    }

    /// Append one already-valid segment.
    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// Relative form handed to backends (`a/b`, empty for the root).
    pub fn to_relative_path(&self) -> PathBuf {
        PathBuf::from(self.segments.join("/"))
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl FromStr for VirtualPath {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::normalize(s).unwrap()
    }

    #[test]
    fn test_normalize_forms() {
        assert_eq!(vp("/a/b").segments(), ["a", "b"]);
        assert_eq!(vp("a/b"), vp("/a/b"));
        assert_eq!(vp("//a///b/"), vp("/a/b"));
        assert_eq!(vp("/a/./b/../c"), vp("/a/c"));
        assert!(vp("").is_root());
        assert!(vp("/").is_root());
        assert!(vp("/a/..").is_root());
    }

    #[test]
    fn test_reject_escape_above_root() {
        assert!(matches!(
            VirtualPath::normalize("/.."),
            Err(VfsError::InvalidPath(_))
        ));
        assert!(matches!(
            VirtualPath::normalize("a/../../b"),
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_reject_nul() {
        assert!(matches!(
            VirtualPath::normalize("/a\0b"),
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["/", "a", "/a/b/", "x/./y/../z", "//deep//er/"] {
            let once = vp(raw);
            let twice = vp(&once.to_string());
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(vp("").to_string(), "/");
        assert_eq!(vp("a/b").to_string(), "/a/b");
    }

    #[test]
    fn test_split_and_parent() {
        let path = vp("/data/archive/x.txt");
        let (ancestors, last) = path.split();
        assert_eq!(ancestors, ["data", "archive"]);
        assert_eq!(last, Some("x.txt"));
        assert_eq!(path.parent(), Some(vp("/data/archive")));
        assert_eq!(path.name(), "x.txt");

        let root = VirtualPath::root();
        assert_eq!(root.split(), (&[][..], None));
        assert_eq!(root.parent(), None);
        assert_eq!(root.name(), "");
    }

    #[test]
    fn test_prefix_relations() {
        let data = vp("/data");
        let deep = vp("/data/archive/x");
        assert!(deep.starts_with(&data));
        assert!(data.is_strict_ancestor_of(&deep));
        assert!(!data.is_strict_ancestor_of(&data));
        assert!(!vp("/dat").is_strict_ancestor_of(&deep));
        assert_eq!(deep.strip_prefix(&data), Some(vp("archive/x")));
        assert_eq!(data.strip_prefix(&deep), None);
        assert_eq!(deep.prefix(2), vp("/data/archive"));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(vp("/a/b").to_relative_path(), PathBuf::from("a/b"));
        assert_eq!(VirtualPath::root().to_relative_path(), PathBuf::new());
    }
}
