//! In-memory filesystem backend.
//!
//! Used for scratch mounts and testing. All data is ephemeral.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::index::paginate;
use crate::vfs::ops::{VfsFile, VfsOps};
use crate::vfs::types::{FileAttr, Info, Namespaces, OpenFlags, OpenOptions, SetInfo};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn attr_mut(&mut self) -> &mut FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }
}

type Entries = Arc<RwLock<HashMap<PathBuf, Entry>>>;

fn poisoned() -> VfsError {
    VfsError::other("lock poisoned")
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. Open handles share the entry table,
/// so writes through a handle are visible immediately. All data is lost
/// when the last handle and the backend are dropped.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: Entries,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::new(),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Normalize a path: remove leading `/`, resolve `.` and `..`.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                std::path::Component::ParentDir => {
                    result.pop();
                }
                std::path::Component::Normal(s) => {
                    result.push(s);
                }
                _ => {}
            }
        }
        result
    }

    /// Get the path string for error messages.
    fn path_str(path: &Path) -> String {
        format!("/{}", path.display())
    }

    fn name_of(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The parent of `path` must exist and be a directory.
    fn check_parent(entries: &HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
        let parent = path.parent().unwrap_or(Path::new(""));
        match entries.get(parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(_) => Err(VfsError::directory_expected(Self::path_str(parent))),
            None => Err(VfsError::not_found(Self::path_str(parent))),
        }
    }
}

#[async_trait]
impl VfsOps for MemoryBackend {
    async fn getinfo(&self, path: &Path, namespaces: Namespaces) -> VfsResult<Info> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().map_err(|_| poisoned())?;

        entries
            .get(&normalized)
            .map(|e| e.attr().to_info(Self::name_of(&normalized), namespaces))
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    async fn scandir(
        &self,
        path: &Path,
        namespaces: Namespaces,
        page: Option<Range<usize>>,
    ) -> VfsResult<Vec<Info>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().map_err(|_| poisoned())?;

        // Verify the path is a directory
        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => {
                return Err(VfsError::directory_expected(Self::path_str(&normalized)));
            }
            None => {
                return Err(VfsError::not_found(Self::path_str(&normalized)));
            }
        }

        // Find all direct children
        let mut result: Vec<Info> = entries
            .iter()
            .filter(|(entry_path, _)| {
                entry_path.parent() == Some(normalized.as_path()) && **entry_path != normalized
            })
            .map(|(entry_path, entry)| entry.attr().to_info(Self::name_of(entry_path), namespaces))
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(result, page))
    }

    async fn openbin(
        &self,
        path: &Path,
        flags: OpenFlags,
        options: &OpenOptions,
    ) -> VfsResult<Box<dyn VfsFile>> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        match entries.get_mut(&normalized) {
            Some(Entry::Directory { .. }) => {
                return Err(VfsError::file_expected(Self::path_str(&normalized)));
            }
            Some(Entry::File { .. }) if flags.exclusive => {
                return Err(VfsError::already_exists(Self::path_str(&normalized)));
            }
            Some(Entry::File { data, attr }) => {
                if flags.truncate {
                    data.clear();
                    attr.size = 0;
                    attr.mtime = SystemTime::now();
                }
            }
            None if flags.create => {
                Self::check_parent(&entries, &normalized)?;
                let perm = options.permissions().unwrap_or(0o644);
                entries.insert(
                    normalized.clone(),
                    Entry::File {
                        data: Vec::new(),
                        attr: FileAttr::file(0, perm),
                    },
                );
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        Ok(Box::new(MemoryFile {
            entries: Arc::clone(&self.entries),
            path: normalized,
            flags,
            pos: 0,
        }))
    }

    async fn makedir(&self, path: &Path, recreate: bool) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        // Check if something already exists
        if let Some(existing) = entries.get(&normalized) {
            return match existing {
                Entry::Directory { .. } if recreate => Ok(()),
                _ => Err(VfsError::already_exists(Self::path_str(&normalized))),
            };
        }

        Self::check_parent(&entries, &normalized)?;
        entries.insert(
            normalized,
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Ok(())
    }

    async fn remove(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                Err(VfsError::file_expected(Self::path_str(&normalized)))
            }
            Some(_) => {
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn removedir(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);

        if normalized.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        // Check if it's a directory
        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => {
                return Err(VfsError::directory_expected(Self::path_str(&normalized)));
            }
            None => {
                return Err(VfsError::not_found(Self::path_str(&normalized)));
            }
        }

        // Check for children
        let has_children = entries.keys().any(|k| k.parent() == Some(normalized.as_path()));
        if has_children {
            return Err(VfsError::directory_not_empty(Self::path_str(&normalized)));
        }

        entries.remove(&normalized);
        Ok(())
    }

    async fn setinfo(&self, path: &Path, set: &SetInfo) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        let entry = entries
            .get_mut(&normalized)
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))?;

        // Handle size change (requires access to data for files)
        if let Some(size) = set.size {
            match entry {
                Entry::File { data, attr } => {
                    data.resize(size as usize, 0);
                    attr.size = size;
                }
                Entry::Directory { .. } => {
                    return Err(VfsError::file_expected(Self::path_str(&normalized)));
                }
            }
        }

        // Handle other attribute changes
        let attr = entry.attr_mut();
        if let Some(mtime) = set.mtime {
            attr.mtime = mtime;
        }
        if let Some(atime) = set.atime {
            attr.atime = Some(atime);
        }
        if let Some(perm) = set.perm {
            attr.perm = perm;
        }
        if let Some(uid) = set.uid {
            attr.uid = Some(uid);
        }
        if let Some(gid) = set.gid {
            attr.gid = Some(gid);
        }
        Ok(())
    }

    fn read_only(&self) -> bool {
        false
    }

    fn label(&self) -> String {
        "<memfs>".to_string()
    }
}

/// Open handle on a [`MemoryBackend`] file.
///
/// Reads and writes go straight to the shared entry, so every poll
/// completes immediately.
struct MemoryFile {
    entries: Entries,
    path: PathBuf,
    flags: OpenFlags,
    pos: u64,
}

impl MemoryFile {
    fn gone(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} was removed", MemoryBackend::path_str(&self.path)),
        )
    }

    fn len(&self) -> io::Result<u64> {
        let entries = self.entries.read().map_err(|_| io::Error::other("lock poisoned"))?;
        match entries.get(&self.path) {
            Some(Entry::File { data, .. }) => Ok(data.len() as u64),
            _ => Err(self.gone()),
        }
    }
}

impl AsyncRead for MemoryFile {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.flags.read {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not open for reading",
            )));
        }
        let entries = match this.entries.read() {
            Ok(entries) => entries,
            Err(_) => return Poll::Ready(Err(io::Error::other("lock poisoned"))),
        };
        let Some(Entry::File { data, .. }) = entries.get(&this.path) else {
            return Poll::Ready(Err(this.gone()));
        };

        let start = usize::try_from(this.pos).map_or(data.len(), |pos| pos.min(data.len()));
        let n = buf.remaining().min(data.len() - start);
        buf.put_slice(&data[start..start + n]);
        this.pos += n as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MemoryFile {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if !this.flags.write {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not open for writing",
            )));
        }
        let mut entries = match this.entries.write() {
            Ok(entries) => entries,
            Err(_) => return Poll::Ready(Err(io::Error::other("lock poisoned"))),
        };
        let Some(Entry::File { data, attr }) = entries.get_mut(&this.path) else {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::NotFound, "file was removed")));
        };

        let offset = if this.flags.append {
            Some(data.len())
        } else {
            usize::try_from(this.pos).ok()
        };
        let end = offset.and_then(|o| o.checked_add(buf.len()));
        let (Some(offset), Some(end)) = (offset, end) else {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write position out of range",
            )));
        };
        // Extend if necessary
        if end > data.len() {
            if let Err(e) = data.try_reserve(end - data.len()) {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::OutOfMemory, e)));
            }
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        attr.size = data.len() as u64;
        attr.mtime = SystemTime::now();
        this.pos = end as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for MemoryFile {
    fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let target = match position {
            io::SeekFrom::Start(offset) => Some(offset),
            io::SeekFrom::Current(delta) => this.pos.checked_add_signed(delta),
            io::SeekFrom::End(delta) => this.len()?.checked_add_signed(delta),
        };
        this.pos = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryBackend::new();
        fs.writebytes(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        let data = fs.readbytes(Path::new("test.txt")).await.unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(fs.getsize(Path::new("test.txt")).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_seek_and_partial_read() {
        let fs = MemoryBackend::new();
        fs.writebytes(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        let mut file = fs
            .openbin(Path::new("test.txt"), OpenFlags::read(), &OpenOptions::default())
            .await
            .unwrap();
        file.seek(io::SeekFrom::Start(6)).await.unwrap();
        let mut buf = String::new();
        file.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "world");
    }

    #[tokio::test]
    async fn test_append_mode() {
        let fs = MemoryBackend::new();
        fs.writebytes(Path::new("log"), b"one\n").await.unwrap();

        let mut file = fs
            .openbin(Path::new("log"), OpenFlags::append(), &OpenOptions::default())
            .await
            .unwrap();
        file.write_all(b"two\n").await.unwrap();
        file.shutdown().await.unwrap();

        assert_eq!(fs.readbytes(Path::new("log")).await.unwrap(), b"one\ntwo\n");
    }

    #[tokio::test]
    async fn test_exclusive_create() {
        let fs = MemoryBackend::new();
        fs.writebytes(Path::new("x"), b"").await.unwrap();

        let result = fs
            .openbin(Path::new("x"), OpenFlags::create_exclusive(), &OpenOptions::default())
            .await;
        assert!(matches!(result, Err(VfsError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_read_missing_and_directory() {
        let fs = MemoryBackend::new();
        fs.makedir(Path::new("dir"), false).await.unwrap();

        assert!(matches!(
            fs.readbytes(Path::new("nope")).await,
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            fs.readbytes(Path::new("dir")).await,
            Err(VfsError::FileExpected(_))
        ));
    }

    #[tokio::test]
    async fn test_write_only_handle_refuses_reads() {
        let fs = MemoryBackend::new();
        let mut file = fs
            .openbin(Path::new("w"), OpenFlags::create_truncate(), &OpenOptions::default())
            .await
            .unwrap();
        let mut buf = Vec::new();
        assert!(file.read_to_end(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_create_requires_parent() {
        let fs = MemoryBackend::new();
        let result = fs.writebytes(Path::new("a/b/c.txt"), b"x").await;
        assert!(matches!(result, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_makedir_and_scandir() {
        let fs = MemoryBackend::new();
        fs.makedir(Path::new("subdir"), false).await.unwrap();
        fs.writebytes(Path::new("subdir/file.txt"), b"abc")
            .await
            .unwrap();
        fs.writebytes(Path::new("root.txt"), b"").await.unwrap();

        assert_eq!(
            fs.listdir(Path::new("")).await.unwrap(),
            ["root.txt", "subdir"]
        );

        let entries = fs
            .scandir(Path::new("subdir"), Namespaces::DETAILS, None)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "file.txt");
        assert_eq!(entries[0].size(), Some(3));
    }

    #[tokio::test]
    async fn test_scandir_page() {
        let fs = MemoryBackend::new();
        for name in ["a", "b", "c", "d"] {
            fs.writebytes(Path::new(name), b"").await.unwrap();
        }
        let page = fs
            .scandir(Path::new("/"), Namespaces::BASIC, Some(1..3))
            .await
            .unwrap();
        let names: Vec<_> = page.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["b", "c"]);
    }

    #[tokio::test]
    async fn test_makedir_recreate() {
        let fs = MemoryBackend::new();
        fs.makedir(Path::new("d"), false).await.unwrap();
        assert!(matches!(
            fs.makedir(Path::new("d"), false).await,
            Err(VfsError::AlreadyExists(_))
        ));
        fs.makedir(Path::new("d"), true).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove() {
        let fs = MemoryBackend::new();
        fs.writebytes(Path::new("test.txt"), b"").await.unwrap();
        assert!(fs.exists(Path::new("test.txt")).await.unwrap());

        fs.remove(Path::new("test.txt")).await.unwrap();
        assert!(!fs.exists(Path::new("test.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_removedir() {
        let fs = MemoryBackend::new();
        fs.makedir(Path::new("empty"), false).await.unwrap();
        fs.removedir(Path::new("empty")).await.unwrap();
        assert!(!fs.isdir(Path::new("empty")).await.unwrap());
    }

    #[tokio::test]
    async fn test_removedir_not_empty() {
        let fs = MemoryBackend::new();
        fs.makedir(Path::new("nonempty"), false).await.unwrap();
        fs.writebytes(Path::new("nonempty/file.txt"), b"")
            .await
            .unwrap();

        let result = fs.removedir(Path::new("nonempty")).await;
        assert!(matches!(result, Err(VfsError::DirectoryNotEmpty(_))));
    }

    #[tokio::test]
    async fn test_setinfo_truncates() {
        let fs = MemoryBackend::new();
        fs.writebytes(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        fs.setinfo(Path::new("test.txt"), &SetInfo::new().with_size(5).with_perm(0o600))
            .await
            .unwrap();

        assert_eq!(fs.readbytes(Path::new("test.txt")).await.unwrap(), b"hello");
        let info = fs
            .getinfo(Path::new("test.txt"), Namespaces::ALL)
            .await
            .unwrap();
        assert_eq!(info.access.unwrap().perm, 0o600);
    }

    #[tokio::test]
    async fn test_path_normalization() {
        let fs = MemoryBackend::new();
        fs.makedir(Path::new("a"), false).await.unwrap();
        fs.makedir(Path::new("a/b"), false).await.unwrap();
        fs.writebytes(Path::new("/a/b/c.txt"), b"").await.unwrap();

        // Various path forms should all work
        assert!(fs.isfile(Path::new("a/b/c.txt")).await.unwrap());
        assert!(fs.isfile(Path::new("/a/b/c.txt")).await.unwrap());
        assert!(fs.isfile(Path::new("a/./b/c.txt")).await.unwrap());
        assert!(fs.isfile(Path::new("a/b/../b/c.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_syspath_or_url() {
        let fs = MemoryBackend::new();
        assert!(matches!(
            fs.getsyspath(Path::new("x")).await,
            Err(VfsError::NoSysPath(_))
        ));
        assert!(!fs
            .hasurl(Path::new("x"), crate::vfs::types::UrlPurpose::Download)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_write_past_addressable_end() {
        let fs = MemoryBackend::new();
        let mut file = fs
            .open(Path::new("f"), "w", &OpenOptions::default())
            .await
            .unwrap();

        file.seek(io::SeekFrom::Start(u64::MAX)).await.unwrap();
        let err = file.write_all(b"z").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        // The file is untouched and the handle still works from a sane offset.
        file.seek(io::SeekFrom::Start(0)).await.unwrap();
        file.write_all(b"ok").await.unwrap();
        drop(file);
        assert_eq!(fs.readbytes(Path::new("f")).await.unwrap(), b"ok");
    }
}
