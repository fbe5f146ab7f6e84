//! Local filesystem backend.
//!
//! Provides access to real filesystem paths, with path security
//! to prevent escaping the root directory.

use async_trait::async_trait;
use std::ops::Range;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::index::paginate;
use crate::vfs::ops::{VfsFile, VfsOps};
use crate::vfs::types::{
    FileAttr, FileType, Info, Namespaces, OpenFlags, OpenOptions, SetInfo, UrlPurpose,
};

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `readbytes("src/main.rs")` reads
/// `/home/amy/project/src/main.rs`.
///
/// Path security is enforced: attempts to escape via `..` are blocked.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    read_only: bool,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            read_only: false,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        let mut backend = Self::new(root);
        backend.read_only = true;
        backend
    }

    /// Set whether this filesystem is read-only.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative path onto the root without touching the disk.
    ///
    /// Rejects `..` components outright.
    fn join(&self, path: &Path) -> VfsResult<PathBuf> {
        let mut full = self.root.clone();
        for component in path.components() {
            match component {
                std::path::Component::Normal(s) => full.push(s),
                std::path::Component::ParentDir => {
                    return Err(VfsError::permission_denied(format!(
                        "{} escapes {}",
                        path.display(),
                        self.root.display()
                    )));
                }
                _ => {}
            }
        }
        Ok(full)
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// Symlinks are followed; the result must still be under the root.
    fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        let full = self.join(path)?;

        // For new files, canonicalize parent and append filename
        let canonical = if full.exists() {
            dunce::canonicalize(&full)?
        } else {
            match (full.parent(), full.file_name()) {
                (Some(parent), Some(filename)) if parent.exists() => {
                    dunce::canonicalize(parent)?.join(filename)
                }
                // Parent doesn't exist, will fail on actual operation
                _ => full,
            }
        };

        // Verify we haven't escaped the root
        if !canonical.starts_with(&self.root) {
            return Err(VfsError::permission_denied(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }

        Ok(canonical)
    }

    /// Check if write operations are allowed.
    fn check_writable(&self, path: &Path) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::read_only(path.display().to_string()))
        } else {
            Ok(())
        }
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else if meta.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        };

        FileAttr {
            size: meta.len(),
            kind,
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            atime: meta.accessed().ok(),
            ctime: meta.created().ok(),
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        }
    }

    fn name_of(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VfsOps for LocalBackend {
    async fn getinfo(&self, path: &Path, namespaces: Namespaces) -> VfsResult<Info> {
        let full_path = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full_path).await?;
        Ok(Self::metadata_to_attr(&meta).to_info(Self::name_of(path), namespaces))
    }

    async fn scandir(
        &self,
        path: &Path,
        namespaces: Namespaces,
        page: Option<Range<usize>>,
    ) -> VfsResult<Vec<Info>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let info = if namespaces == Namespaces::BASIC {
                let file_type = entry.file_type().await?;
                let kind = if file_type.is_dir() {
                    FileType::Directory
                } else if file_type.is_symlink() {
                    FileType::Symlink
                } else {
                    FileType::File
                };
                Info {
                    name,
                    kind,
                    details: None,
                    access: None,
                }
            } else {
                let meta = fs::symlink_metadata(entry.path()).await?;
                Self::metadata_to_attr(&meta).to_info(name, namespaces)
            };
            entries.push(info);
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(entries, page))
    }

    async fn openbin(
        &self,
        path: &Path,
        flags: OpenFlags,
        options: &OpenOptions,
    ) -> VfsResult<Box<dyn VfsFile>> {
        if flags.is_write() {
            self.check_writable(path)?;
        }
        let full_path = self.resolve(path)?;

        if let Ok(meta) = fs::metadata(&full_path).await {
            if meta.is_dir() {
                return Err(VfsError::file_expected(path.display().to_string()));
            }
        }

        let mut open = fs::OpenOptions::new();
        open.read(flags.read)
            .write(flags.write && !flags.append)
            .append(flags.append)
            .truncate(flags.truncate);
        if flags.exclusive {
            open.create_new(true);
        } else {
            open.create(flags.create);
        }
        if let Some(perm) = options.permissions() {
            open.mode(perm);
        }

        let file = open.open(&full_path).await?;
        Ok(Box::new(file))
    }

    async fn makedir(&self, path: &Path, recreate: bool) -> VfsResult<()> {
        self.check_writable(path)?;
        let full_path = self.resolve(path)?;

        match fs::create_dir(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && recreate => {
                if fs::metadata(&full_path).await?.is_dir() {
                    Ok(())
                } else {
                    Err(VfsError::already_exists(path.display().to_string()))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, path: &Path) -> VfsResult<()> {
        self.check_writable(path)?;
        let full_path = self.resolve(path)?;
        if fs::symlink_metadata(&full_path).await?.is_dir() {
            return Err(VfsError::file_expected(path.display().to_string()));
        }
        fs::remove_file(&full_path).await.map_err(VfsError::from)
    }

    async fn removedir(&self, path: &Path) -> VfsResult<()> {
        self.check_writable(path)?;
        let full_path = self.resolve(path)?;
        if full_path == self.root {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        fs::remove_dir(&full_path).await.map_err(VfsError::from)
    }

    async fn setinfo(&self, path: &Path, info: &SetInfo) -> VfsResult<()> {
        self.check_writable(path)?;
        let full_path = self.resolve(path)?;

        if info.uid.is_some() || info.gid.is_some() {
            return Err(VfsError::unsupported("changing ownership"));
        }

        // Handle size
        if let Some(size) = info.size {
            let file = fs::OpenOptions::new().write(true).open(&full_path).await?;
            file.set_len(size).await?;
        }

        // Handle permissions
        if let Some(perm) = info.perm {
            let permissions = std::fs::Permissions::from_mode(perm);
            fs::set_permissions(&full_path, permissions).await?;
        }

        if info.mtime.is_some() || info.atime.is_some() {
            let mut times = std::fs::FileTimes::new();
            if let Some(mtime) = info.mtime {
                times = times.set_modified(mtime);
            }
            if let Some(atime) = info.atime {
                times = times.set_accessed(atime);
            }
            let file = std::fs::File::open(&full_path)?;
            file.set_times(times)?;
        }

        Ok(())
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn label(&self) -> String {
        format!("<osfs '{}'>", self.root.display())
    }

    async fn getsyspath(&self, path: &Path) -> VfsResult<PathBuf> {
        self.join(path)
    }

    async fn geturl(&self, path: &Path, purpose: UrlPurpose) -> VfsResult<String> {
        let sys_path = self.join(path)?;
        Ok(match purpose {
            UrlPurpose::Download => format!("file://{}", sys_path.display()),
            UrlPurpose::Fs => format!("osfs://{}", sys_path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        (backend, dir)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (backend, _dir) = setup();

        backend
            .writebytes(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        let data = backend.readbytes(Path::new("test.txt")).await.unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(backend.getsize(Path::new("test.txt")).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_append_through_handle() {
        let (backend, _dir) = setup();
        backend.writebytes(Path::new("log"), b"a").await.unwrap();

        let mut file = backend
            .open(Path::new("log"), "a", &OpenOptions::default())
            .await
            .unwrap();
        file.write_all(b"b").await.unwrap();
        file.shutdown().await.unwrap();

        let mut file = backend
            .open(Path::new("log"), "rb", &OpenOptions::default())
            .await
            .unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn test_makedir_and_scandir() {
        let (backend, _dir) = setup();

        backend.makedir(Path::new("subdir"), false).await.unwrap();
        backend
            .writebytes(Path::new("subdir/file.txt"), b"x")
            .await
            .unwrap();
        backend
            .writebytes(Path::new("root.txt"), b"")
            .await
            .unwrap();

        let names = backend.listdir(Path::new("")).await.unwrap();
        assert_eq!(names, ["root.txt", "subdir"]);

        let detailed = backend
            .scandir(Path::new("subdir"), Namespaces::ALL, None)
            .await
            .unwrap();
        assert_eq!(detailed[0].size(), Some(1));
        assert!(detailed[0].access.is_some());
    }

    #[tokio::test]
    async fn test_makedir_existing() {
        let (backend, _dir) = setup();
        backend.makedir(Path::new("d"), false).await.unwrap();

        let err = backend.makedir(Path::new("d"), false).await.unwrap_err();
        assert_eq!(err.kind(), crate::vfs::ErrorKind::AlreadyExists);
        backend.makedir(Path::new("d"), true).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only() {
        let (mut backend, _dir) = setup();
        backend.set_read_only(true);

        let result = backend.writebytes(Path::new("test.txt"), b"x").await;
        assert!(matches!(result, Err(VfsError::ReadOnly(_))));
    }

    #[tokio::test]
    async fn test_path_escape_blocked() {
        let (backend, _dir) = setup();

        let result = backend.readbytes(Path::new("../../../etc/passwd")).await;
        assert!(matches!(result, Err(VfsError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_open_directory_as_file() {
        let (backend, _dir) = setup();
        backend.makedir(Path::new("d"), false).await.unwrap();

        let result = backend.readbytes(Path::new("d")).await;
        assert!(matches!(result, Err(VfsError::FileExpected(_))));
    }

    #[tokio::test]
    async fn test_remove_and_removedir() {
        let (backend, _dir) = setup();
        backend.makedir(Path::new("d"), false).await.unwrap();
        backend.writebytes(Path::new("d/f"), b"").await.unwrap();

        let err = backend.removedir(Path::new("d")).await.unwrap_err();
        assert_eq!(err.kind(), crate::vfs::ErrorKind::DirectoryNotEmpty);

        backend.remove(Path::new("d/f")).await.unwrap();
        backend.removedir(Path::new("d")).await.unwrap();
        assert!(!backend.exists(Path::new("d")).await.unwrap());

        assert!(backend.removedir(Path::new("")).await.is_err());
    }

    #[tokio::test]
    async fn test_setinfo_size_and_perm() {
        let (backend, _dir) = setup();
        backend
            .writebytes(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        backend
            .setinfo(
                Path::new("test.txt"),
                &SetInfo::new().with_size(5).with_perm(0o600),
            )
            .await
            .unwrap();

        assert_eq!(backend.readbytes(Path::new("test.txt")).await.unwrap(), b"hello");
        let info = backend
            .getinfo(Path::new("test.txt"), Namespaces::ALL)
            .await
            .unwrap();
        assert_eq!(info.access.unwrap().perm, 0o600);
    }

    #[tokio::test]
    async fn test_syspath_and_urls() {
        let (backend, _dir) = setup();
        std::fs::write(backend.root().join("test.txt"), "hello").unwrap();

        let sys = backend.getsyspath(Path::new("test.txt")).await.unwrap();
        assert!(sys.is_absolute());
        assert!(sys.ends_with("test.txt"));

        let url = backend
            .geturl(Path::new("test.txt"), UrlPurpose::Download)
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/test.txt"));

        assert!(backend.getsyspath(Path::new("../etc/passwd")).await.is_err());
    }
}
