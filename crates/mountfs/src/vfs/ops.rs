//! VFS operations trait.
//!
//! Every filesystem, the mount façade included, implements [`VfsOps`].
//! Backends implement the required methods; the convenience methods have
//! default implementations built on `getinfo`, `scandir` and `openbin`.

use async_trait::async_trait;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncWrite, AsyncWriteExt, BufReader};

use super::error::{VfsError, VfsResult};
use super::types::{
    FileType, Info, Namespaces, OpenFlags, OpenOptions, SetInfo, TextOptions, TransferOptions,
    UrlPurpose,
};

/// An open file handle. Owned by the caller once returned.
pub trait VfsFile: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin> VfsFile for T {}

/// Core VFS operations trait.
///
/// Paths are relative to the filesystem's root; a leading `/` is accepted.
/// The empty path is the root.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get metadata for a resource.
    async fn getinfo(&self, path: &Path, namespaces: Namespaces) -> VfsResult<Info>;

    /// List a directory with metadata.
    ///
    /// `page` selects a window of the listing (`start..end` entry indices).
    async fn scandir(
        &self,
        path: &Path,
        namespaces: Namespaces,
        page: Option<Range<usize>>,
    ) -> VfsResult<Vec<Info>>;

    /// Open a binary stream.
    async fn openbin(
        &self,
        path: &Path,
        flags: OpenFlags,
        options: &OpenOptions,
    ) -> VfsResult<Box<dyn VfsFile>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a directory. The parent must exist.
    ///
    /// With `recreate`, an existing directory is not an error.
    async fn makedir(&self, path: &Path, recreate: bool) -> VfsResult<()>;

    /// Remove a file.
    async fn remove(&self, path: &Path) -> VfsResult<()>;

    /// Remove an empty directory.
    async fn removedir(&self, path: &Path) -> VfsResult<()>;

    /// Set resource attributes.
    async fn setinfo(&self, path: &Path, info: &SetInfo) -> VfsResult<()>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool;

    /// Short human-readable name, e.g. `<memfs>`.
    fn label(&self) -> String;

    /// Native filesystem path for a resource.
    async fn getsyspath(&self, path: &Path) -> VfsResult<PathBuf> {
        Err(VfsError::no_sys_path(path.display().to_string()))
    }

    /// External URL for a resource.
    async fn geturl(&self, path: &Path, purpose: UrlPurpose) -> VfsResult<String> {
        Err(VfsError::no_url(path.display().to_string(), purpose))
    }

    /// Release resources. Further use is backend-defined.
    async fn close(&self) -> VfsResult<()> {
        Ok(())
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Names in a directory.
    async fn listdir(&self, path: &Path) -> VfsResult<Vec<String>> {
        let entries = self.scandir(path, Namespaces::BASIC, None).await?;
        Ok(entries.into_iter().map(|info| info.name).collect())
    }

    /// Open with a mode string (`"r"`, `"wb"`, `"a+"`, ...).
    async fn open(
        &self,
        path: &Path,
        mode: &str,
        options: &OpenOptions,
    ) -> VfsResult<Box<dyn VfsFile>> {
        let flags: OpenFlags = mode.parse()?;
        self.openbin(path, flags, options).await
    }

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> VfsResult<bool> {
        match self.getinfo(path, Namespaces::BASIC).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn isdir(&self, path: &Path) -> VfsResult<bool> {
        match self.getinfo(path, Namespaces::BASIC).await {
            Ok(info) => Ok(info.is_dir()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn isfile(&self, path: &Path) -> VfsResult<bool> {
        match self.getinfo(path, Namespaces::BASIC).await {
            Ok(info) => Ok(info.is_file()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn gettype(&self, path: &Path) -> VfsResult<FileType> {
        Ok(self.getinfo(path, Namespaces::BASIC).await?.kind)
    }

    /// Size of a resource in bytes.
    async fn getsize(&self, path: &Path) -> VfsResult<u64> {
        let info = self.getinfo(path, Namespaces::DETAILS).await?;
        Ok(info.size().unwrap_or(0))
    }

    /// Read entire file contents.
    async fn readbytes(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let mut file = self
            .openbin(path, OpenFlags::read(), &OpenOptions::default())
            .await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Replace entire file contents, creating the file if needed.
    async fn writebytes(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let mut file = self
            .openbin(path, OpenFlags::create_truncate(), &OpenOptions::default())
            .await?;
        file.write_all(data).await?;
        file.shutdown().await?;
        Ok(())
    }

    async fn readtext(&self, path: &Path, options: &TextOptions) -> VfsResult<String> {
        options.check_encoding()?;
        let bytes = self.readbytes(path).await?;
        options.decode(bytes)
    }

    async fn writetext(&self, path: &Path, text: &str, options: &TextOptions) -> VfsResult<()> {
        let bytes = options.encode(text)?;
        self.writebytes(path, &bytes).await
    }

    /// Copy a reader into a file, `chunk_size` bytes at a time.
    ///
    /// Returns the number of bytes copied.
    async fn upload(
        &self,
        path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        options: &TransferOptions,
    ) -> VfsResult<u64> {
        let mut file = self
            .openbin(path, OpenFlags::create_truncate(), &options.open)
            .await?;
        let mut reader = BufReader::with_capacity(options.chunk_size.max(1), reader);
        let copied = tokio::io::copy_buf(&mut reader, &mut file).await?;
        file.shutdown().await?;
        Ok(copied)
    }

    /// Copy a file into a writer, `chunk_size` bytes at a time.
    ///
    /// Returns the number of bytes copied.
    async fn download(
        &self,
        path: &Path,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        options: &TransferOptions,
    ) -> VfsResult<u64> {
        let file = self
            .openbin(path, OpenFlags::read(), &options.open)
            .await?;
        let mut reader = BufReader::with_capacity(options.chunk_size.max(1), file);
        let copied = tokio::io::copy_buf(&mut reader, &mut *writer).await?;
        writer.flush().await?;
        Ok(copied)
    }

    /// Returns true if `geturl` would succeed for this purpose.
    async fn hasurl(&self, path: &Path, purpose: UrlPurpose) -> VfsResult<bool> {
        match self.geturl(path, purpose).await {
            Ok(_) => Ok(true),
            Err(VfsError::NoUrl { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Describe what backs a path, for diagnostics.
    async fn desc(&self, path: &Path) -> VfsResult<String> {
        if !self.exists(path).await? {
            return Err(VfsError::not_found(path.display().to_string()));
        }
        Ok(format!("{} on {}", path.display(), self.label()))
    }
}
