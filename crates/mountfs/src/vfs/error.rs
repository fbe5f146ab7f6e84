//! VFS error types.
//!
//! [`VfsError`] is shared by the façade and by backends. Backends report
//! whatever variant fits; the façade wraps anything a backend returns into
//! [`VfsError::Backing`], keeping only the [`ErrorKind`] and the residual path.

use std::io;
use thiserror::Error;

use super::types::UrlPurpose;

/// Backend-independent classification of a [`VfsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidPath,
    NotFound,
    ReadOnly,
    AlreadyExists,
    PermissionDenied,
    DirectoryExpected,
    FileExpected,
    DirectoryNotEmpty,
    InvalidMode,
    Mount,
    Closed,
    NoSysPath,
    NoUrl,
    Unsupported,
    CloseFailed,
    Io,
    Other,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Malformed or unnormalizable path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Path does not resolve to any real or implied resource.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Write attempted against a node that cannot be written.
    #[error("resource is read-only: {0}")]
    ReadOnly(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a directory.
    #[error("directory expected: {0}")]
    DirectoryExpected(String),

    /// Expected a file.
    #[error("file expected: {0}")]
    FileExpected(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Unparseable open mode.
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// Invalid mount registration.
    #[error("mount error: {0}")]
    Mount(String),

    /// Operation attempted after `close()`.
    #[error("filesystem is closed")]
    Closed,

    /// The filesystem has no native path for this resource.
    #[error("no system path for {0}")]
    NoSysPath(String),

    /// The filesystem cannot produce a URL for this resource.
    #[error("no {purpose} url for {path}")]
    NoUrl { path: String, purpose: UrlPurpose },

    /// Operation or option not supported by this filesystem.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Error surfaced by a mounted filesystem.
    #[error("{kind} in mounted filesystem at {path}: {message}")]
    Backing {
        kind: ErrorKind,
        path: String,
        message: String,
    },

    /// One or more owned filesystems failed to close.
    #[error("failed to close {} mounted filesystem(s)", .0.len())]
    CloseFailed(Vec<CloseFailure>),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A single failed close, reported inside [`VfsError::CloseFailed`].
#[derive(Debug)]
pub struct CloseFailure {
    /// Mount point of the filesystem that failed to close.
    pub mount: String,
    pub error: VfsError,
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a ReadOnly error.
    pub fn read_only(path: impl Into<String>) -> Self {
        Self::ReadOnly(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a DirectoryExpected error.
    pub fn directory_expected(path: impl Into<String>) -> Self {
        Self::DirectoryExpected(path.into())
    }

    /// Create a FileExpected error.
    pub fn file_expected(path: impl Into<String>) -> Self {
        Self::FileExpected(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a Mount error.
    pub fn mount(msg: impl Into<String>) -> Self {
        Self::Mount(msg.into())
    }

    /// Create a NoSysPath error.
    pub fn no_sys_path(path: impl Into<String>) -> Self {
        Self::NoSysPath(path.into())
    }

    /// Create a NoUrl error.
    pub fn no_url(path: impl Into<String>, purpose: UrlPurpose) -> Self {
        Self::NoUrl {
            path: path.into(),
            purpose,
        }
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Classify this error.
    ///
    /// `Backing` reports the kind it was wrapped with, and `Io` is
    /// classified by its [`io::ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::InvalidPath(_) => ErrorKind::InvalidPath,
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::ReadOnly(_) => ErrorKind::ReadOnly,
            VfsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VfsError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            VfsError::DirectoryExpected(_) => ErrorKind::DirectoryExpected,
            VfsError::FileExpected(_) => ErrorKind::FileExpected,
            VfsError::DirectoryNotEmpty(_) => ErrorKind::DirectoryNotEmpty,
            VfsError::InvalidMode(_) => ErrorKind::InvalidMode,
            VfsError::Mount(_) => ErrorKind::Mount,
            VfsError::Closed => ErrorKind::Closed,
            VfsError::NoSysPath(_) => ErrorKind::NoSysPath,
            VfsError::NoUrl { .. } => ErrorKind::NoUrl,
            VfsError::Unsupported(_) => ErrorKind::Unsupported,
            VfsError::Backing { kind, .. } => *kind,
            VfsError::CloseFailed(_) => ErrorKind::CloseFailed,
            VfsError::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
                io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                io::ErrorKind::ReadOnlyFilesystem => ErrorKind::ReadOnly,
                io::ErrorKind::NotADirectory => ErrorKind::DirectoryExpected,
                io::ErrorKind::IsADirectory => ErrorKind::FileExpected,
                io::ErrorKind::DirectoryNotEmpty => ErrorKind::DirectoryNotEmpty,
                io::ErrorKind::Unsupported => ErrorKind::Unsupported,
                _ => ErrorKind::Io,
            },
            VfsError::Other(_) => ErrorKind::Other,
        }
    }

    /// Returns true for errors that mean "nothing there".
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true if this error came from a mounted filesystem.
    pub fn is_backing(&self) -> bool {
        matches!(self, VfsError::Backing { .. })
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let kind = match e.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::ReadOnly => io::ErrorKind::ReadOnlyFilesystem,
            ErrorKind::DirectoryExpected => io::ErrorKind::NotADirectory,
            ErrorKind::FileExpected => io::ErrorKind::IsADirectory,
            ErrorKind::DirectoryNotEmpty => io::ErrorKind::DirectoryNotEmpty,
            ErrorKind::InvalidPath | ErrorKind::InvalidMode => io::ErrorKind::InvalidInput,
            ErrorKind::Unsupported | ErrorKind::NoSysPath | ErrorKind::NoUrl => {
                io::ErrorKind::Unsupported
            }
            _ => io::ErrorKind::Other,
        };
        match e {
            VfsError::Io(e) => e,
            other => io::Error::new(kind, other.to_string()),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
