//! Core VFS types.
//!
//! Metadata is modelled as [`Info`], split into namespaces the caller opts
//! into. Backends usually hold a full [`FileAttr`] and project it with
//! [`FileAttr::to_info`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::SystemTime;

use super::error::VfsError;

/// Default chunk size for `upload`/`download`.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// Which metadata namespaces to populate in an [`Info`].
///
/// The basic namespace (name and type) is always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespaces {
    /// Size and timestamps.
    pub details: bool,
    /// Permissions and ownership.
    pub access: bool,
}

impl Namespaces {
    /// Name and type only.
    pub const BASIC: Self = Self {
        details: false,
        access: false,
    };

    /// Basic plus size and timestamps.
    pub const DETAILS: Self = Self {
        details: true,
        access: false,
    };

    /// Every namespace.
    pub const ALL: Self = Self {
        details: true,
        access: true,
    };
}

/// Size and timestamps of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
    pub created: Option<SystemTime>,
}

/// Permissions and ownership of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    /// Unix permissions (e.g., 0o644).
    pub perm: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Resource metadata, as returned by `getinfo` and `scandir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Entry name (not full path). Empty for a filesystem root.
    pub name: String,
    pub kind: FileType,
    /// Present when the `details` namespace was requested.
    pub details: Option<Details>,
    /// Present when the `access` namespace was requested.
    pub access: Option<Access>,
}

impl Info {
    /// Basic info for a directory.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileType::Directory,
            details: None,
            access: None,
        }
    }

    /// Basic info for a file.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileType::File,
            details: None,
            access: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Size in bytes, if the details namespace was loaded.
    pub fn size(&self) -> Option<u64> {
        self.details.as_ref().map(|d| d.size)
    }
}

/// Full attributes as stored by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permissions (e.g., 0o644).
    pub perm: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time (optional).
    pub atime: Option<SystemTime>,
    /// Creation time (optional).
    pub ctime: Option<SystemTime>,
    /// User ID (optional, for local fs).
    pub uid: Option<u32>,
    /// Group ID (optional, for local fs).
    pub gid: Option<u32>,
}

impl FileAttr {
    /// Create attributes for a new file.
    pub fn file(size: u64, perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            size,
            kind: FileType::File,
            perm,
            mtime: now,
            atime: Some(now),
            ctime: Some(now),
            uid: None,
            gid: None,
        }
    }

    /// Create attributes for a new directory.
    pub fn directory(perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            size: 0,
            kind: FileType::Directory,
            perm,
            mtime: now,
            atime: Some(now),
            ctime: Some(now),
            uid: None,
            gid: None,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Project into an [`Info`] carrying only the requested namespaces.
    pub fn to_info(&self, name: impl Into<String>, namespaces: Namespaces) -> Info {
        Info {
            name: name.into(),
            kind: self.kind,
            details: namespaces.details.then(|| Details {
                size: if self.is_dir() { 0 } else { self.size },
                modified: Some(self.mtime),
                accessed: self.atime,
                created: self.ctime,
            }),
            access: namespaces.access.then(|| Access {
                perm: self.perm,
                uid: self.uid,
                gid: self.gid,
            }),
        }
    }
}

/// Attributes to set (for the `setinfo` operation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetInfo {
    /// New size (truncate/extend).
    pub size: Option<u64>,
    /// New modification time.
    pub mtime: Option<SystemTime>,
    /// New access time.
    pub atime: Option<SystemTime>,
    /// New permissions.
    pub perm: Option<u32>,
    /// New user ID.
    pub uid: Option<u32>,
    /// New group ID.
    pub gid: Option<u32>,
}

impl SetInfo {
    /// Create a new empty SetInfo.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Set permissions.
    pub fn with_perm(mut self, perm: u32) -> Self {
        self.perm = Some(perm);
        self
    }
}

/// Open file flags.
///
/// Parses the usual mode strings: one of `r`, `w`, `a`, `x`, optionally
/// followed by `+`, `b` or `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access (`r`).
    pub fn read() -> Self {
        Self::default()
    }

    /// Create or truncate, write-only (`w`).
    pub fn create_truncate() -> Self {
        Self {
            read: false,
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// Create if missing, writes go to the end (`a`).
    pub fn append() -> Self {
        Self {
            read: false,
            write: true,
            append: true,
            create: true,
            ..Default::default()
        }
    }

    /// Create exclusively (`x`), fails if the file exists.
    pub fn create_exclusive() -> Self {
        Self {
            read: false,
            write: true,
            create: true,
            exclusive: true,
            ..Default::default()
        }
    }

    /// Returns true if the mode can modify or create the target.
    pub fn is_write(&self) -> bool {
        self.write || self.append || self.create || self.truncate
    }
}

impl FromStr for OpenFlags {
    type Err = VfsError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        let invalid = || VfsError::InvalidMode(mode.to_string());

        if mode.is_empty() || mode.chars().any(|c| !"rwxab+t".contains(c)) {
            return Err(invalid());
        }
        if mode.contains('b') && mode.contains('t') {
            return Err(invalid());
        }
        let primaries: Vec<char> = mode.chars().filter(|c| "rwxa".contains(*c)).collect();
        let mut flags = match primaries.as_slice() {
            ['r'] => Self::read(),
            ['w'] => Self::create_truncate(),
            ['a'] => Self::append(),
            ['x'] => Self::create_exclusive(),
            _ => return Err(invalid()),
        };
        if mode.contains('+') {
            flags.read = true;
            flags.write = true;
        }
        Ok(flags)
    }
}

/// Backend-specific option, passed through the façade untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendOption {
    /// Permission bits for newly created files.
    Permissions(u32),
    /// MIME type for object stores.
    ContentType(String),
    /// Arbitrary user metadata attached to the object.
    Metadata { key: String, value: String },
    /// Anything else, keyed by name.
    Custom { key: String, value: String },
}

/// Options for `openbin`/`open`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Buffer size hint. `None` lets the backend decide.
    pub buffering: Option<usize>,
    /// Options only specific backends understand.
    pub backend: Vec<BackendOption>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_option(mut self, option: BackendOption) -> Self {
        self.backend.push(option);
        self
    }

    /// Requested permission bits, if any.
    pub fn permissions(&self) -> Option<u32> {
        self.backend.iter().find_map(|o| match o {
            BackendOption::Permissions(p) => Some(*p),
            _ => None,
        })
    }
}

/// How undecodable bytes are handled by `readtext`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextErrors {
    /// Fail on invalid data.
    #[default]
    Strict,
    /// Substitute U+FFFD.
    Replace,
}

/// Newline translation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Newline {
    /// Read: `\r\n` and `\r` become `\n`. Write: untouched.
    #[default]
    Universal,
    /// No translation.
    Lf,
    /// Read: `\r\n` becomes `\n`. Write: `\n` becomes `\r\n`.
    CrLf,
}

/// Options for `readtext`/`writetext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOptions {
    /// Only UTF-8 is supported.
    pub encoding: String,
    pub errors: TextErrors,
    pub newline: Newline,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            errors: TextErrors::default(),
            newline: Newline::default(),
        }
    }
}

impl TextOptions {
    pub(crate) fn check_encoding(&self) -> Result<(), VfsError> {
        match self.encoding.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(()),
            other => Err(VfsError::unsupported(format!("encoding {other}"))),
        }
    }

    pub(crate) fn decode(&self, bytes: Vec<u8>) -> Result<String, VfsError> {
        self.check_encoding()?;
        let text = match self.errors {
            TextErrors::Strict => String::from_utf8(bytes)
                .map_err(|e| VfsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?,
            TextErrors::Replace => String::from_utf8_lossy(&bytes).into_owned(),
        };
        Ok(match self.newline {
            Newline::Universal => text.replace("\r\n", "\n").replace('\r', "\n"),
            Newline::CrLf => text.replace("\r\n", "\n"),
            Newline::Lf => text,
        })
    }

    pub(crate) fn encode(&self, text: &str) -> Result<Vec<u8>, VfsError> {
        self.check_encoding()?;
        Ok(match self.newline {
            Newline::CrLf => text.replace('\n', "\r\n").into_bytes(),
            Newline::Universal | Newline::Lf => text.as_bytes().to_vec(),
        })
    }
}

/// Options for `upload`/`download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Bytes copied per read.
    pub chunk_size: usize,
    /// Passed to `openbin` on the filesystem side of the copy.
    pub open: OpenOptions,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            open: OpenOptions::default(),
        }
    }
}

impl TransferOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// What a URL from `geturl` is meant for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UrlPurpose {
    /// A URL a client can fetch the bytes from.
    #[default]
    Download,
    /// A locator that reopens the filesystem itself.
    Fs,
}
