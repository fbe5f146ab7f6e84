//! Virtual filesystem with a mount namespace.
//!
//! Key components:
//!
//! - [`VfsOps`] - Core trait for filesystem operations
//! - [`MountFs`] - Façade that routes operations to mounted filesystems
//! - [`MountTable`] - Longest-prefix mount bookkeeping
//! - [`MemoryBackend`] - In-memory filesystem (for /scratch, testing)
//! - [`LocalBackend`] - Local filesystem access (with path security)
//!
//! ## Design Decisions
//!
//! - **Paths are virtual**: every path is normalized to an absolute,
//!   `/`-separated [`VirtualPath`] before routing. `..` may not climb above
//!   the root.
//! - **Longest-prefix routing**: the most specific mount point wins, and
//!   prefixes only match whole segments (`/data` never owns `/database`).
//! - **Implied directories**: ancestors of mount points are listed and
//!   stat'ed from the table but are read-only.
//! - **Façades nest**: [`MountFs`] implements [`VfsOps`] itself.

pub mod backends;
mod error;
mod index;
mod lifecycle;
mod mount;
mod ops;
mod path;
mod source;
mod table;
mod types;

pub use backends::{LocalBackend, MemoryBackend};
pub use error::{CloseFailure, ErrorKind, VfsError, VfsResult};
pub use lifecycle::Lifecycle;
pub use mount::MountFs;
pub use ops::{VfsFile, VfsOps};
pub use path::VirtualPath;
pub use source::{LocatorResolver, MountSource, Ownership, SchemeResolver};
pub use table::{MountInfo, MountPoint, MountTable, Resolution};
pub use types::{
    Access, BackendOption, DEFAULT_CHUNK_SIZE, Details, FileAttr, FileType, Info, Namespaces,
    Newline, OpenFlags, OpenOptions, SetInfo, TextErrors, TextOptions, TransferOptions, UrlPurpose,
};
