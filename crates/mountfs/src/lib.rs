//! # mountfs
//!
//! A filesystem façade that mounts other filesystems into a single virtual
//! namespace.
//!
//! ```no_run
//! # async fn demo() -> mountfs::VfsResult<()> {
//! use mountfs::{MountFs, VfsOps};
//! use std::path::Path;
//!
//! let fs = MountFs::new();
//! fs.mount("/scratch", "mem://").await?;
//! fs.writebytes(Path::new("/scratch/hello.txt"), b"hi").await?;
//! assert_eq!(fs.listdir(Path::new("/")).await?, ["scratch"]);
//! fs.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod vfs;

pub use config::{ConfigError, MountEntry, MountFsConfig};
pub use vfs::{
    ErrorKind, LocalBackend, MemoryBackend, MountFs, MountInfo, MountSource, Ownership, VfsError,
    VfsOps, VfsResult,
};
