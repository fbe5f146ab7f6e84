//! Concrete filesystems.
//!
//! Backends implement [`VfsOps`](super::VfsOps) over a path space rooted at
//! `/`. The mount façade hands them residual paths only.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
