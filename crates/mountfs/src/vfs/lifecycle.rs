//! Façade lifecycle and ownership of mounted filesystems.

use super::error::{CloseFailure, VfsError, VfsResult};
use super::table::MountPoint;

/// Façade state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Open,
    Closed,
}

impl Lifecycle {
    pub fn check_open(self) -> VfsResult<()> {
        match self {
            Lifecycle::Open => Ok(()),
            Lifecycle::Closed => Err(VfsError::Closed),
        }
    }
}

/// Close every owned filesystem in `mounts`, each once.
///
/// Attached filesystems are dropped untouched. All owned filesystems are
/// attempted even if some fail; failures are reported together.
pub async fn close_owned(mounts: Vec<MountPoint>) -> VfsResult<()> {
    let mut failures = Vec::new();

    for mount in mounts.into_iter().filter(|m| m.owned) {
        match mount.fs.close().await {
            Ok(()) => {
                tracing::debug!(mount = %mount.path, fs = %mount.fs.label(), "closed mounted filesystem");
            }
            Err(error) => {
                tracing::warn!(mount = %mount.path, error = %error, "failed to close mounted filesystem");
                failures.push(CloseFailure {
                    mount: mount.path.to_string(),
                    error,
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(VfsError::CloseFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;
    use crate::vfs::ops::VfsOps;
    use crate::vfs::path::VirtualPath;
    use std::sync::Arc;

    #[test]
    fn test_check_open() {
        assert!(Lifecycle::Open.check_open().is_ok());
        assert!(matches!(Lifecycle::Closed.check_open(), Err(VfsError::Closed)));
        assert_eq!(Lifecycle::Closed.to_string(), "closed");
    }

    #[tokio::test]
    async fn test_close_nothing() {
        close_owned(Vec::new()).await.unwrap();

        let fs: Arc<dyn VfsOps> = Arc::new(MemoryBackend::new());
        let attached = MountPoint {
            path: VirtualPath::normalize("/a").unwrap(),
            fs,
            owned: false,
        };
        close_owned(vec![attached]).await.unwrap();
    }
}
