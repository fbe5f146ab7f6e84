//! The mount filesystem façade.
//!
//! [`MountFs`] routes every operation to the filesystem mounted at the
//! longest matching prefix, and answers for the directories that only exist
//! because a mount point lies below them.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::{ErrorKind, VfsError, VfsResult};
use super::index::{merge_listing, paginate, synthetic_children, synthetic_info};
use super::lifecycle::{close_owned, Lifecycle};
use super::ops::{VfsFile, VfsOps};
use super::path::VirtualPath;
use super::source::{LocatorResolver, MountSource, Ownership, SchemeResolver};
use super::table::{MountInfo, MountTable, Resolution};
use super::types::{
    Info, Namespaces, OpenFlags, OpenOptions, SetInfo, TextOptions, TransferOptions, UrlPurpose,
};
use crate::config::MountFsConfig;

/// Mount table and lifecycle, guarded together.
#[derive(Debug, Default)]
struct State {
    lifecycle: Lifecycle,
    table: MountTable,
}

/// A filesystem that other filesystems are mounted into.
///
/// Mount points are matched by longest prefix. For example, if `/mnt` and
/// `/mnt/project` are both mounted, a path like `/mnt/project/src/main.rs`
/// will be routed to the `/mnt/project` mount. Directories above mount
/// points (`/` and `/mnt` when only `/mnt/project` is mounted) are listed
/// and stat'ed synthetically and cannot hold data.
///
/// The state lock is only held while resolving a path, never while a
/// mounted filesystem is doing work.
pub struct MountFs {
    state: RwLock<State>,
    resolver: Arc<dyn LocatorResolver>,
    config: MountFsConfig,
}

impl std::fmt::Debug for MountFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MountFs")
            .field("lifecycle", &state.lifecycle)
            .field("mounts", &state.table.len())
            .field("auto_close", &self.config.auto_close)
            .finish()
    }
}

impl Default for MountFs {
    fn default() -> Self {
        Self::new()
    }
}

/// A mounted filesystem plus the path to hand it.
struct Backed {
    mount_path: VirtualPath,
    fs: Arc<dyn VfsOps>,
    residual: VirtualPath,
    rel: PathBuf,
}

impl Backed {
    /// Rewrap a backend error so that only its kind survives.
    ///
    /// Capability answers are façade kinds in their own right and pass
    /// through unchanged.
    fn translate(&self, err: VfsError) -> VfsError {
        match err {
            e @ (VfsError::NoSysPath(_) | VfsError::NoUrl { .. } | VfsError::Unsupported(_)) => e,
            VfsError::Backing { kind, message, .. } => VfsError::Backing {
                kind,
                path: self.residual.to_string(),
                message,
            },
            other => VfsError::Backing {
                kind: other.kind(),
                path: self.residual.to_string(),
                message: other.to_string(),
            },
        }
    }
}

enum Target {
    Backed(Backed),
    Implied,
    Missing { parent_implied: bool },
}

/// A resolved path, detached from the state lock.
struct Route {
    path: VirtualPath,
    target: Target,
    /// Names contributed by mounts below this path.
    children: BTreeSet<String>,
}

impl Route {
    fn not_found(&self) -> VfsError {
        VfsError::not_found(self.path.to_string())
    }

    /// True when mounts below a backed path hide what the backend holds
    /// there, so the path only exists as a synthetic directory.
    async fn shadowed(&self, backed: &Backed) -> VfsResult<bool> {
        if self.children.is_empty() {
            return Ok(false);
        }
        match backed.fs.getinfo(&backed.rel, Namespaces::BASIC).await {
            Ok(info) => Ok(!info.is_dir()),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(backed.translate(e)),
        }
    }

    /// Target for an operation on file content.
    ///
    /// Implied directories and paths whose parent is implied are read-only
    /// for writes; anything with mounts below it is a directory.
    fn file(&self, write: bool) -> VfsResult<&Backed> {
        match &self.target {
            Target::Backed(backed) if self.children.is_empty() => Ok(backed),
            Target::Backed(_) => Err(VfsError::file_expected(self.path.to_string())),
            Target::Implied if write => Err(VfsError::read_only(self.path.to_string())),
            Target::Missing {
                parent_implied: true,
            } if write => Err(VfsError::read_only(self.path.to_string())),
            _ => Err(self.not_found()),
        }
    }
}

impl MountFs {
    /// Create an empty mount filesystem with default configuration.
    pub fn new() -> Self {
        Self::with_config(MountFsConfig::default())
    }

    pub fn with_config(config: MountFsConfig) -> Self {
        Self {
            state: RwLock::new(State::default()),
            resolver: Arc::new(SchemeResolver),
            config,
        }
    }

    /// Replace the resolver used for locator mounts.
    pub fn with_resolver(mut self, resolver: Arc<dyn LocatorResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Build a façade and mount every locator listed in `config`.
    ///
    /// If any mount fails, the mounts already made are closed before the
    /// error is returned.
    pub async fn from_config(config: MountFsConfig) -> VfsResult<Self> {
        Self::from_config_with_resolver(config, Arc::new(SchemeResolver)).await
    }

    /// [`from_config`](Self::from_config) with a custom locator resolver.
    pub async fn from_config_with_resolver(
        config: MountFsConfig,
        resolver: Arc<dyn LocatorResolver>,
    ) -> VfsResult<Self> {
        let entries = config.mounts.clone();
        let fs = Self::with_config(config).with_resolver(resolver);
        for entry in entries {
            if let Err(e) = fs.mount(&entry.path, entry.locator.as_str()).await {
                if let Err(close_err) = fs.close().await {
                    tracing::warn!(error = %close_err, "failed to close partially configured mounts");
                }
                return Err(e);
            }
        }
        Ok(fs)
    }

    /// Mount a filesystem at `path`.
    ///
    /// Locators are opened by the resolver and owned by the façade. Handles
    /// are attached (left open on close) unless `auto_close` is configured.
    pub async fn mount(
        &self,
        path: impl AsRef<Path>,
        source: impl Into<MountSource>,
    ) -> VfsResult<()> {
        let source = source.into();
        let ownership = match &source {
            MountSource::Handle(_) if !self.config.auto_close => Ownership::Attached,
            _ => Ownership::Owned,
        };
        self.mount_with(path, source, ownership).await
    }

    /// Mount with explicit ownership.
    ///
    /// Mount points are permanent; there is no unmount.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display(), ?ownership))]
    pub async fn mount_with(
        &self,
        path: impl AsRef<Path>,
        source: impl Into<MountSource>,
        ownership: Ownership,
    ) -> VfsResult<()> {
        self.state.read().lifecycle.check_open()?;
        let path = VirtualPath::from_path(path.as_ref())
            .map_err(|e| VfsError::mount(format!("invalid mount path: {e}")))?;

        let (fs, opened) = match source.into() {
            MountSource::Handle(fs) => (fs, false),
            MountSource::Locator(locator) => {
                let fs = self.resolver.open(&locator).map_err(|e| match e {
                    VfsError::Mount(_) => e,
                    other => VfsError::mount(format!("cannot open {locator}: {other}")),
                })?;
                (fs, true)
            }
        };

        let result = {
            let mut state = self.state.write();
            state
                .lifecycle
                .check_open()
                .and_then(|()| {
                    state
                        .table
                        .mount(path.clone(), Arc::clone(&fs), ownership.is_owned())
                })
        };

        match result {
            Ok(()) => {
                tracing::debug!(mount = %path, fs = %fs.label(), "mounted filesystem");
                Ok(())
            }
            Err(e) => {
                // Opened from a locator here; close what the table rejected.
                if opened {
                    if let Err(close_err) = fs.close().await {
                        tracing::warn!(mount = %path, error = %close_err, "failed to close rejected mount");
                    }
                }
                Err(e)
            }
        }
    }

    /// List all current mounts.
    pub fn mounts(&self) -> VfsResult<Vec<MountInfo>> {
        let state = self.state.read();
        state.lifecycle.check_open()?;
        Ok(state.table.list())
    }

    /// Transfer options built from the configured chunk size.
    ///
    /// Used by [`upload`](VfsOps::upload) and [`download`](VfsOps::download)
    /// callers that have no options of their own.
    pub fn transfer_options(&self) -> TransferOptions {
        self.config.transfer_options()
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().lifecycle == Lifecycle::Closed
    }

    /// Normalize a path without touching any filesystem.
    pub fn validatepath(&self, path: impl AsRef<Path>) -> VfsResult<String> {
        self.state.read().lifecycle.check_open()?;
        Ok(VirtualPath::from_path(path.as_ref())?.to_string())
    }

    /// Resolve `path` against the table. The lock is released on return.
    fn route(&self, path: &Path) -> VfsResult<Route> {
        let state = self.state.read();
        state.lifecycle.check_open()?;

        let path = VirtualPath::from_path(path)?;
        let children = synthetic_children(&state.table, &path);
        let target = match state.table.resolve(&path) {
            Resolution::Mounted {
                mount_path,
                fs,
                residual,
            } => Target::Backed(Backed {
                rel: residual.to_relative_path(),
                mount_path,
                fs,
                residual,
            }),
            Resolution::Implied => Target::Implied,
            Resolution::NoSuchPath => Target::Missing {
                parent_implied: path
                    .parent()
                    .is_some_and(|p| matches!(state.table.resolve(&p), Resolution::Implied)),
            },
        };

        if let Target::Backed(backed) = &target {
            tracing::debug!(path = %path, mount = %backed.mount_path, residual = %backed.residual, "routed");
        }
        Ok(Route {
            path,
            target,
            children,
        })
    }
}

impl Drop for MountFs {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.lifecycle == Lifecycle::Open {
            let owned = state.table.list().iter().filter(|m| m.owned).count();
            if owned > 0 {
                tracing::warn!(owned, "mount filesystem dropped without close; owned filesystems left open");
            }
        }
    }
}

#[async_trait]
impl VfsOps for MountFs {
    async fn getinfo(&self, path: &Path, namespaces: Namespaces) -> VfsResult<Info> {
        let route = self.route(path)?;
        let name = route.path.name().to_string();

        match &route.target {
            Target::Backed(backed) => match backed.fs.getinfo(&backed.rel, namespaces).await {
                Ok(info) if !route.children.is_empty() && !info.is_dir() => {
                    Ok(synthetic_info(name, namespaces))
                }
                Ok(mut info) => {
                    info.name = name;
                    Ok(info)
                }
                Err(e) if e.is_not_found() && !route.children.is_empty() => {
                    Ok(synthetic_info(name, namespaces))
                }
                Err(e) => Err(backed.translate(e)),
            },
            Target::Implied => Ok(synthetic_info(name, namespaces)),
            Target::Missing { .. } => Err(route.not_found()),
        }
    }

    async fn scandir(
        &self,
        path: &Path,
        namespaces: Namespaces,
        page: Option<Range<usize>>,
    ) -> VfsResult<Vec<Info>> {
        let route = self.route(path)?;

        match route.target {
            Target::Backed(backed) if route.children.is_empty() => backed
                .fs
                .scandir(&backed.rel, namespaces, page)
                .await
                .map_err(|e| backed.translate(e)),
            Target::Backed(backed) => {
                let real = match backed.fs.scandir(&backed.rel, namespaces, None).await {
                    Ok(entries) => entries,
                    Err(e)
                        if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::DirectoryExpected) =>
                    {
                        Vec::new()
                    }
                    Err(e) => return Err(backed.translate(e)),
                };
                Ok(paginate(merge_listing(real, route.children, namespaces), page))
            }
            Target::Implied => Ok(paginate(
                merge_listing(Vec::new(), route.children, namespaces),
                page,
            )),
            Target::Missing { .. } => Err(VfsError::not_found(route.path.to_string())),
        }
    }

    async fn openbin(
        &self,
        path: &Path,
        flags: OpenFlags,
        options: &OpenOptions,
    ) -> VfsResult<Box<dyn VfsFile>> {
        let route = self.route(path)?;
        let backed = route.file(flags.is_write())?;
        backed
            .fs
            .openbin(&backed.rel, flags, options)
            .await
            .map_err(|e| backed.translate(e))
    }

    async fn makedir(&self, path: &Path, recreate: bool) -> VfsResult<()> {
        let route = self.route(path)?;

        match &route.target {
            Target::Backed(backed) => backed
                .fs
                .makedir(&backed.rel, recreate)
                .await
                .map_err(|e| backed.translate(e)),
            Target::Implied if recreate => Ok(()),
            Target::Implied
            | Target::Missing {
                parent_implied: true,
            } => Err(VfsError::read_only(route.path.to_string())),
            Target::Missing { .. } => Err(route.not_found()),
        }
    }

    async fn remove(&self, path: &Path) -> VfsResult<()> {
        let route = self.route(path)?;

        match &route.target {
            Target::Backed(_) | Target::Implied => {
                let backed = route.file(true)?;
                backed
                    .fs
                    .remove(&backed.rel)
                    .await
                    .map_err(|e| backed.translate(e))
            }
            Target::Missing { .. } => Err(route.not_found()),
        }
    }

    async fn removedir(&self, path: &Path) -> VfsResult<()> {
        let route = self.route(path)?;

        match &route.target {
            Target::Backed(_) if !route.children.is_empty() => {
                Err(VfsError::directory_not_empty(route.path.to_string()))
            }
            Target::Backed(backed) => backed
                .fs
                .removedir(&backed.rel)
                .await
                .map_err(|e| backed.translate(e)),
            Target::Implied => Err(VfsError::read_only(route.path.to_string())),
            Target::Missing { .. } => Err(route.not_found()),
        }
    }

    async fn setinfo(&self, path: &Path, info: &SetInfo) -> VfsResult<()> {
        let route = self.route(path)?;

        match &route.target {
            Target::Backed(backed) => {
                if route.shadowed(backed).await? {
                    return Err(VfsError::read_only(route.path.to_string()));
                }
                backed
                    .fs
                    .setinfo(&backed.rel, info)
                    .await
                    .map_err(|e| backed.translate(e))
            }
            Target::Implied => Err(VfsError::read_only(route.path.to_string())),
            Target::Missing { .. } => Err(route.not_found()),
        }
    }

    fn read_only(&self) -> bool {
        // Mount table itself isn't read-only; individual mounts might be
        false
    }

    fn label(&self) -> String {
        "<mountfs>".to_string()
    }

    async fn getsyspath(&self, path: &Path) -> VfsResult<PathBuf> {
        let route = self.route(path)?;

        match &route.target {
            Target::Backed(backed) => {
                if route.shadowed(backed).await? {
                    return Err(VfsError::no_sys_path(route.path.to_string()));
                }
                backed
                    .fs
                    .getsyspath(&backed.rel)
                    .await
                    .map_err(|e| backed.translate(e))
            }
            Target::Implied => Err(VfsError::no_sys_path(route.path.to_string())),
            Target::Missing { .. } => Err(route.not_found()),
        }
    }

    async fn geturl(&self, path: &Path, purpose: UrlPurpose) -> VfsResult<String> {
        let route = self.route(path)?;

        match &route.target {
            Target::Backed(backed) => {
                if route.shadowed(backed).await? {
                    return Err(VfsError::no_url(route.path.to_string(), purpose));
                }
                backed
                    .fs
                    .geturl(&backed.rel, purpose)
                    .await
                    .map_err(|e| backed.translate(e))
            }
            Target::Implied => Err(VfsError::no_url(route.path.to_string(), purpose)),
            Target::Missing { .. } => Err(route.not_found()),
        }
    }

    /// Close owned filesystems and refuse further use.
    ///
    /// Closing twice is a no-op.
    #[tracing::instrument(skip(self))]
    async fn close(&self) -> VfsResult<()> {
        let mounts = {
            let mut state = self.state.write();
            if state.lifecycle == Lifecycle::Closed {
                return Ok(());
            }
            state.lifecycle = Lifecycle::Closed;
            state.table.drain()
        };

        tracing::info!(mounts = mounts.len(), "closing mount filesystem");
        close_owned(mounts).await
    }

    async fn getsize(&self, path: &Path) -> VfsResult<u64> {
        let route = self.route(path)?;

        match &route.target {
            Target::Backed(backed) => {
                if route.shadowed(backed).await? {
                    return Err(VfsError::file_expected(route.path.to_string()));
                }
                backed
                    .fs
                    .getsize(&backed.rel)
                    .await
                    .map_err(|e| backed.translate(e))
            }
            Target::Implied | Target::Missing { .. } => Err(route.not_found()),
        }
    }

    async fn readbytes(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let route = self.route(path)?;
        let backed = route.file(false)?;
        backed
            .fs
            .readbytes(&backed.rel)
            .await
            .map_err(|e| backed.translate(e))
    }

    async fn writebytes(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let route = self.route(path)?;
        let backed = route.file(true)?;
        backed
            .fs
            .writebytes(&backed.rel, data)
            .await
            .map_err(|e| backed.translate(e))
    }

    async fn readtext(&self, path: &Path, options: &TextOptions) -> VfsResult<String> {
        let route = self.route(path)?;
        let backed = route.file(false)?;
        backed
            .fs
            .readtext(&backed.rel, options)
            .await
            .map_err(|e| backed.translate(e))
    }

    async fn writetext(&self, path: &Path, text: &str, options: &TextOptions) -> VfsResult<()> {
        let route = self.route(path)?;
        let backed = route.file(true)?;
        backed
            .fs
            .writetext(&backed.rel, text, options)
            .await
            .map_err(|e| backed.translate(e))
    }

    async fn upload(
        &self,
        path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        options: &TransferOptions,
    ) -> VfsResult<u64> {
        let route = self.route(path)?;
        let backed = route.file(true)?;
        backed
            .fs
            .upload(&backed.rel, reader, options)
            .await
            .map_err(|e| backed.translate(e))
    }

    async fn download(
        &self,
        path: &Path,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        options: &TransferOptions,
    ) -> VfsResult<u64> {
        let route = self.route(path)?;
        let backed = route.file(false)?;
        backed
            .fs
            .download(&backed.rel, writer, options)
            .await
            .map_err(|e| backed.translate(e))
    }

    async fn hasurl(&self, path: &Path, purpose: UrlPurpose) -> VfsResult<bool> {
        match self.geturl(path, purpose).await {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), ErrorKind::NoUrl | ErrorKind::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn desc(&self, path: &Path) -> VfsResult<String> {
        if !self.exists(path).await? {
            let path = VirtualPath::from_path(path)?;
            return Err(VfsError::not_found(path.to_string()));
        }
        let route = self.route(path)?;

        Ok(match &route.target {
            Target::Backed(backed) => format!("{} on {}", backed.residual, backed.fs.label()),
            Target::Implied | Target::Missing { .. } => {
                format!("{} on {}", route.path, self.label())
            }
        })
    }
}
