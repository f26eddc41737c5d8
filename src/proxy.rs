//! Interposing provider
//!
//! Serves the file scheme while interposition is enabled. Opens go through
//! the decision engine; every other operation is forwarded to the native
//! provider with interposition suspended around the real call.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backing::{Backing, DirHandle};
use crate::config::Config;
use crate::engine::{DecisionEngine, Policy};
use crate::error::{Error, Result};
use crate::provider::{FileProvider, MetadataChange};
use crate::registry::Registry;
use crate::request::{
    OpenFlags, OpenMode, OpenRequest, StreamContext, STREAM_MKDIR_RECURSIVE, STREAM_URL_STAT_LINK,
    STREAM_URL_STAT_QUIET,
};
use crate::stat::FileStat;
use crate::transform::{StaticCallMaps, Transforms};

/// The proxy implementation of `FileProvider`
pub struct ProxyProvider {
    registry: Arc<Registry>,
    engine: DecisionEngine,
}

impl ProxyProvider {
    pub fn new(registry: Arc<Registry>, transforms: Transforms, policy: Policy) -> Arc<Self> {
        Arc::new(ProxyProvider {
            engine: DecisionEngine::new(registry.clone(), transforms, policy),
            registry,
        })
    }

    /// Create the proxy and make it the one `enable` installs
    ///
    /// The registry only holds a weak reference: interposition ends when
    /// the returned proxy is dropped.
    pub fn install(registry: Arc<Registry>, transforms: Transforms, policy: Policy) -> Arc<Self> {
        let proxy = Self::new(registry.clone(), transforms, policy);
        let provider: Arc<dyn FileProvider> = proxy.clone();
        registry.install(&provider);
        proxy
    }

    /// Install a proxy configured from `config`
    ///
    /// Seeds the default call-map table and registers the configured
    /// substitution rule, if any.
    pub fn from_config(registry: Arc<Registry>, config: &Config) -> Result<Arc<Self>> {
        let call_maps = StaticCallMaps::new();
        for (path, calls) in &config.call_maps {
            call_maps.insert(path, calls.clone());
        }

        if let Some(intercept) = &config.intercept {
            registry.intercept(&intercept.target, &intercept.replacement)?;
        }

        info!(
            "Installing proxy ({} call map(s), extensions {:?})",
            call_maps.len(),
            config.source_extensions
        );
        Ok(Self::install(
            registry,
            Transforms::with_call_maps(Arc::new(call_maps)),
            Policy::from(config),
        ))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Run a real operation with interposition suspended
    fn passthrough<T>(&self, op: impl FnOnce(&dyn FileProvider) -> T) -> T {
        let _suspended = self.registry.suspend();
        let provider = self.registry.active();
        op(provider.as_ref())
    }

    /// `mkdir` with an options bitmask (`STREAM_MKDIR_RECURSIVE`)
    pub fn mkdir_with_options(&self, path: &Path, mode: u32, options: u32) -> io::Result<()> {
        self.mkdir(path, mode, options & STREAM_MKDIR_RECURSIVE != 0)
    }

    /// Stat with `url_stat` flags
    ///
    /// `STREAM_URL_STAT_LINK` stats the link itself. With
    /// `STREAM_URL_STAT_QUIET` a failure yields `Ok(None)` and nothing is
    /// reported; otherwise it is logged and returned as `Error::Stat`.
    pub fn url_stat(&self, path: &Path, flags: u32) -> Result<Option<FileStat>> {
        let link = flags & STREAM_URL_STAT_LINK != 0;
        let quiet = flags & STREAM_URL_STAT_QUIET != 0;

        let result = self.passthrough(|provider| {
            if link {
                provider.lstat(path)
            } else {
                provider.stat(path)
            }
        });

        match result {
            Ok(stat) => Ok(Some(stat)),
            Err(_) if quiet => Ok(None),
            Err(source) => {
                warn!("{}stat({:?}) failed: {}", if link { "l" } else { "" }, path, source);
                Err(Error::Stat {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

impl FileProvider for ProxyProvider {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn open(&self, request: &OpenRequest) -> Result<Backing> {
        self.engine.open(request)
    }

    /// Whole-file loads see what a raw-binary open would serve
    fn read_all(&self, path: &Path, use_path: bool, context: Option<&StreamContext>) -> io::Result<Vec<u8>> {
        let mode: OpenMode = self.engine.policy().raw_read_mode.parse()?;
        if !mode.is_read_only() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("raw read mode {:?} is not read-only", mode.as_str()),
            ));
        }
        let request = OpenRequest {
            path: path.to_path_buf(),
            mode,
            flags: OpenFlags {
                use_path,
                for_include: false,
            },
            context: context.cloned(),
        };
        let mut backing = self.engine.open(&request)?;

        let _suspended = self.registry.suspend();
        backing.read_to_end()
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.passthrough(|p| p.canonicalize(path))
    }

    fn open_dir(&self, path: &Path, context: Option<&StreamContext>) -> io::Result<DirHandle> {
        self.passthrough(|p| p.open_dir(path, context))
    }

    fn mkdir(&self, path: &Path, mode: u32, recursive: bool) -> io::Result<()> {
        self.passthrough(|p| p.mkdir(path, mode, recursive))
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        self.passthrough(|p| p.rmdir(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.passthrough(|p| p.rename(from, to))
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        self.passthrough(|p| p.unlink(path))
    }

    fn set_metadata(&self, path: &Path, change: &MetadataChange) -> io::Result<()> {
        self.passthrough(|p| p.set_metadata(path, change))
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.passthrough(|p| p.stat(path))
    }

    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        self.passthrough(|p| p.lstat(path))
    }
}
