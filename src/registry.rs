//! Interception registry
//!
//! Process-wide state of the interposition layer: the single substitution
//! rule and which provider currently serves the file scheme. Every
//! component that performs real I/O suspends interposition first, so its
//! own calls reach the native provider instead of being intercepted again.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{info, trace, warn};

use crate::error::{Error, Result};
use crate::provider::{FileProvider, NativeProvider};

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Substitution rule: opening `target` for include serves `replacement`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionRule {
    target: PathBuf,
    /// Canonical form of `target`, captured at registration
    canonical_target: Option<PathBuf>,
    replacement: PathBuf,
}

impl InterceptionRule {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn replacement(&self) -> &Path {
        &self.replacement
    }

    /// Whether a requested path designates the target, literally or once canonicalized
    pub fn matches(&self, path: &Path, canonical: Option<&Path>) -> bool {
        if path == self.target {
            return true;
        }
        match canonical {
            Some(canonical) => {
                canonical == self.target || Some(canonical) == self.canonical_target.as_deref()
            }
            None => false,
        }
    }
}

/// Interposition state shared by every provider, wrapper and facade
pub struct Registry {
    native: Arc<dyn FileProvider>,
    proxy: RwLock<Option<Weak<dyn FileProvider>>>,
    enabled: AtomicBool,
    rule: RwLock<Option<InterceptionRule>>,
    /// Held from suspension to resumption
    io_lock: ReentrantMutex<()>,
}

impl Registry {
    /// Create a registry over the given real provider
    pub fn new(native: Arc<dyn FileProvider>) -> Arc<Self> {
        Arc::new(Registry {
            native,
            proxy: RwLock::new(None),
            enabled: AtomicBool::new(false),
            rule: RwLock::new(None),
            io_lock: ReentrantMutex::new(()),
        })
    }

    /// The process-wide registry over the local filesystem
    pub fn global() -> Arc<Registry> {
        GLOBAL
            .get_or_init(|| Registry::new(Arc::new(NativeProvider::new())))
            .clone()
    }

    /// Register the substitution rule, replacing any previous one
    ///
    /// Both paths must exist now; they are not checked again on open.
    pub fn intercept(&self, target: impl AsRef<Path>, replacement: impl AsRef<Path>) -> Result<()> {
        let target = target.as_ref();
        let replacement = replacement.as_ref();

        if !self.native.exists(target) {
            return Err(Error::InvalidTarget(target.to_path_buf()));
        }
        if !self.native.exists(replacement) {
            return Err(Error::InvalidReplacement(replacement.to_path_buf()));
        }

        let rule = InterceptionRule {
            target: target.to_path_buf(),
            canonical_target: self.native.canonicalize(target).ok(),
            replacement: replacement.to_path_buf(),
        };

        info!("Intercepting {:?} with {:?}", rule.target, rule.replacement);
        *self.rule.write() = Some(rule);
        Ok(())
    }

    /// Snapshot of the current rule
    pub fn rule(&self) -> Option<InterceptionRule> {
        self.rule.read().clone()
    }

    /// Make `proxy` the provider installed by `enable`
    ///
    /// Only a weak reference is kept; the caller owns the proxy.
    pub fn install(&self, proxy: &Arc<dyn FileProvider>) {
        *self.proxy.write() = Some(Arc::downgrade(proxy));
    }

    fn live_proxy(&self) -> Option<Arc<dyn FileProvider>> {
        self.proxy.read().as_ref().and_then(Weak::upgrade)
    }

    /// Install the proxy as the file-scheme provider
    pub fn enable(&self) {
        if self.live_proxy().is_none() {
            warn!("enable() without an installed proxy; native provider stays active");
            return;
        }
        trace!("interposition enabled");
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Restore the native provider
    pub fn disable(&self) {
        trace!("interposition disabled");
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// The provider currently serving the file scheme
    ///
    /// Blocks while another thread is inside a suspension window, so a
    /// concurrent caller never sees the native provider that window
    /// installed. The owning thread re-enters freely.
    pub fn active(&self) -> Arc<dyn FileProvider> {
        let _lock = self.io_lock.lock();
        if self.is_enabled() {
            if let Some(proxy) = self.live_proxy() {
                return proxy;
            }
        }
        self.native.clone()
    }

    pub fn native(&self) -> &Arc<dyn FileProvider> {
        &self.native
    }

    /// Disable interposition until the returned guard drops
    ///
    /// Interposition is re-enabled on drop only if it was enabled here,
    /// so guards nest and error paths restore the state too. The guard
    /// also serializes other threads for the duration of the real call.
    pub fn suspend(&self) -> Suspension<'_> {
        let lock = self.io_lock.lock();
        let resume = self.is_enabled();
        if resume {
            self.disable();
        }
        Suspension {
            registry: self,
            resume,
            _lock: lock,
        }
    }

    /// Drop the rule and the proxy, leaving interposition disabled
    pub fn reset(&self) {
        let _lock = self.io_lock.lock();
        self.disable();
        *self.rule.write() = None;
        *self.proxy.write() = None;
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("native", &self.native.name())
            .field("enabled", &self.is_enabled())
            .field("rule", &*self.rule.read())
            .finish()
    }
}

/// Interposition suspended for the lifetime of this guard
#[must_use = "interposition resumes as soon as the guard is dropped"]
pub struct Suspension<'a> {
    registry: &'a Registry,
    resume: bool,
    _lock: ReentrantMutexGuard<'a, ()>,
}

impl Drop for Suspension<'_> {
    fn drop(&mut self) {
        if self.resume {
            self.registry.enable();
        }
    }
}
