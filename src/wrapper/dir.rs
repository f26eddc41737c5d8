//! Directory handle facade

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::backing::DirHandle;
use crate::registry::Registry;
use crate::request::StreamContext;

/// An open directory
#[derive(Debug)]
pub struct DirWrapper {
    registry: Arc<Registry>,
    handle: Option<DirHandle>,
}

impl DirWrapper {
    pub fn new(registry: Arc<Registry>) -> Self {
        DirWrapper {
            registry,
            handle: None,
        }
    }

    /// Open `path`; `options` is accepted for parity with stream opens and unused
    pub fn open(&mut self, path: &Path, _options: u32, context: Option<&StreamContext>) -> bool {
        let _suspended = self.registry.suspend();
        match self.registry.active().open_dir(path, context) {
            Ok(handle) => {
                self.handle = Some(handle);
                true
            }
            Err(e) => {
                debug!("dir_opendir({:?}) failed: {}", path, e);
                self.handle = None;
                false
            }
        }
    }

    /// Next entry name, `None` at the end or without an open directory
    pub fn read(&mut self) -> Option<OsString> {
        let handle = self.handle.as_mut()?;
        let _suspended = self.registry.suspend();
        handle.next_entry().ok().flatten()
    }

    /// Restart the listing; without an open directory there is nothing to rewind
    pub fn rewind(&mut self) -> bool {
        match self.handle.as_mut() {
            Some(handle) => {
                let _suspended = self.registry.suspend();
                handle.rewind().is_ok()
            }
            None => true,
        }
    }

    /// Release the directory handle, if any; always succeeds
    pub fn close(&mut self) -> bool {
        if let Some(handle) = self.handle.take() {
            let _suspended = self.registry.suspend();
            drop(handle);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Policy;
    use crate::provider::NativeProvider;
    use crate::proxy::ProxyProvider;
    use crate::transform::Transforms;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_rewind_close() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("one"), b"").unwrap();
        fs::write(dir.path().join("two"), b"").unwrap();

        let registry = Registry::new(Arc::new(NativeProvider::new()));
        let _proxy = ProxyProvider::install(registry.clone(), Transforms::default(), Policy::default());
        registry.enable();

        let mut wrapper = DirWrapper::new(registry.clone());
        assert!(wrapper.open(dir.path(), 0, None));
        assert!(registry.is_enabled());

        let mut names = Vec::new();
        while let Some(name) = wrapper.read() {
            names.push(name);
        }
        names.sort();
        assert_eq!(names, vec![".", "..", "one", "two"]);

        assert!(wrapper.rewind());
        assert_eq!(wrapper.read(), Some(OsString::from(".")));

        assert!(wrapper.close());
        assert!(wrapper.close());
        assert!(wrapper.read().is_none());
        assert!(wrapper.rewind());
        assert!(wrapper.read().is_none());
        assert!(registry.is_enabled());
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(Arc::new(NativeProvider::new()));

        let mut wrapper = DirWrapper::new(registry);
        assert!(!wrapper.open(&dir.path().join("missing"), 0, None));
        assert!(wrapper.read().is_none());
        assert!(wrapper.rewind());
        assert!(wrapper.close());
    }
}
