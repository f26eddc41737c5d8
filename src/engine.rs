//! Open decision engine
//!
//! Decides, per open request, whether the handle is backed by the real file,
//! by substituted content or by transformed content. Branches are tried in
//! order and the first that applies wins:
//!
//! 1. Substitution: include of the registered target serves the replacement
//! 2. Rewrite: the path has a non-empty call map
//! 3. Modifier strip: raw read of executable source, only if stripping changed something
//! 4. Passthrough: the real file
//!
//! Branches 1-3 always produce a memory buffer positioned at offset 0.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::backing::Backing;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::provider::FileProvider;
use crate::registry::Registry;
use crate::request::OpenRequest;
use crate::transform::{CallMap, Transforms};

/// Which branch served an open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Substituted,
    Rewritten,
    Stripped,
    Passthrough,
}

/// When content counts as executable source and when to strip modifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Extensions denoting executable source text, without the dot
    pub source_extensions: Vec<String>,
    /// The open mode denoting a raw-binary read
    pub raw_read_mode: String,
    pub strip_modifiers: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Policy::from(&Config::default())
    }
}

impl From<&Config> for Policy {
    fn from(config: &Config) -> Self {
        Policy {
            source_extensions: config.source_extensions.clone(),
            raw_read_mode: config.raw_read_mode.clone(),
            strip_modifiers: config.strip_modifiers,
        }
    }
}

impl Policy {
    /// Whether the extension of `path` denotes executable source
    pub fn is_source(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .map_or(false, |ext| self.source_extensions.iter().any(|e| e == ext))
    }

    /// Whether opening `path` with `mode` calls for modifier stripping
    pub fn strips(&self, mode: &str, path: &Path) -> bool {
        self.strip_modifiers && mode == self.raw_read_mode && self.is_source(path)
    }
}

/// The interposition decision for `open`
pub struct DecisionEngine {
    registry: Arc<Registry>,
    transforms: Transforms,
    policy: Policy,
}

impl DecisionEngine {
    pub fn new(registry: Arc<Registry>, transforms: Transforms, policy: Policy) -> Self {
        DecisionEngine {
            registry,
            transforms,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Open according to the first applicable branch
    pub fn open(&self, request: &OpenRequest) -> Result<Backing> {
        self.resolve(request).map(|(backing, _)| backing)
    }

    /// Open and report which branch served the request
    ///
    /// Interposition is suspended for the whole decision, so every read
    /// issued here (and by the collaborators) reaches the native provider.
    pub fn resolve(&self, request: &OpenRequest) -> Result<(Backing, Resolution)> {
        let _suspended = self.registry.suspend();
        let provider = self.registry.active();

        let path = request.path();
        let mode = request.mode.as_str();
        let use_path = request.flags.use_path;
        let context = request.context.as_ref();
        let rule = self.registry.rule();

        if let Some(rule) = rule.filter(|_| request.flags.for_include) {
            let is_target = path == rule.target() || {
                let canonical = provider.canonicalize(path).ok();
                rule.matches(path, canonical.as_deref())
            };

            if is_target {
                let replacement = rule.replacement();
                let content = provider
                    .read_all(replacement, use_path, context)
                    .map_err(|source| Error::ReplacementUnreadable {
                        path: replacement.to_path_buf(),
                        source,
                    })?;
                let calls = self.transforms.call_maps.call_map_for(replacement);
                let bytes = self.transform(content, &calls, self.policy.strips(mode, replacement));

                debug!("open({:?}) substituted with {:?}", path, replacement);
                return Ok((Backing::memory(bytes), Resolution::Substituted));
            }
        }

        let calls = self.transforms.call_maps.call_map_for(path);
        let strips = self.policy.strips(mode, path);

        if !calls.is_empty() {
            let content = load_source(provider.as_ref(), request)?;
            let bytes = self.transform(content, &calls, strips);

            debug!("open({:?}) rewrote {} call(s)", path, calls.len());
            return Ok((Backing::memory(bytes), Resolution::Rewritten));
        }

        if strips {
            let content = load_source(provider.as_ref(), request)?;
            if let Ok(text) = std::str::from_utf8(&content) {
                let stripped = self.transforms.stripper.strip(text);
                if stripped != text {
                    debug!("open({:?}) stripped final modifiers", path);
                    return Ok((Backing::memory(stripped.into_bytes()), Resolution::Stripped));
                }
            }
            trace!("open({:?}) nothing to strip, passing through", path);
        }

        let backing = provider.open(request)?;
        trace!("open({:?}, {}) passthrough via {}", path, mode, provider.name());
        Ok((backing, Resolution::Passthrough))
    }

    /// Apply call rewriting, then modifier stripping; binary content is returned untouched
    fn transform(&self, content: Vec<u8>, calls: &CallMap, strip: bool) -> Vec<u8> {
        let text = match String::from_utf8(content) {
            Ok(text) => text,
            Err(e) => {
                debug!("content is not UTF-8, serving it untransformed");
                return e.into_bytes();
            }
        };

        let text = if calls.is_empty() {
            text
        } else {
            self.transforms.rewriter.rewrite(&text, calls)
        };
        let text = if strip {
            self.transforms.stripper.strip(&text)
        } else {
            text
        };
        text.into_bytes()
    }
}

fn load_source(provider: &dyn FileProvider, request: &OpenRequest) -> Result<Vec<u8>> {
    provider
        .read_all(request.path(), request.flags.use_path, request.context.as_ref())
        .map_err(|source| Error::SourceUnreadable {
            path: request.path.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::NativeProvider;
    use crate::request::STREAM_OPEN_FOR_INCLUDE;
    use crate::transform::StaticCallMaps;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        registry: Arc<Registry>,
        maps: Arc<StaticCallMaps>,
        engine: DecisionEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let registry = Registry::new(Arc::new(NativeProvider::new()));
            let maps = Arc::new(StaticCallMaps::new());
            let engine = DecisionEngine::new(
                registry.clone(),
                Transforms::with_call_maps(maps.clone()),
                Policy::default(),
            );
            Fixture {
                dir,
                registry,
                maps,
                engine,
            }
        }

        fn file(&self, name: &str, content: &[u8]) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn read(&self, request: &OpenRequest) -> (Vec<u8>, Resolution) {
            let (mut backing, resolution) = self.engine.resolve(request).unwrap();
            (backing.read(1 << 20).unwrap(), resolution)
        }
    }

    fn calls(pairs: &[(&str, &str)]) -> CallMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitution_serves_replacement() {
        let fx = Fixture::new();
        let target = fx.file("a.inc", b"<?php echo 0;");
        let replacement = fx.file("b.inc", b"<?php echo 1;");
        fx.registry.intercept(&target, &replacement).unwrap();

        let (bytes, resolution) = fx.read(&OpenRequest::include(&target).unwrap());
        assert_eq!(bytes, b"<?php echo 1;");
        assert_eq!(resolution, Resolution::Substituted);

        // without the include flag the target itself is served
        let (bytes, resolution) = fx.read(&OpenRequest::read(&target).unwrap());
        assert_eq!(bytes, b"<?php echo 0;");
        assert_eq!(resolution, Resolution::Passthrough);
    }

    #[test]
    fn test_substitution_through_symlink() {
        let fx = Fixture::new();
        let target = fx.file("a.php", b"<?php echo 0;");
        let replacement = fx.file("b.php", b"<?php final class B {}");
        let link = fx.dir.path().join("alias.php");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        fx.registry.intercept(&target, &replacement).unwrap();

        let (bytes, resolution) = fx.read(&OpenRequest::include(&link).unwrap());
        assert_eq!(resolution, Resolution::Substituted);
        // raw read of a .php replacement is stripped too
        assert_eq!(bytes, b"<?php class B {}");
    }

    #[test]
    fn test_substitution_uses_replacement_call_map() {
        let fx = Fixture::new();
        let target = fx.file("a.inc", b"");
        let replacement = fx.file("b.inc", b"old_fn();");
        fx.maps.insert(&replacement, calls(&[("old_fn", "new_fn")]));
        fx.registry.intercept(&target, &replacement).unwrap();

        let (bytes, _) = fx.read(&OpenRequest::include(&target).unwrap());
        assert_eq!(bytes, b"new_fn();");
    }

    #[test]
    fn test_unreadable_replacement() {
        let fx = Fixture::new();
        let target = fx.file("a.inc", b"");
        let replacement = fx.file("b.inc", b"");
        fx.registry.intercept(&target, &replacement).unwrap();
        fs::remove_file(&replacement).unwrap();

        let err = fx.engine.open(&OpenRequest::include(&target).unwrap()).unwrap_err();
        assert!(matches!(err, Error::ReplacementUnreadable { .. }));
    }

    #[test]
    fn test_rewrite_branch() {
        let fx = Fixture::new();
        let path = fx.file("c.src", b"old_fn();");
        fx.maps.insert(&path, calls(&[("old_fn", "new_fn")]));

        let (bytes, resolution) = fx.read(&OpenRequest::read(&path).unwrap());
        assert_eq!(bytes, b"new_fn();");
        assert_eq!(resolution, Resolution::Rewritten);

        // any read mode
        let (bytes, _) = fx.read(&OpenRequest::new(&path, "r", 0).unwrap());
        assert_eq!(bytes, b"new_fn();");
    }

    #[test]
    fn test_rewrite_and_strip_combined() {
        let fx = Fixture::new();
        let path = fx.file("d.php", b"<?php final class D { function f() { return old_fn(); } }");
        fx.maps.insert(&path, calls(&[("old_fn", "new_fn")]));

        let (bytes, _) = fx.read(&OpenRequest::read(&path).unwrap());
        assert_eq!(bytes, b"<?php class D { function f() { return new_fn(); } }");

        // non-raw mode rewrites without stripping
        let (bytes, _) = fx.read(&OpenRequest::new(&path, "r", 0).unwrap());
        assert_eq!(bytes, b"<?php final class D { function f() { return new_fn(); } }");
    }

    #[test]
    fn test_rewrite_missing_source() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("gone.src");
        fx.maps.insert(&path, calls(&[("a", "b")]));

        let err = fx.engine.open(&OpenRequest::read(&path).unwrap()).unwrap_err();
        assert!(matches!(err, Error::SourceUnreadable { .. }));
    }

    #[test]
    fn test_strip_branch_and_fallthrough() {
        let fx = Fixture::new();
        let with_final = fx.file("f.php", b"<?php final class F {}");
        let without = fx.file("g.php", b"<?php class G {}");

        let (bytes, resolution) = fx.read(&OpenRequest::read(&with_final).unwrap());
        assert_eq!(bytes, b"<?php class F {}");
        assert_eq!(resolution, Resolution::Stripped);

        let (bytes, resolution) = fx.read(&OpenRequest::read(&without).unwrap());
        assert_eq!(bytes, b"<?php class G {}");
        assert_eq!(resolution, Resolution::Passthrough);

        // only the raw read mode strips
        let (_, resolution) = fx.read(&OpenRequest::new(&with_final, "r", 0).unwrap());
        assert_eq!(resolution, Resolution::Passthrough);
    }

    #[test]
    fn test_strip_missing_source() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("missing.php");
        let err = fx.engine.open(&OpenRequest::read(&path).unwrap()).unwrap_err();
        assert!(matches!(err, Error::SourceUnreadable { .. }));
    }

    #[test]
    fn test_strip_disabled_by_policy() {
        let fx = Fixture::new();
        let path = fx.file("f.php", b"<?php final class F {}");
        let engine = DecisionEngine::new(
            fx.registry.clone(),
            Transforms::default(),
            Policy {
                strip_modifiers: false,
                ..Policy::default()
            },
        );
        let (mut backing, resolution) = engine.resolve(&OpenRequest::read(&path).unwrap()).unwrap();
        assert_eq!(resolution, Resolution::Passthrough);
        assert_eq!(backing.read(100).unwrap(), b"<?php final class F {}");
    }

    #[test]
    fn test_binary_content_untouched() {
        let fx = Fixture::new();
        let bytes = vec![0xff, 0xfe, b'o', b'l', b'd', 0x00];
        let path = fx.file("blob.src", &bytes);
        fx.maps.insert(&path, calls(&[("old", "new")]));

        let (served, _) = fx.read(&OpenRequest::read(&path).unwrap());
        assert_eq!(served, bytes);
    }

    #[test]
    fn test_passthrough_failure() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("plain.txt");
        let err = fx.engine.open(&OpenRequest::read(&path).unwrap()).unwrap_err();
        assert!(matches!(err, Error::OpenFailed { .. }));
        assert_eq!(err.io_error().unwrap().kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_passthrough_writes_real_file() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("out.txt");
        let request = OpenRequest::new(&path, "w", STREAM_OPEN_FOR_INCLUDE).unwrap();
        let mut backing = fx.engine.open(&request).unwrap();
        backing.write(b"written").unwrap();
        backing.flush().unwrap();
        drop(backing);
        assert_eq!(fs::read(&path).unwrap(), b"written");
    }

    #[test]
    fn test_policy_is_source() {
        let policy = Policy::default();
        assert!(policy.is_source(Path::new("/a/b.php")));
        assert!(!policy.is_source(Path::new("/a/b.PHP")));
        assert!(!policy.is_source(Path::new("/a/php")));
        assert!(policy.strips("rb", Path::new("x.php")));
        assert!(!policy.strips("r", Path::new("x.php")));
    }
}
