//! Source transformation collaborators
//!
//! The decision engine only depends on three interfaces:
//! - `CallRewriter`: renames function calls according to a `CallMap`
//! - `ModifierStripper`: removes the `final` modifier
//! - `CallMapProvider`: supplies the `CallMap` for a path
//!
//! Default token-based implementations are provided for all three.

mod calls;
mod finals;
pub mod lexer;

pub use calls::TokenCallRewriter;
pub use finals::FinalStripper;

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Function name to replacement name; empty means no rewriting
pub type CallMap = BTreeMap<String, String>;

/// Rewrites function calls found in source text
pub trait CallRewriter: Send + Sync {
    fn rewrite(&self, source: &str, calls: &CallMap) -> String;
}

/// Removes the `final` modifier from source text
pub trait ModifierStripper: Send + Sync {
    fn strip(&self, source: &str) -> String;
}

/// Supplies the call rewrites that apply to a path
pub trait CallMapProvider: Send + Sync {
    /// Empty when nothing should be rewritten
    fn call_map_for(&self, path: &Path) -> CallMap;
}

/// Path-keyed call map table
///
/// Entries are stored under their canonical path when it can be resolved,
/// lookups try the literal path first.
#[derive(Debug, Default)]
pub struct StaticCallMaps {
    maps: RwLock<HashMap<PathBuf, CallMap>>,
}

impl StaticCallMaps {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    /// Set the call map of a path, replacing any previous one
    pub fn insert(&self, path: impl AsRef<Path>, calls: CallMap) {
        self.maps.write().insert(Self::key(path.as_ref()), calls);
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> Option<CallMap> {
        self.maps.write().remove(&Self::key(path.as_ref()))
    }

    pub fn clear(&self) {
        self.maps.write().clear();
    }

    pub fn len(&self) -> usize {
        self.maps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().is_empty()
    }
}

impl CallMapProvider for StaticCallMaps {
    fn call_map_for(&self, path: &Path) -> CallMap {
        let maps = self.maps.read();
        if let Some(calls) = maps.get(path) {
            return calls.clone();
        }
        std::fs::canonicalize(path)
            .ok()
            .and_then(|canonical| maps.get(&canonical).cloned())
            .unwrap_or_default()
    }
}

/// The three collaborators consumed by the decision engine
#[derive(Clone)]
pub struct Transforms {
    pub rewriter: Arc<dyn CallRewriter>,
    pub stripper: Arc<dyn ModifierStripper>,
    pub call_maps: Arc<dyn CallMapProvider>,
}

impl Transforms {
    pub fn new(
        rewriter: Arc<dyn CallRewriter>,
        stripper: Arc<dyn ModifierStripper>,
        call_maps: Arc<dyn CallMapProvider>,
    ) -> Self {
        Transforms {
            rewriter,
            stripper,
            call_maps,
        }
    }

    /// Default rewriter and stripper with the given call maps
    pub fn with_call_maps(call_maps: Arc<dyn CallMapProvider>) -> Self {
        Self::new(Arc::new(TokenCallRewriter), Arc::new(FinalStripper), call_maps)
    }
}

impl Default for Transforms {
    fn default() -> Self {
        Self::with_call_maps(Arc::new(StaticCallMaps::new()))
    }
}

impl std::fmt::Debug for Transforms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transforms").finish_non_exhaustive()
    }
}
