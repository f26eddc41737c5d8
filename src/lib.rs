//! fsinterpose - Process-wide file provider interposition
//!
//! This library swaps the provider serving the file scheme for a proxy that
//! can substitute one source file for another when it is loaded as code,
//! rewrite function calls in loaded source, and strip `final` modifiers so
//! test doubles can override classes and methods.

pub mod backing;
pub mod config;
pub mod engine;
pub mod error;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod request;
pub mod stat;
pub mod transform;
pub mod wrapper;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backing::{Backing, Whence};
    pub use crate::config::Config;
    pub use crate::engine::{DecisionEngine, Policy, Resolution};
    pub use crate::error::{Error, Result};
    pub use crate::provider::{FileProvider, NativeProvider};
    pub use crate::proxy::ProxyProvider;
    pub use crate::registry::Registry;
    pub use crate::request::OpenRequest;
    pub use crate::transform::{CallMap, StaticCallMaps, Transforms};
    pub use crate::wrapper::{DirWrapper, StreamWrapper};
}
