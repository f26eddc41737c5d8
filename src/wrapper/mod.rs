//! Handle facades
//!
//! One wrapper instance per open handle. Every operation suspends
//! interposition around the real call; an operation on a wrapper without a
//! backing resource yields a neutral value instead of an error.

mod dir;
mod stream;

pub use dir::DirWrapper;
pub use stream::StreamWrapper;
