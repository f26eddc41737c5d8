//! Stream handle facade

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::backing::{Backing, LockOperation, StreamOption, Whence};
use crate::error::Result;
use crate::registry::Registry;
use crate::request::OpenRequest;
use crate::stat::FileStat;

/// An open stream
///
/// Owns at most one backing resource, released exactly once by `close`
/// (or on drop).
#[derive(Debug)]
pub struct StreamWrapper {
    registry: Arc<Registry>,
    backing: Option<Backing>,
    opened_path: Option<PathBuf>,
    eof: bool,
}

impl StreamWrapper {
    pub fn new(registry: Arc<Registry>) -> Self {
        StreamWrapper {
            registry,
            backing: None,
            opened_path: None,
            eof: false,
        }
    }

    /// Open through the active provider
    ///
    /// On failure the wrapper holds nothing and stays inert.
    pub fn stream_open(&mut self, request: &OpenRequest) -> Result<()> {
        self.close();

        let provider = self.registry.active();
        let backing = provider.open(request)?;
        debug!(
            "stream_open({:?}, {}) via {} -> {}",
            request.path(),
            request.mode,
            provider.name(),
            if backing.is_memory() { "memory" } else { "file" }
        );

        self.backing = Some(backing);
        self.opened_path = Some(request.path.clone());
        self.eof = false;
        Ok(())
    }

    /// Path given to the last successful open
    pub fn opened_path(&self) -> Option<&Path> {
        self.opened_path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.backing.is_some()
    }

    /// Run `op` against the backing resource with interposition suspended
    fn with_backing<T>(&mut self, op: impl FnOnce(&mut Backing) -> Option<T>) -> Option<T> {
        let backing = self.backing.as_mut()?;
        let _suspended = self.registry.suspend();
        op(backing)
    }

    /// Up to `count` bytes; empty at end of data, on failure or without a backing
    ///
    /// Only a read that reaches the end of data marks the stream at eof. A
    /// failed read (such as a non-blocking source with nothing ready)
    /// leaves the flag alone.
    pub fn read(&mut self, count: usize) -> Vec<u8> {
        match self.with_backing(|b| b.read_chunk(count).ok()) {
            Some(chunk) => {
                if chunk.at_end {
                    self.eof = true;
                }
                chunk.data
            }
            None => Vec::new(),
        }
    }

    /// Bytes written, `None` on failure
    pub fn write(&mut self, data: &[u8]) -> Option<usize> {
        self.with_backing(|b| b.write(data).ok())
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> bool {
        let moved = self
            .with_backing(|b| b.seek(offset, whence).ok())
            .is_some();
        if moved {
            self.eof = false;
        }
        moved
    }

    /// Current position, `None` without a backing
    pub fn tell(&mut self) -> Option<u64> {
        self.with_backing(|b| b.tell().ok())
    }

    pub fn truncate(&mut self, size: u64) -> bool {
        self.with_backing(|b| b.truncate(size).ok()).is_some()
    }

    pub fn flush(&mut self) -> bool {
        self.with_backing(|b| b.flush().ok()).is_some()
    }

    pub fn lock(&mut self, operation: LockOperation) -> bool {
        self.with_backing(|b| b.lock(operation).ok()).is_some()
    }

    pub fn stat(&mut self) -> Option<FileStat> {
        self.with_backing(|b| b.stat().ok())
    }

    /// Whether a read has hit the end of data
    pub fn eof(&self) -> bool {
        self.backing.is_none() || self.eof
    }

    pub fn set_option(&mut self, option: StreamOption) -> bool {
        self.with_backing(|b| b.set_option(option).ok())
            .unwrap_or(false)
    }

    /// The held backing resource
    pub fn cast(&self) -> Option<&Backing> {
        self.backing.as_ref()
    }

    /// Release the backing resource; a second close does nothing
    pub fn close(&mut self) {
        if let Some(backing) = self.backing.take() {
            let _suspended = self.registry.suspend();
            trace!("stream_close({:?})", self.opened_path);
            drop(backing);
        }
        self.eof = false;
    }
}

impl Drop for StreamWrapper {
    fn drop(&mut self) {
        self.close();
    }
}
