//! File providers
//!
//! A provider serves every file-scheme operation. There are exactly two:
//! - `NativeProvider`: the real filesystem
//! - `ProxyProvider`: interposes on opens and guards everything else
//!
//! The registry decides which one is active.

mod native;

pub use native::NativeProvider;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::backing::{Backing, DirHandle};
use crate::error::Result;
use crate::request::{OpenRequest, StreamContext};
use crate::stat::FileStat;

/// Metadata change requested through the metadata dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataChange {
    /// Create if missing and set times; `None` means now
    Touch { times: Option<TouchTimes> },
    OwnerId(u32),
    OwnerName(String),
    GroupId(u32),
    GroupName(String),
    /// Permission bits
    Access(u32),
}

/// Explicit timestamps for a touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchTimes {
    pub mtime: SystemTime,
    pub atime: SystemTime,
}

/// File-scheme provider
pub trait FileProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Open a file, producing the resource that will back the handle
    fn open(&self, request: &OpenRequest) -> Result<Backing>;

    /// Load the whole content of a file
    fn read_all(&self, path: &Path, use_path: bool, context: Option<&StreamContext>) -> io::Result<Vec<u8>>;

    /// Resolve symlinks and relative segments
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    fn open_dir(&self, path: &Path, context: Option<&StreamContext>) -> io::Result<DirHandle>;

    fn mkdir(&self, path: &Path, mode: u32, recursive: bool) -> io::Result<()>;

    fn rmdir(&self, path: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn unlink(&self, path: &Path) -> io::Result<()>;

    fn set_metadata(&self, path: &Path, change: &MetadataChange) -> io::Result<()>;

    /// Stat following symlinks
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Stat without following a trailing symlink
    fn lstat(&self, path: &Path) -> io::Result<FileStat>;

    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }

    /// Collect all entry names of a directory, `.` and `..` included
    fn list_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        let mut handle = self.open_dir(path, None)?;
        let mut names = Vec::new();
        while let Some(name) = handle.next_entry()? {
            names.push(name);
        }
        Ok(names)
    }
}
