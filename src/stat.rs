//! Portable stat record
//!
//! Shared by `url_stat`, handle `stat` and the CLI. Real files report what the
//! kernel reports; memory buffers synthesize a regular-file record.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Regular file type bits
pub const S_IFREG: u32 = 0o100000;
/// Directory type bits
pub const S_IFDIR: u32 = 0o040000;
/// Symlink type bits
pub const S_IFLNK: u32 = 0o120000;
/// File type mask
pub const S_IFMT: u32 = 0o170000;

/// Stat record, field names follow `struct stat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    /// Seconds since the epoch
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub blksize: u64,
    pub blocks: u64,
}

impl FileStat {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        FileStat {
            dev: meta.dev(),
            ino: meta.ino(),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            size: meta.len(),
            atime: meta.atime(),
            mtime: meta.mtime(),
            ctime: meta.ctime(),
            blksize: meta.blksize(),
            blocks: meta.blocks(),
        }
    }

    /// Record for an in-memory buffer of `len` bytes
    pub fn for_memory(len: u64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        FileStat {
            dev: 0,
            ino: 0,
            mode: S_IFREG | 0o666,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            size: len,
            atime: now,
            mtime: now,
            ctime: now,
            blksize: 4096,
            blocks: (len + 511) / 512,
        }
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Permission bits only
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}
