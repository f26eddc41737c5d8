//! Native pass-through provider
//!
//! Direct access to the local filesystem. Never interposes.

use nix::sys::stat::utimes;
use nix::sys::time::{TimeVal, TimeValLike};
use nix::unistd::{chown, Gid, Group, Uid, User};
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

use super::{FileProvider, MetadataChange, TouchTimes};
use crate::backing::{Backing, DirHandle};
use crate::error::{Error, Result};
use crate::request::{OpenRequest, StreamContext};
use crate::stat::FileStat;

/// Pass-through interface to the local filesystem
#[derive(Debug, Clone, Default)]
pub struct NativeProvider {
    /// Searched for relative paths when `use_path` is requested
    include_path: Vec<PathBuf>,
}

impl NativeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_include_path(include_path: Vec<PathBuf>) -> Self {
        NativeProvider { include_path }
    }

    pub fn include_path(&self) -> &[PathBuf] {
        &self.include_path
    }

    /// Resolve a path against the include path
    ///
    /// Only bare relative paths are searched; absolute paths and paths
    /// starting with `./` or `../` are used as given. The context's include
    /// path wins over the provider's. Falls back to the path itself.
    pub fn resolve(&self, path: &Path, use_path: bool, context: Option<&StreamContext>) -> PathBuf {
        if !use_path || !is_searchable(path) {
            return path.to_path_buf();
        }

        let context_dirs = context.map(|c| c.include_path.as_slice()).unwrap_or(&[]);
        for dir in context_dirs.iter().chain(self.include_path.iter()) {
            let candidate = dir.join(path);
            if candidate.exists() {
                trace!("resolved {:?} via include path to {:?}", path, candidate);
                return candidate;
            }
        }

        path.to_path_buf()
    }
}

fn is_searchable(path: &Path) -> bool {
    !path.is_absolute()
        && !matches!(
            path.components().next(),
            Some(Component::CurDir) | Some(Component::ParentDir)
        )
}

fn to_timeval(time: SystemTime) -> TimeVal {
    let micros = match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_micros() as i64,
        Err(e) => -(e.duration().as_micros() as i64),
    };
    TimeVal::microseconds(micros)
}

fn touch(path: &Path, times: Option<TouchTimes>) -> io::Result<()> {
    if fs::symlink_metadata(path).is_err() {
        OpenOptions::new().write(true).create(true).open(path)?;
    }

    let times = times.unwrap_or_else(|| {
        let now = SystemTime::now();
        TouchTimes { mtime: now, atime: now }
    });

    utimes(path, &to_timeval(times.atime), &to_timeval(times.mtime)).map_err(io::Error::from)
}

fn lookup_user(name: &str) -> io::Result<Uid> {
    User::from_name(name)
        .map_err(io::Error::from)?
        .map(|u| u.uid)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown user: {}", name)))
}

fn lookup_group(name: &str) -> io::Result<Gid> {
    Group::from_name(name)
        .map_err(io::Error::from)?
        .map(|g| g.gid)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown group: {}", name)))
}

impl FileProvider for NativeProvider {
    fn name(&self) -> &'static str {
        "native"
    }

    fn open(&self, request: &OpenRequest) -> Result<Backing> {
        let resolved = self.resolve(&request.path, request.flags.use_path, request.context.as_ref());
        let file = request
            .mode
            .to_open_options()
            .open(&resolved)
            .map_err(|source| Error::OpenFailed {
                path: request.path.clone(),
                source,
            })?;
        Ok(Backing::Real(file))
    }

    fn read_all(&self, path: &Path, use_path: bool, context: Option<&StreamContext>) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path, use_path, context))
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn open_dir(&self, path: &Path, _context: Option<&StreamContext>) -> io::Result<DirHandle> {
        DirHandle::open(path)
    }

    fn mkdir(&self, path: &Path, mode: u32, recursive: bool) -> io::Result<()> {
        DirBuilder::new().recursive(recursive).mode(mode).create(path)
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn set_metadata(&self, path: &Path, change: &MetadataChange) -> io::Result<()> {
        match change {
            MetadataChange::Touch { times } => touch(path, *times),
            MetadataChange::OwnerId(uid) => {
                chown(path, Some(Uid::from_raw(*uid)), None).map_err(io::Error::from)
            }
            MetadataChange::OwnerName(name) => {
                chown(path, Some(lookup_user(name)?), None).map_err(io::Error::from)
            }
            MetadataChange::GroupId(gid) => {
                chown(path, None, Some(Gid::from_raw(*gid))).map_err(io::Error::from)
            }
            MetadataChange::GroupName(name) => {
                chown(path, None, Some(lookup_group(name)?)).map_err(io::Error::from)
            }
            MetadataChange::Access(mode) => fs::set_permissions(path, Permissions::from_mode(*mode)),
        }
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        fs::metadata(path).map(|m| FileStat::from_metadata(&m))
    }

    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        fs::symlink_metadata(path).map(|m| FileStat::from_metadata(&m))
    }
}
