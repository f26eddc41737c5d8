//! Backing resources behind stream and directory handles
//!
//! A stream handle is backed either by a real file or by an in-memory
//! buffer holding substituted or transformed content. Both variants support
//! the same operation set, so the facades never look at the variant.

use std::ffi::OsString;
use std::fs::{self, File, ReadDir};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::stat::FileStat;

/// Seek origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

impl Whence {
    fn to_seek_from(self, offset: i64) -> io::Result<SeekFrom> {
        match self {
            Whence::Set => u64::try_from(offset)
                .map(SeekFrom::Start)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative seek offset")),
            Whence::Current => Ok(SeekFrom::Current(offset)),
            Whence::End => Ok(SeekFrom::End(offset)),
        }
    }
}

/// Advisory lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOperation {
    Shared { nonblocking: bool },
    Exclusive { nonblocking: bool },
    Unlock,
}

impl LockOperation {
    fn to_libc(self) -> libc::c_int {
        match self {
            LockOperation::Shared { nonblocking } => libc::LOCK_SH | if nonblocking { libc::LOCK_NB } else { 0 },
            LockOperation::Exclusive { nonblocking } => libc::LOCK_EX | if nonblocking { libc::LOCK_NB } else { 0 },
            LockOperation::Unlock => libc::LOCK_UN,
        }
    }
}

/// Stream option change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOption {
    Blocking(bool),
    ReadTimeout(Duration),
    /// `None` disables write buffering, `Some(n)` requests an n-byte buffer
    WriteBuffer(Option<usize>),
}

/// Result of a bounded read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadChunk {
    pub data: Vec<u8>,
    /// The read stopped short because the source has no more data
    pub at_end: bool,
}

/// Resource owned by a stream handle
#[derive(Debug)]
pub enum Backing {
    Real(File),
    Memory(Cursor<Vec<u8>>),
}

impl Backing {
    /// Memory buffer holding `bytes`, positioned at offset 0
    pub fn memory(bytes: Vec<u8>) -> Self {
        Backing::Memory(Cursor::new(bytes))
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Backing::Memory(_))
    }

    /// Read up to `count` bytes
    pub fn read(&mut self, count: usize) -> io::Result<Vec<u8>> {
        self.read_chunk(count).map(|chunk| chunk.data)
    }

    /// Read up to `count` bytes, noting whether the source ran dry
    ///
    /// A non-blocking source with nothing ready fails with `WouldBlock`;
    /// one that ran out of ready data mid-read returns what it had and is
    /// not at its end.
    pub fn read_chunk(&mut self, count: usize) -> io::Result<ReadChunk> {
        match self {
            Backing::Real(file) => read_up_to(file, count),
            Backing::Memory(cursor) => read_up_to(cursor, count),
        }
    }

    /// Read everything from the current position on
    pub fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Backing::Real(file) => file.read_to_end(&mut buf)?,
            Backing::Memory(cursor) => cursor.read_to_end(&mut buf)?,
        };
        Ok(buf)
    }

    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Backing::Real(file) => file.write(data),
            Backing::Memory(cursor) => cursor.write(data),
        }
    }

    /// Reposition, returning the new absolute offset
    pub fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        let pos = whence.to_seek_from(offset)?;
        match self {
            Backing::Real(file) => file.seek(pos),
            Backing::Memory(cursor) => cursor.seek(pos),
        }
    }

    pub fn tell(&mut self) -> io::Result<u64> {
        match self {
            Backing::Real(file) => file.stream_position(),
            Backing::Memory(cursor) => Ok(cursor.position()),
        }
    }

    /// Resize to `size` bytes without moving the position
    pub fn truncate(&mut self, size: u64) -> io::Result<()> {
        match self {
            Backing::Real(file) => file.set_len(size),
            Backing::Memory(cursor) => {
                let size = usize::try_from(size)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "size too large"))?;
                cursor.get_mut().resize(size, 0);
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Backing::Real(file) => file.flush(),
            Backing::Memory(_) => Ok(()),
        }
    }

    /// Advisory locking; a memory buffer is private to its handle and always succeeds
    pub fn lock(&mut self, operation: LockOperation) -> io::Result<()> {
        match self {
            Backing::Real(file) => {
                let rc = unsafe { libc::flock(file.as_raw_fd(), operation.to_libc()) };
                if rc == 0 {
                    Ok(())
                } else {
                    Err(io::Error::last_os_error())
                }
            }
            Backing::Memory(_) => Ok(()),
        }
    }

    pub fn stat(&self) -> io::Result<FileStat> {
        match self {
            Backing::Real(file) => file.metadata().map(|m| FileStat::from_metadata(&m)),
            Backing::Memory(cursor) => Ok(FileStat::for_memory(cursor.get_ref().len() as u64)),
        }
    }

    /// Apply a stream option; `Ok(false)` means the option is not supported
    pub fn set_option(&mut self, option: StreamOption) -> io::Result<bool> {
        match (self, option) {
            (Backing::Real(file), StreamOption::Blocking(blocking)) => {
                set_blocking(file, blocking)?;
                Ok(true)
            }
            (Backing::Memory(_), StreamOption::Blocking(_)) => Ok(true),
            // plain files and memory buffers have neither timeouts nor a write buffer
            (_, StreamOption::ReadTimeout(_)) | (_, StreamOption::WriteBuffer(_)) => Ok(false),
        }
    }
}

fn read_up_to<R: Read>(reader: &mut R, count: usize) -> io::Result<ReadChunk> {
    let mut data = Vec::with_capacity(count.min(64 * 1024));
    match reader.take(count as u64).read_to_end(&mut data) {
        Ok(_) => {
            let at_end = data.len() < count;
            Ok(ReadChunk { data, at_end })
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock && !data.is_empty() => Ok(ReadChunk {
            data,
            at_end: false,
        }),
        Err(e) => Err(e),
    }
}

fn set_blocking(file: &File, blocking: bool) -> io::Result<()> {
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if blocking {
        flags & !libc::O_NONBLOCK
    } else {
        flags | libc::O_NONBLOCK
    };
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Real directory handle
///
/// Yields `.` and `..` before the directory's own entries, like `readdir(3)`.
#[derive(Debug)]
pub struct DirHandle {
    path: PathBuf,
    entries: ReadDir,
    dots: u8,
}

impl DirHandle {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(DirHandle {
            path: path.to_path_buf(),
            entries: fs::read_dir(path)?,
            dots: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next entry name, `None` at the end
    pub fn next_entry(&mut self) -> io::Result<Option<OsString>> {
        if self.dots < 2 {
            self.dots += 1;
            return Ok(Some(OsString::from(if self.dots == 1 { "." } else { ".." })));
        }
        match self.entries.next() {
            Some(entry) => Ok(Some(entry?.file_name())),
            None => Ok(None),
        }
    }

    /// Restart from the first entry
    pub fn rewind(&mut self) -> io::Result<()> {
        self.entries = fs::read_dir(&self.path)?;
        self.dots = 0;
        Ok(())
    }
}
