//! Open requests, option bitmasks and open modes

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Search the include path for relative paths
pub const STREAM_USE_PATH: u32 = 0x0000_0001;
/// Report errors (informational, the provider always reports)
pub const STREAM_REPORT_ERRORS: u32 = 0x0000_0008;
/// The file is being opened to be loaded as executable source
pub const STREAM_OPEN_FOR_INCLUDE: u32 = 0x0000_0080;

/// `mkdir` option: create missing parents
pub const STREAM_MKDIR_RECURSIVE: u32 = 0x0000_0001;

/// `url_stat` flag: do not follow a trailing symlink
pub const STREAM_URL_STAT_LINK: u32 = 0x0000_0001;
/// `url_stat` flag: swallow failures instead of reporting them
pub const STREAM_URL_STAT_QUIET: u32 = 0x0000_0002;

/// Access kind of an fopen-style mode string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// `r`
    Read,
    /// `w`
    Truncate,
    /// `a`
    Append,
    /// `x`
    CreateNew,
    /// `c`
    Create,
}

/// Parsed fopen-style open mode (`r`, `rb`, `w+`, `a`, `x+b`, `c`, ...)
///
/// The original string is kept verbatim: policy decisions compare the
/// literal mode, the access flags are used to open real files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMode {
    raw: String,
    access: Access,
    update: bool,
}

impl OpenMode {
    /// The mode string as given
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether reads are permitted
    pub fn is_readable(&self) -> bool {
        self.access == Access::Read || self.update
    }

    /// Whether writes are permitted
    pub fn is_writable(&self) -> bool {
        self.access != Access::Read || self.update
    }

    /// `r` without `+`: opening never creates, truncates or writes
    pub fn is_read_only(&self) -> bool {
        self.access == Access::Read && !self.update
    }

    /// Translate into `std::fs::OpenOptions`
    pub fn to_open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(self.is_readable());
        match self.access {
            Access::Read => {
                options.write(self.update);
            }
            Access::Truncate => {
                options.write(true).create(true).truncate(true);
            }
            Access::Append => {
                options.append(true).create(true);
            }
            Access::CreateNew => {
                options.write(true).create_new(true);
            }
            Access::Create => {
                options.write(true).create(true);
            }
        }
        options
    }
}

impl FromStr for OpenMode {
    type Err = io::Error;

    fn from_str(s: &str) -> io::Result<Self> {
        let invalid = || io::Error::new(io::ErrorKind::InvalidInput, format!("invalid open mode: {:?}", s));

        let mut chars = s.chars();
        let access = match chars.next() {
            Some('r') => Access::Read,
            Some('w') => Access::Truncate,
            Some('a') => Access::Append,
            Some('x') => Access::CreateNew,
            Some('c') => Access::Create,
            _ => return Err(invalid()),
        };

        let mut update = false;
        for c in chars {
            match c {
                '+' => update = true,
                // binary, text and close-on-exec flags carry no meaning here
                'b' | 't' | 'e' => {}
                _ => return Err(invalid()),
            }
        }

        Ok(OpenMode {
            raw: s.to_string(),
            access,
            update,
        })
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Flags of an open request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Search the include path for relative paths
    pub use_path: bool,
    /// The file is being loaded as executable source
    pub for_include: bool,
}

impl OpenFlags {
    /// Decode from an options bitmask
    pub fn from_bits(options: u32) -> Self {
        OpenFlags {
            use_path: options & STREAM_USE_PATH != 0,
            for_include: options & STREAM_OPEN_FOR_INCLUDE != 0,
        }
    }
}

/// Caller-supplied I/O context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamContext {
    /// Include path searched before the provider's own
    pub include_path: Vec<PathBuf>,
}

impl StreamContext {
    pub fn with_include_path(include_path: Vec<PathBuf>) -> Self {
        StreamContext { include_path }
    }
}

/// A single open request, immutable once built
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub path: PathBuf,
    pub mode: OpenMode,
    pub flags: OpenFlags,
    pub context: Option<StreamContext>,
}

impl OpenRequest {
    /// Build a request from a path, a mode string and an options bitmask
    pub fn new(path: impl Into<PathBuf>, mode: &str, options: u32) -> io::Result<Self> {
        Ok(OpenRequest {
            path: path.into(),
            mode: mode.parse()?,
            flags: OpenFlags::from_bits(options),
            context: None,
        })
    }

    /// Plain read request (`rb`, no flags)
    pub fn read(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::new(path, "rb", 0)
    }

    /// Request as issued when loading executable source
    pub fn include(path: impl Into<PathBuf>) -> io::Result<Self> {
        Self::new(path, "rb", STREAM_OPEN_FOR_INCLUDE)
    }

    /// Attach a caller-supplied context
    pub fn with_context(mut self, context: StreamContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
