
//! Error type for everything that can go wrong
//! when reading, writing, or scheduling a volume.

use std::convert::TryFrom;
use std::fmt;

/// A result that may fail with `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains `Error`.
pub type UnitResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// All possible crate failures.
#[derive(Debug)]
pub enum Error {

    /// The underlying file could not be opened, read, written, or sought.
    Io(IoError),

    /// The file contents violate the format:
    /// a zero dimension, aspect, component count, or brick size,
    /// an unknown component tag, or a table of contents
    /// that does not agree with the file length.
    Format(String),

    /// A brick coordinate or index is outside
    /// the range of the current level table.
    Bounds(String),

    /// An operation was invoked in the wrong lifecycle phase,
    /// for example reading bricks from a closed volume.
    State(&'static str),

    /// A compressed brick payload has no registered decoder,
    /// or decoding it failed.
    Codec(String),
}

impl Error {

    /// Create an error of the variant `Format`.
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    /// Create an error of the variant `Bounds`.
    pub(crate) fn bounds(message: impl Into<String>) -> Self {
        Error::Bounds(message.into())
    }

    /// Create an error of the variant `Codec`.
    pub(crate) fn codec(message: impl Into<String>) -> Self {
        Error::Codec(message.into())
    }
}

/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(error) => write!(formatter, "io error: {}", error),
            Error::Format(message) => write!(formatter, "invalid file contents: {}", message),
            Error::Bounds(message) => write!(formatter, "out of bounds: {}", message),
            Error::State(message) => write!(formatter, "invalid operation: {}", message),
            Error::Codec(message) => write!(formatter, "codec failure: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}


/// Panics on 16-bit machines where the usize range
/// cannot express a file that large in memory anyway.
pub fn u64_to_usize(value: u64) -> usize {
    usize::try_from(value).expect("(u64 as usize) overflowed")
}

/// Cannot overflow on any supported architecture.
pub fn usize_to_u64(value: usize) -> u64 {
    value as u64
}
