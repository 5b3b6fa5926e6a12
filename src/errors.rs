//! Error types for BGZF decoding.

use std::io;

use thiserror::Error;

/// Result type alias for BGZF operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for BGZF operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the underlying byte source
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The underlying source does not support seeking
    #[error("virtual offset seek requires a seekable source")]
    NotASeeker,

    /// The gzip extra field carries no BGZF block-size subfield
    #[error("gzip member has no BGZF block size field")]
    NoBlockSize,

    /// A cached block belongs to a different reader
    #[error("cache returned a block owned by another reader")]
    ContaminatedCache,

    /// Malformed gzip member framing
    #[error("invalid gzip member: {reason}")]
    InvalidMember {
        /// Explanation of the framing violation
        reason: String,
    },

    /// CRC32 of the inflated payload does not match the member trailer
    #[error("CRC32 mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// CRC32 recorded in the member trailer
        expected: u32,
        /// CRC32 computed over the inflated payload
        actual: u32,
    },

    /// Intra-block seek target lies outside the decompressed payload
    #[error("offset {offset} is out of range for a block of {len} bytes")]
    InvalidOffset {
        /// Requested position within the payload
        offset: usize,
        /// Length of the decompressed payload
        len: usize,
    },
}

impl Error {
    /// Re-materializes a sticky error so it can be surfaced more than once.
    /// `io::Error` is not `Clone`, so the kind and message are preserved
    /// rather than the value itself.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::NotASeeker => Self::NotASeeker,
            Self::NoBlockSize => Self::NoBlockSize,
            Self::ContaminatedCache => Self::ContaminatedCache,
            Self::InvalidMember { reason } => Self::InvalidMember { reason: reason.clone() },
            Self::CrcMismatch { expected, actual } => {
                Self::CrcMismatch { expected: *expected, actual: *actual }
            }
            Self::InvalidOffset { offset, len } => {
                Self::InvalidOffset { offset: *offset, len: *len }
            }
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => e,
            Error::NotASeeker => io::Error::new(io::ErrorKind::Unsupported, e.to_string()),
            _ => io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
        }
    }
}
