//! Transfer error taxonomy.

use std::io;
use thiserror::Error;

/// Errors raised by the codec, the stream primitives and both engines.
///
/// Any of these aborts the current session only.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Length field outside `1..=255`
    #[error("malformed frame: filename length {0} outside 1..=255")]
    MalformedFrame(usize),

    /// Peer closed the stream before an expected field was complete
    #[error("unexpected EOF: got {got} of {expected} bytes")]
    UnexpectedEof {
        /// Bytes received before EOF
        got: usize,
        /// Bytes the caller asked for
        expected: usize,
    },

    /// Received filename would escape or nest inside the output directory
    #[error("invalid filename {0:?}")]
    InvalidFilename(String),

    /// Local source path has no usable base name
    #[error("invalid path {0:?}")]
    InvalidPath(String),

    /// Local base name does not fit in the header
    #[error("file name is {0} bytes, max 255")]
    NameTooLong(usize),

    /// A write moved zero bytes without reporting an error
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Async operation exceeded its deadline
    #[error("{op} timed out after {ms} ms")]
    Timeout {
        /// Step that stalled
        op: &'static str,
        /// Deadline that was exceeded
        ms: u64,
    },

    /// OS-level failure (open, read, write, accept, connect)
    #[error("{context}: {source}")]
    Io {
        /// Step that failed
        context: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Wrap an I/O error with the name of the failing step.
    pub fn io(context: &'static str, source: io::Error) -> Self {
        TransferError::Io { context, source }
    }

    /// OS error kind, when this is an I/O failure.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            TransferError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// Result alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

/// Attach a step name to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn step(self, context: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn step(self, context: &'static str) -> Result<T> {
        self.map_err(|e| TransferError::io(context, e))
    }
}
