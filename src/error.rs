use thiserror::Error;

use crate::range::ByteRange;

/// Errors produced by range readers, caches, channels, and the provider
/// factory.
///
/// Every reader-facing variant carries the source identifier so that a
/// failure deep inside a decorator chain still names the blob it was
/// reading. I/O failures additionally carry the offending range.
#[derive(Debug, Clone, Error)]
pub enum RangeReaderError {
    /// Invalid request or conflicting configuration detected before any
    /// backend traffic.
    #[error("Invalid argument for {source_id}: {message}")]
    InvalidArgument { source_id: String, message: String },

    /// The blob does not exist at the backend.
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Authentication failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The server refused to honor a byte-range request.
    #[error("Range requests not supported by {0}")]
    UnsupportedRangeRequests(String),

    /// Transport or disk failure while reading a range.
    #[error("I/O error reading {range} from {source_id}: {message}")]
    Io {
        source_id: String,
        range: ByteRange,
        message: String,
    },

    /// Operation attempted after `close()`.
    #[error("Reader {0} is closed")]
    Closed(String),

    /// Write or truncate attempted on a read-only channel.
    #[error("Channel over {0} is not writable")]
    NotWritable(String),

    /// Channel operation attempted after the channel was closed.
    #[error("Channel over {0} is closed")]
    ChannelClosed(String),

    /// The factory could not match any provider to the configuration.
    #[error("No provider can handle {0}")]
    NoProvider(String),

    /// Malformed or conflicting configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RangeReaderError {
    /// Build an [`RangeReaderError::Io`] from any displayable cause.
    pub fn io(source_id: impl Into<String>, range: ByteRange, cause: impl ToString) -> Self {
        Self::Io {
            source_id: source_id.into(),
            range,
            message: cause.to_string(),
        }
    }

    /// Build an [`RangeReaderError::InvalidArgument`].
    pub fn invalid_argument(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}
