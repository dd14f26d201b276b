//! The range-reader contract and its backends.
//!
//! A [`RangeReader`] resolves small random byte-range reads against a large
//! immutable blob. Backends ([`FileRangeReader`], [`HttpRangeReader`],
//! [`S3RangeReader`]) talk to storage; decorators ([`BlockAlignedReader`],
//! the caches in [`crate::cache`]) wrap another reader and preserve the
//! contract while adding a behavior.
//!
//! Validation is uniform: the trait's provided [`RangeReader::read_range`]
//! and [`RangeReader::read_range_into`] methods clip and short-circuit every
//! request, and implementations supply only the [`RangeReader::read_clipped`]
//! hook. Decorators call their delegate's public `read_range` and treat it
//! as a primitive.

mod block_aligned;
mod file;
mod http;
mod s3;

pub use block_aligned::{BlockAlignedReader, DEFAULT_BLOCK_SIZE};
pub use file::FileRangeReader;
pub use http::{HttpAuth, HttpRangeReader};
pub use s3::{create_s3_client, S3ClientOptions, S3RangeReader};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::RangeReaderError;
use crate::range::ByteRange;

/// Trait for reading byte ranges from an immutable blob.
///
/// Implementations must be thread-safe: concurrent `read_range` calls
/// against the same instance are allowed and independent.
///
/// # Contract
///
/// - A read returns at most the requested number of bytes, and fewer only
///   when the request extends past end-of-blob.
/// - A zero-length request returns an empty buffer without touching the
///   backend; so does a request starting at or past a known end-of-blob.
/// - [`close`](RangeReader::close) is idempotent and closes the delegate of
///   a decorator exactly once; reads after close fail with
///   [`RangeReaderError::Closed`].
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read a range that has already been validated and clipped.
    ///
    /// This is the single implementation hook; the provided `read_range`
    /// wrappers are the public entry points. `range` is never empty. The
    /// returned buffer holds exactly the blob's bytes at `range`, and is
    /// shorter than `range.length()` only when the blob ends inside the
    /// range (possible when [`size`](RangeReader::size) is unknown).
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError>;

    /// Total size of the blob, if known.
    ///
    /// Backends discover the size at construction (HEAD request or file
    /// metadata); some HTTP servers cannot or will not answer, in which
    /// case every read is delegated unclipped and EOF shows up as a short
    /// read.
    fn size(&self) -> Option<u64>;

    /// A stable, human-readable key for the blob.
    ///
    /// Used for cache scoping and diagnostics. Decorators prefix their
    /// delegate's identifier, e.g. `"memory-cached:file:///data/blob.bin"`.
    fn source_identifier(&self) -> &str;

    /// Whether [`close`](RangeReader::close) has been called.
    fn is_closed(&self) -> bool;

    /// Release resources and close the delegate, if any. Idempotent.
    async fn close(&self) -> Result<(), RangeReaderError>;

    /// Validate a request and clip it against the known blob size.
    ///
    /// Returns `Ok(None)` when the request must be answered with zero bytes
    /// without touching the backend (zero length, or start at/past a known
    /// EOF).
    fn validate(&self, offset: u64, length: u64) -> Result<Option<ByteRange>, RangeReaderError> {
        if self.is_closed() {
            return Err(RangeReaderError::Closed(self.source_identifier().to_string()));
        }
        if offset.checked_add(length).is_none() {
            return Err(RangeReaderError::invalid_argument(
                self.source_identifier(),
                format!("range [{offset}, {offset} + {length}) overflows"),
            ));
        }
        if length == 0 {
            return Ok(None);
        }
        let range = ByteRange::new(offset, length);
        match self.size() {
            Some(size) if offset >= size => Ok(None),
            Some(size) => Ok(Some(range.clipped_to(size))),
            None => Ok(Some(range)),
        }
    }

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// The returned buffer is ready for consumption and holds fewer than
    /// `length` bytes only when the request extends past end-of-blob.
    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes, RangeReaderError> {
        match self.validate(offset, length)? {
            None => Ok(Bytes::new()),
            Some(range) => self.read_clipped(range).await,
        }
    }

    /// Read into the front of a caller-supplied buffer, returning the number
    /// of bytes written.
    ///
    /// Reads up to `target.len()` bytes starting at `offset`. Bytes beyond
    /// the returned count are left untouched.
    async fn read_range_into(
        &self,
        offset: u64,
        target: &mut [u8],
    ) -> Result<usize, RangeReaderError> {
        match self.validate(offset, target.len() as u64)? {
            None => Ok(0),
            Some(range) => {
                let data = self.read_clipped(range).await?;
                target[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
        }
    }
}

#[async_trait]
impl<R: RangeReader + ?Sized> RangeReader for Box<R> {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        (**self).read_clipped(range).await
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }

    fn source_identifier(&self) -> &str {
        (**self).source_identifier()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    async fn close(&self) -> Result<(), RangeReaderError> {
        (**self).close().await
    }
}

#[async_trait]
impl<R: RangeReader + ?Sized> RangeReader for std::sync::Arc<R> {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        (**self).read_clipped(range).await
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }

    fn source_identifier(&self) -> &str {
        (**self).source_identifier()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    async fn close(&self) -> Result<(), RangeReaderError> {
        (**self).close().await
    }
}
