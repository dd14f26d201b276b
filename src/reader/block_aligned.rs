use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::RangeReader;
use crate::error::RangeReaderError;
use crate::range::ByteRange;

/// Default alignment block size: 1MB.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// Decorator that rounds every request outward to block boundaries before
/// delegating, then returns the requested slice.
///
/// Aligning requests reduces their number and improves their size, which is
/// what remote backends want: many small scattered reads become few
/// block-sized ones. Place this *outside* a caching reader so the cache
/// sees aligned keys, or rely on the caches' own internal alignment
/// instead.
///
/// Errors from the delegate propagate unchanged; this reader never
/// synthesizes partial success.
pub struct BlockAlignedReader<R> {
    inner: R,
    block_size: u64,
    identifier: String,
    closed: AtomicBool,
}

impl<R: RangeReader> BlockAlignedReader<R> {
    /// Wrap `inner` with the default block size.
    pub fn new(inner: R) -> Result<Self, RangeReaderError> {
        Self::with_block_size(inner, DEFAULT_BLOCK_SIZE)
    }

    /// Wrap `inner`, aligning requests to `block_size` boundaries.
    ///
    /// `block_size` must be a positive power of two.
    pub fn with_block_size(inner: R, block_size: u64) -> Result<Self, RangeReaderError> {
        if block_size == 0 {
            return Err(RangeReaderError::invalid_argument(
                inner.source_identifier(),
                "block size must be positive",
            ));
        }
        if !block_size.is_power_of_two() {
            return Err(RangeReaderError::invalid_argument(
                inner.source_identifier(),
                format!("block size must be a power of two, got {block_size}"),
            ));
        }
        let identifier = format!("block-aligned:{}", inner.source_identifier());
        Ok(Self {
            inner,
            block_size,
            identifier,
            closed: AtomicBool::new(false),
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }
}

#[async_trait]
impl<R: RangeReader> RangeReader for BlockAlignedReader<R> {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        let aligned = range.aligned_to(self.block_size, self.inner.size());
        let data = self
            .inner
            .read_range(aligned.offset(), aligned.length())
            .await?;

        let start = (range.offset() - aligned.offset()) as usize;
        if data.len() <= start {
            // Delegate hit EOF before the requested offset (unknown size).
            return Ok(Bytes::new());
        }
        let end = data.len().min(start + range.length() as usize);
        Ok(data.slice(start..end))
    }

    fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    fn source_identifier(&self) -> &str {
        &self.identifier
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), RangeReaderError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.close().await?;
        }
        Ok(())
    }
}
