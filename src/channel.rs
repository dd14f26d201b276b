//! Stream-like facades over a [`RangeReader`].
//!
//! Channels give sequential-consumption callers (parsers, decoders) a
//! familiar read/seek surface without giving up the underlying
//! random-access reader: a channel never closes the reader it wraps, so
//! several channels can share one cached reader.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::RangeReaderError;
use crate::reader::RangeReader;

/// Sequential read channel over a [`RangeReader`].
///
/// Maintains a monotonically advancing position. Position updates are
/// atomic, but concurrent `read` calls are not serialized against each
/// other; interleave them only if any byte order is acceptable.
pub struct RangeReaderChannel<R> {
    reader: R,
    position: AtomicU64,
    closed: AtomicBool,
}

impl<R: RangeReader> RangeReaderChannel<R> {
    /// Create a channel starting at position 0.
    ///
    /// The channel borrows the reader's lifetime but never closes it; pass
    /// an `Arc` clone to share one reader across channels.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Read from the current position into `buf`, advancing by the number
    /// of bytes read. Returns `Ok(0)` at end-of-stream.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, RangeReaderError> {
        self.check_open()?;
        let position = self.position.load(Ordering::SeqCst);
        let n = self.reader.read_range_into(position, buf).await?;
        self.position.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    /// Close the channel. Idempotent; the underlying reader stays open.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), RangeReaderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RangeReaderError::ChannelClosed(
                self.reader.source_identifier().to_string(),
            ));
        }
        Ok(())
    }
}

/// Seekable read-only channel over a [`RangeReader`].
///
/// Adds explicit positioning and size reporting on top of
/// [`RangeReaderChannel`] semantics. Writes and truncation always fail
/// with [`RangeReaderError::NotWritable`].
pub struct SeekableRangeReaderChannel<R> {
    reader: R,
    position: AtomicU64,
    closed: AtomicBool,
}

impl<R: RangeReader> SeekableRangeReaderChannel<R> {
    /// Create a channel starting at position 0.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Read from the current position, advancing by the number of bytes
    /// read. Returns `Ok(0)` at end-of-stream.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, RangeReaderError> {
        self.check_open()?;
        let position = self.position.load(Ordering::SeqCst);
        let n = self.reader.read_range_into(position, buf).await?;
        self.position.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    /// Current position.
    pub fn position(&self) -> Result<u64, RangeReaderError> {
        self.check_open()?;
        Ok(self.position.load(Ordering::SeqCst))
    }

    /// Move to `position`. Positioning past end-of-blob is allowed; the
    /// next read reports end-of-stream.
    pub fn set_position(&self, position: u64) -> Result<(), RangeReaderError> {
        self.check_open()?;
        self.position.store(position, Ordering::SeqCst);
        Ok(())
    }

    /// Size of the underlying blob, if known.
    pub fn size(&self) -> Result<Option<u64>, RangeReaderError> {
        self.check_open()?;
        Ok(self.reader.size())
    }

    /// Channels are read-only; writing always fails.
    pub fn write(&self, _buf: &[u8]) -> Result<usize, RangeReaderError> {
        self.check_open()?;
        Err(RangeReaderError::NotWritable(
            self.reader.source_identifier().to_string(),
        ))
    }

    /// Channels are read-only; truncation always fails.
    pub fn truncate(&self, _size: u64) -> Result<(), RangeReaderError> {
        self.check_open()?;
        Err(RangeReaderError::NotWritable(
            self.reader.source_identifier().to_string(),
        ))
    }

    /// Close the channel. Idempotent; the underlying reader stays open.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), RangeReaderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RangeReaderError::ChannelClosed(
                self.reader.source_identifier().to_string(),
            ));
        }
        Ok(())
    }
}
