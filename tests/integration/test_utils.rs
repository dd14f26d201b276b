//! Test utilities for integration tests.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use tileverse_rangereader::{ByteRange, RangeReader, RangeReaderError};

// =============================================================================
// Tracking Range Reader
// =============================================================================

/// An in-memory range reader that records every delegate request.
///
/// Useful for asserting cache behavior: hit paths must not reach the
/// delegate, and coalesced loads must reach it exactly once.
pub struct TrackingReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<(u64, u64)>>>,
    closed: AtomicBool,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(RwLock::new(Vec::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Handle for reading the request count after the reader has been
    /// moved into a decorator.
    pub fn request_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.request_count)
    }

    /// Handle for reading the `(offset, length)` request log after the
    /// reader has been moved into a decorator.
    pub fn request_log(&self) -> Arc<RwLock<Vec<(u64, u64)>>> {
        Arc::clone(&self.requests)
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<(u64, u64)> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl RangeReader for TrackingReader {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests
            .write()
            .await
            .push((range.offset(), range.length()));
        let clipped = range.clipped_to(self.data.len() as u64);
        Ok(self
            .data
            .slice(clipped.offset() as usize..clipped.end() as usize))
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn source_identifier(&self) -> &str {
        &self.identifier
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), RangeReaderError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Install a test-friendly tracing subscriber; safe to call from every
/// test, first caller wins.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Content Helpers
// =============================================================================

/// Deterministic test content: byte `i` is `i % 256`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

/// Write a deterministic blob into `dir` and return its path and content.
pub fn write_blob(dir: &tempfile::TempDir, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let path = dir.path().join(name);
    let data = pattern(len);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&data).unwrap();
    (path, data)
}
