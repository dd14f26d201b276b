use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::RangeReader;
use crate::error::RangeReaderError;
use crate::range::ByteRange;

/// Local-file implementation of [`RangeReader`].
///
/// The file is opened once at construction and read with positional reads
/// off the async runtime via `spawn_blocking`, so concurrent reads never
/// contend on a shared cursor.
pub struct FileRangeReader {
    file: Arc<File>,
    size: u64,
    identifier: String,
    closed: AtomicBool,
}

impl FileRangeReader {
    /// Open `path` for range reading.
    ///
    /// Returns [`RangeReaderError::NotFound`] if the file does not exist.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, RangeReaderError> {
        let path = path.into();
        let identifier = format!("file://{}", path.display());

        let (file, size) = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            Ok((file, size))
        })
        .await
        .map_err(|e| RangeReaderError::io(&identifier, ByteRange::new(0, 0), e))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RangeReaderError::NotFound(identifier.clone())
            } else {
                RangeReaderError::io(&identifier, ByteRange::new(0, 0), e)
            }
        })?;

        Ok(Self {
            file: Arc::new(file),
            size,
            identifier,
            closed: AtomicBool::new(false),
        })
    }
}

/// Positional read that does not move any shared cursor.
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    #[cfg(unix)]
    {
        std::os::unix::fs::FileExt::read_at(file, buf, offset)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::FileExt::seek_read(file, buf, offset)
    }
}

fn read_fully_at(file: &File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = read_at(file, &mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        let file = Arc::clone(&self.file);
        let data = tokio::task::spawn_blocking(move || {
            read_fully_at(&file, range.offset(), range.length() as usize)
        })
        .await
        .map_err(|e| RangeReaderError::io(&self.identifier, range, e))?
        .map_err(|e| RangeReaderError::io(&self.identifier, range, e))?;

        Ok(Bytes::from(data))
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
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
