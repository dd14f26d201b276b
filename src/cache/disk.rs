use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace, warn};

use super::CacheStats;
use crate::error::RangeReaderError;
use crate::range::ByteRange;
use crate::reader::RangeReader;

/// Subdirectory of the OS temp directory used when no cache directory is
/// configured.
pub const DEFAULT_CACHE_DIR_NAME: &str = "tileverse-rangereader-cache";

/// Default cap on the sum of cached file sizes: 1GB.
pub const DEFAULT_MAX_CACHE_SIZE_BYTES: u64 = 1024 * 1024 * 1024;

/// Default disk block size: 4MB. Multi-MB blocks amortize cloud-storage
/// request latency.
pub const DEFAULT_DISK_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Configuration for [`DiskCachingReader`].
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Root directory holding one subdirectory per source. Defaults to
    /// `<OS temp>/tileverse-rangereader-cache`.
    pub cache_directory: Option<PathBuf>,
    /// Upper bound on the sum of cached file sizes. Must be positive.
    pub max_cache_size_bytes: u64,
    /// Delete this source's cached files (and the scope directory) on
    /// close.
    pub delete_on_close: bool,
    /// Block size for aligned caching; `0` caches exactly what was
    /// requested.
    pub block_size: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            cache_directory: None,
            max_cache_size_bytes: DEFAULT_MAX_CACHE_SIZE_BYTES,
            delete_on_close: false,
            block_size: DEFAULT_DISK_BLOCK_SIZE,
        }
    }
}

impl DiskCacheConfig {
    fn validate(&self, source_id: &str) -> Result<(), RangeReaderError> {
        if self.max_cache_size_bytes == 0 {
            return Err(RangeReaderError::invalid_argument(
                source_id,
                "max_cache_size_bytes must be positive",
            ));
        }
        Ok(())
    }
}

/// First 8 hex characters of the MD5 of a source identifier; the name of
/// that source's scope directory.
pub(crate) fn source_hash(source_identifier: &str) -> String {
    let digest = md5::compute(source_identifier.as_bytes());
    hex::encode(digest.0)[..8].to_string()
}

/// `<start>_<end_inclusive>.range`
fn entry_file_name(key: &ByteRange) -> String {
    format!("{}_{}.range", key.offset(), key.end_inclusive())
}

/// Inverse of [`entry_file_name`]; `None` for files that are not cache
/// entries (temp files, strays).
fn parse_entry_file_name(name: &str) -> Option<ByteRange> {
    let stem = name.strip_suffix(".range")?;
    let (start, end_inclusive) = stem.split_once('_')?;
    let start: u64 = start.parse().ok()?;
    let end_inclusive: u64 = end_inclusive.parse().ok()?;
    if end_inclusive < start {
        return None;
    }
    Some(ByteRange::new(start, end_inclusive - start + 1))
}

struct IndexState {
    entries: LruCache<ByteRange, u64>,
    /// Sum of on-disk file sizes, not of key lengths.
    weight: u64,
}

const SIZE_UNKNOWN: u64 = u64::MAX;

/// Disk-backed cache that persists block loads into files shared across
/// instances reading the same source.
///
/// Layout: `<root>/<8-hex-source-hash>/<start>_<end_inclusive>.range`,
/// each file holding exactly that range's bytes. The per-instance index is
/// rebuilt from a directory scan at construction, so caches survive
/// restarts; files written by one instance are picked up by peers on
/// demand.
///
/// Files may disappear underneath the cache (manual cleanup, TTL
/// sweepers, peer eviction). A missing file invalidates its entry and the
/// read is retried once; if the file is missing again the read falls back
/// to the delegate without caching, and the next successful load
/// repopulates.
pub struct DiskCachingReader<R> {
    inner: R,
    source_dir: PathBuf,
    max_cache_size_bytes: u64,
    delete_on_close: bool,
    block_size: u64,
    index: Mutex<IndexState>,
    in_flight: Mutex<HashMap<ByteRange, Arc<Notify>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    discovered_size: AtomicU64,
    identifier: String,
    closed: AtomicBool,
}

impl<R: RangeReader> DiskCachingReader<R> {
    /// Wrap `inner` with a disk cache.
    ///
    /// Creates the source scope directory if needed and registers every
    /// valid pre-existing `.range` file in the index. Fails when the cache
    /// directory cannot be created.
    pub async fn new(inner: R, config: DiskCacheConfig) -> Result<Self, RangeReaderError> {
        config.validate(inner.source_identifier())?;

        let root = config
            .cache_directory
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME));
        let source_dir = root.join(source_hash(inner.source_identifier()));

        tokio::fs::create_dir_all(&source_dir).await.map_err(|e| {
            RangeReaderError::io(
                inner.source_identifier(),
                ByteRange::new(0, 0),
                format!("cannot create cache directory {}: {e}", source_dir.display()),
            )
        })?;

        let identifier = format!("disk-cached:{}", inner.source_identifier());

        let reader = Self {
            inner,
            source_dir,
            max_cache_size_bytes: config.max_cache_size_bytes,
            delete_on_close: config.delete_on_close,
            block_size: config.block_size,
            index: Mutex::new(IndexState {
                entries: LruCache::unbounded(),
                weight: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            discovered_size: AtomicU64::new(SIZE_UNKNOWN),
            identifier,
            closed: AtomicBool::new(false),
        };
        reader.scan_source_dir().await?;
        Ok(reader)
    }

    /// Register every valid pre-existing cache file in the index.
    async fn scan_source_dir(&self) -> Result<(), RangeReaderError> {
        let mut dir = tokio::fs::read_dir(&self.source_dir).await.map_err(|e| {
            RangeReaderError::io(&self.identifier, ByteRange::new(0, 0), e)
        })?;

        let mut index = self.index.lock().await;
        let mut registered = 0usize;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(parse_entry_file_name) else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            index.weight += meta.len();
            index.entries.put(key, meta.len());
            registered += 1;
        }
        if registered > 0 {
            debug!(
                source = %self.identifier,
                entries = registered,
                "registered existing cache files"
            );
        }
        Ok(())
    }

    /// The scope directory holding this source's cache files.
    pub fn source_directory(&self) -> &Path {
        &self.source_dir
    }

    /// Snapshot of the cache counters and gauges. The estimated size sums
    /// actual file sizes.
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.lock().await;
        CacheStats {
            entry_count: index.entries.len() as u64,
            estimated_size_bytes: index.weight,
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            load_count: self.loads.load(Ordering::Relaxed),
            load_failure_count: self.load_failures.load(Ordering::Relaxed),
        }
    }

    /// Invalidate every entry and delete its backing file.
    pub async fn clear_cache(&self) {
        let paths: Vec<PathBuf> = {
            let mut index = self.index.lock().await;
            let mut paths = Vec::with_capacity(index.entries.len());
            while let Some((key, _)) = index.entries.pop_lru() {
                paths.push(self.entry_path(&key));
            }
            index.weight = 0;
            paths
        };
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to delete cache file");
                }
            }
        }
    }

    fn entry_path(&self, key: &ByteRange) -> PathBuf {
        self.source_dir.join(entry_file_name(key))
    }

    async fn invalidate(&self, key: &ByteRange) {
        let mut index = self.index.lock().await;
        if let Some(file_size) = index.entries.pop(key) {
            index.weight = index.weight.saturating_sub(file_size);
        }
    }

    /// Insert an entry and evict least recently used entries past the
    /// weight cap; evicted files are deleted after the lock is released.
    async fn register_entry(&self, key: ByteRange, file_size: u64) {
        let evicted: Vec<PathBuf> = {
            let mut guard = self.index.lock().await;
            let index = &mut *guard;
            if let Some(old) = index.entries.peek(&key) {
                index.weight = index.weight.saturating_sub(*old);
            }
            index.weight += file_size;
            index.entries.put(key, file_size);

            let mut evicted = Vec::new();
            while index.weight > self.max_cache_size_bytes {
                match index.entries.pop_lru() {
                    Some((evicted_key, evicted_size)) => {
                        index.weight = index.weight.saturating_sub(evicted_size);
                        trace!(key = %evicted_key, "evicted by weight");
                        evicted.push(self.entry_path(&evicted_key));
                    }
                    None => break,
                }
            }
            evicted
        };
        for path in evicted {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to delete evicted cache file");
                }
            }
        }
    }

    /// Fetch `key` from the delegate and persist it, returning the
    /// resolved (possibly EOF-truncated) key and the loaded bytes.
    async fn load_entry(
        &self,
        key: ByteRange,
    ) -> Result<(ByteRange, Option<Bytes>), RangeReaderError> {
        // A peer instance may have written this file already.
        let path = self.entry_path(&key);
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            debug!(key = %key, "adopting cache file written by another instance");
            self.register_entry(key, meta.len()).await;
            return Ok((key, None));
        }

        let data = match self.inner.read_range(key.offset(), key.length()).await {
            Ok(data) => data,
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        self.loads.fetch_add(1, Ordering::Relaxed);

        if (data.len() as u64) < key.length() {
            self.discovered_size
                .fetch_min(key.offset() + data.len() as u64, Ordering::Relaxed);
        }
        let resolved = key.truncated_to(data.len() as u64);
        if data.is_empty() {
            return Ok((resolved, Some(data)));
        }

        self.write_entry_file(&resolved, &data).await?;
        self.register_entry(resolved, data.len() as u64).await;
        Ok((resolved, Some(data)))
    }

    /// Write atomically: temp sibling first, then rename.
    async fn write_entry_file(
        &self,
        key: &ByteRange,
        data: &Bytes,
    ) -> Result<(), RangeReaderError> {
        let path = self.entry_path(key);
        let tmp = path.with_extension("range.tmp");

        if let Err(e) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RangeReaderError::io(
                &self.identifier,
                *key,
                format!("failed to write cache file: {e}"),
            ));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RangeReaderError::io(
                &self.identifier,
                *key,
                format!("failed to publish cache file: {e}"),
            ));
        }
        Ok(())
    }

    /// Look up or load `key`, with at most one concurrent load per key.
    ///
    /// Returns the resolved key plus the loaded bytes when this call did
    /// the load (index hits return `None` and are read from disk).
    async fn get_or_load(
        &self,
        key: ByteRange,
    ) -> Result<(ByteRange, Option<Bytes>), RangeReaderError> {
        {
            let mut index = self.index.lock().await;
            if index.entries.get(&key).is_some() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok((key, None));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        loop {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&key) {
                // Register interest before releasing the map lock so the
                // leader's wakeup cannot be missed.
                let notify = existing.clone();
                let mut notified = std::pin::pin!(notify.notified());
                notified.as_mut().enable();
                drop(in_flight);
                notified.await;

                let mut index = self.index.lock().await;
                if index.entries.get(&key).is_some() {
                    return Ok((key, None));
                }
                drop(index);
                continue;
            }
            let notify = Arc::new(Notify::new());
            in_flight.insert(key, notify.clone());
            drop(in_flight);

            let result = self.load_entry(key).await;

            self.in_flight.lock().await.remove(&key);
            notify.notify_waiters();

            return result;
        }
    }

    /// Read `[slice_offset, slice_offset + slice_len)` within the cached
    /// file for `key`.
    async fn read_slice_from_file(
        &self,
        key: &ByteRange,
        slice_offset: u64,
        slice_len: u64,
    ) -> std::io::Result<Bytes> {
        let path = self.entry_path(key);
        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(SeekFrom::Start(slice_offset)).await?;

        let mut buf = vec![0u8; slice_len as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    /// Serve `slice_len` bytes at `slice_offset` within the entry `key`,
    /// loading and recovering as needed.
    async fn read_cached_block(
        &self,
        key: ByteRange,
        slice_offset: u64,
        slice_len: u64,
    ) -> Result<Bytes, RangeReaderError> {
        if key.is_empty() || slice_len == 0 {
            return Ok(Bytes::new());
        }
        if key.length() > self.max_cache_size_bytes {
            trace!(key = %key, "entry exceeds cache size cap, bypassing cache");
            return self
                .inner
                .read_range(key.offset() + slice_offset, slice_len)
                .await;
        }

        for attempt in 0..2 {
            let (resolved, fresh) = self.get_or_load(key).await?;
            if slice_offset >= resolved.length() {
                return Ok(Bytes::new());
            }
            let len = slice_len.min(resolved.length() - slice_offset);

            if let Some(data) = fresh {
                return Ok(data.slice(slice_offset as usize..(slice_offset + len) as usize));
            }

            match self.read_slice_from_file(&resolved, slice_offset, len).await {
                Ok(data) => return Ok(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(
                        key = %resolved,
                        attempt,
                        "cache file deleted externally, invalidating"
                    );
                    self.invalidate(&resolved).await;
                    continue;
                }
                Err(e) => return Err(RangeReaderError::io(&self.identifier, key, e)),
            }
        }

        // The file vanished twice in a row; serve this call from the
        // delegate and let the next load repopulate.
        debug!(key = %key, "cache file repeatedly missing, bypassing cache for this read");
        self.inner
            .read_range(key.offset() + slice_offset, slice_len)
            .await
    }

    async fn read_aligned(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        let size_hint = self.size();
        let first = range.first_block(self.block_size);
        let last = range.last_block(self.block_size);

        if first == last {
            let key = ByteRange::block(first, self.block_size, size_hint);
            let (offset_in_block, want) = range.slice_in_block(first, self.block_size);
            return self.read_cached_block(key, offset_in_block, want).await;
        }

        // Load every touched block in parallel, then assemble in order,
        // stopping at the first short slice (EOF).
        let slices = futures::future::try_join_all((first..=last).map(|index| {
            let key = ByteRange::block(index, self.block_size, size_hint);
            let (offset_in_block, want) = range.slice_in_block(index, self.block_size);
            self.read_cached_block(key, offset_in_block, want)
        }))
        .await?;

        let mut result = BytesMut::with_capacity(range.length() as usize);
        for (i, slice) in slices.iter().enumerate() {
            let (_, want) = range.slice_in_block(first + i as u64, self.block_size);
            result.extend_from_slice(slice);
            if (slice.len() as u64) < want {
                break;
            }
        }
        Ok(result.freeze())
    }
}

#[async_trait]
impl<R: RangeReader> RangeReader for DiskCachingReader<R> {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        if self.block_size > 0 {
            self.read_aligned(range).await
        } else {
            self.read_cached_block(range, 0, range.length()).await
        }
    }

    fn size(&self) -> Option<u64> {
        self.inner.size().or({
            let discovered = self.discovered_size.load(Ordering::Relaxed);
            (discovered != SIZE_UNKNOWN).then_some(discovered)
        })
    }

    fn source_identifier(&self) -> &str {
        &self.identifier
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), RangeReaderError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if self.delete_on_close {
                self.clear_cache().await;
                if let Err(e) = tokio::fs::remove_dir_all(&self.source_dir).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            dir = %self.source_dir.display(),
                            error = %e,
                            "failed to remove cache scope directory"
                        );
                    }
                }
            }
            self.inner.close().await?;
        }
        Ok(())
    }
}
