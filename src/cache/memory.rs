use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::{Mutex, Notify};
use tracing::trace;

use super::CacheStats;
use crate::error::RangeReaderError;
use crate::range::ByteRange;
use crate::reader::RangeReader;

/// Configuration for [`MemoryCachingReader`].
///
/// `maximum_weight` (total cached bytes) and `maximum_size` (total entry
/// count) are mutually exclusive caps; setting both is rejected. A
/// `block_size` of `Some(0)` or `None` disables internal alignment and the
/// cache keys exactly what was requested.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheConfig {
    /// Cap on total cached bytes; least recently used entries are evicted
    /// past it.
    pub maximum_weight: Option<u64>,
    /// Cap on total entry count.
    pub maximum_size: Option<u64>,
    /// TTL counted from last access; expired entries are evicted lazily on
    /// access.
    pub expire_after_access: Option<Duration>,
    /// Block size for internal alignment. When set (`> 0`), the cache key
    /// is the enclosing block and reads return slices of cached blocks.
    pub block_size: Option<u64>,
    /// When set (`> 0`), prefetch `[0, H)` at construction and serve reads
    /// inside that prefix without cache traffic.
    pub header_size: Option<u64>,
}

impl MemoryCacheConfig {
    fn validate(&self, source_id: &str) -> Result<(), RangeReaderError> {
        if self.maximum_weight.is_some() && self.maximum_size.is_some() {
            return Err(RangeReaderError::invalid_argument(
                source_id,
                "maximum_weight and maximum_size are mutually exclusive",
            ));
        }
        if self.maximum_weight == Some(0) {
            return Err(RangeReaderError::invalid_argument(
                source_id,
                "maximum_weight must be positive",
            ));
        }
        if self.maximum_size == Some(0) {
            return Err(RangeReaderError::invalid_argument(
                source_id,
                "maximum_size must be positive",
            ));
        }
        Ok(())
    }
}

struct CacheEntry {
    data: Bytes,
    last_access: Instant,
}

struct CacheState {
    entries: LruCache<ByteRange, CacheEntry>,
    weight: u64,
}

/// Sentinel for "no EOF discovered yet".
const SIZE_UNKNOWN: u64 = u64::MAX;

/// Weight-bounded, thread-safe in-memory cache keyed by [`ByteRange`]
/// blocks.
///
/// Concurrent requesters of the same key share a single delegate fetch
/// (singleflight); parallel fetches of different keys proceed
/// independently. Entries whose weight exceeds the configured cap in
/// isolation are never cached; those reads go straight to the delegate.
///
/// Any error from a block load bubbles out and nothing is inserted; the
/// cache never serves stale or synthesized data on error.
pub struct MemoryCachingReader<R> {
    inner: R,
    maximum_weight: Option<u64>,
    maximum_size: Option<u64>,
    expire_after_access: Option<Duration>,
    block_size: Option<u64>,
    header: Option<Bytes>,
    state: Mutex<CacheState>,
    in_flight: Mutex<HashMap<ByteRange, Arc<Notify>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    /// End-of-blob discovered from a short delegate read when the inner
    /// size is unknown. Monotonic for an immutable blob.
    discovered_size: AtomicU64,
    identifier: String,
    closed: AtomicBool,
}

impl<R: RangeReader> MemoryCachingReader<R> {
    /// Wrap `inner` with an in-memory cache.
    ///
    /// When `header_size` is configured this eagerly prefetches the header
    /// region from the delegate.
    pub async fn new(inner: R, config: MemoryCacheConfig) -> Result<Self, RangeReaderError> {
        config.validate(inner.source_identifier())?;

        let header = match config.header_size.filter(|&h| h > 0) {
            Some(h) => {
                let header = inner.read_range(0, h).await?;
                (!header.is_empty()).then_some(header)
            }
            None => None,
        };

        let identifier = format!("memory-cached:{}", inner.source_identifier());

        Ok(Self {
            inner,
            maximum_weight: config.maximum_weight,
            maximum_size: config.maximum_size,
            expire_after_access: config.expire_after_access,
            block_size: config.block_size.filter(|&b| b > 0),
            header,
            state: Mutex::new(CacheState {
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
        })
    }

    /// Snapshot of the cache counters and gauges.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entry_count: state.entries.len() as u64,
            estimated_size_bytes: state.weight,
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            load_count: self.loads.load(Ordering::Relaxed),
            load_failure_count: self.load_failures.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached entry.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.weight = 0;
    }

    /// Look up a key, honoring the access TTL and refreshing LRU order.
    async fn lookup(&self, key: &ByteRange) -> Option<Bytes> {
        let mut state = self.state.lock().await;
        let expired = match state.entries.get_mut(key) {
            Some(entry) => match self.expire_after_access {
                Some(ttl) if entry.last_access.elapsed() > ttl => true,
                _ => {
                    entry.last_access = Instant::now();
                    return Some(entry.data.clone());
                }
            },
            None => return None,
        };
        if expired {
            if let Some(entry) = state.entries.pop(key) {
                state.weight = state.weight.saturating_sub(entry.data.len() as u64);
                trace!(key = %key, "evicted expired entry");
            }
        }
        None
    }

    fn insert_locked(&self, state: &mut CacheState, key: ByteRange, data: Bytes) {
        if let Some(old) = state.entries.peek(&key) {
            state.weight = state.weight.saturating_sub(old.data.len() as u64);
        }
        state.weight += data.len() as u64;
        state.entries.put(
            key,
            CacheEntry {
                data,
                last_access: Instant::now(),
            },
        );

        if let Some(max_weight) = self.maximum_weight {
            while state.weight > max_weight {
                match state.entries.pop_lru() {
                    Some((evicted_key, entry)) => {
                        state.weight = state.weight.saturating_sub(entry.data.len() as u64);
                        trace!(key = %evicted_key, "evicted by weight");
                    }
                    None => break,
                }
            }
        }
        if let Some(max_size) = self.maximum_size {
            while state.entries.len() as u64 > max_size {
                match state.entries.pop_lru() {
                    Some((evicted_key, entry)) => {
                        state.weight = state.weight.saturating_sub(entry.data.len() as u64);
                        trace!(key = %evicted_key, "evicted by entry count");
                    }
                    None => break,
                }
            }
        }
    }

    /// Fetch a key from the delegate, recording load stats and any newly
    /// discovered end-of-blob.
    async fn load(&self, key: ByteRange) -> Result<Bytes, RangeReaderError> {
        let result = self.inner.read_range(key.offset(), key.length()).await;
        match &result {
            Ok(data) => {
                self.loads.fetch_add(1, Ordering::Relaxed);
                if (data.len() as u64) < key.length() {
                    self.discovered_size
                        .fetch_min(key.offset() + data.len() as u64, Ordering::Relaxed);
                }
            }
            Err(_) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Get a key from the cache or load it from the delegate, with at most
    /// one concurrent load per key.
    async fn get_or_load(&self, key: ByteRange) -> Result<Bytes, RangeReaderError> {
        if let Some(data) = self.lookup(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(data);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        loop {
            {
                let mut in_flight = self.in_flight.lock().await;
                if let Some(existing) = in_flight.get(&key) {
                    // Another task is loading this key; register interest
                    // before releasing the map lock so the leader's wakeup
                    // cannot be missed.
                    let notify = existing.clone();
                    let mut notified = std::pin::pin!(notify.notified());
                    notified.as_mut().enable();
                    drop(in_flight);
                    notified.await;
                    if let Some(data) = self.lookup(&key).await {
                        return Ok(data);
                    }
                    // Leader failed or the entry was already evicted; retry
                    // as a potential leader.
                    continue;
                }
                let notify = Arc::new(Notify::new());
                in_flight.insert(key, notify.clone());
                drop(in_flight);

                let result = self.load(key).await;

                {
                    let mut state = self.state.lock().await;
                    let mut in_flight = self.in_flight.lock().await;
                    if let Ok(data) = &result {
                        if !data.is_empty() {
                            // A short read re-keys the entry to the bytes
                            // that actually exist.
                            let insert_key = key.truncated_to(data.len() as u64);
                            self.insert_locked(&mut state, insert_key, data.clone());
                        }
                    }
                    in_flight.remove(&key);
                }
                notify.notify_waiters();

                return result;
            }
        }
    }

    /// Cache lookup-or-load for one key, bypassing the cache entirely for
    /// entries that could never fit under the weight cap.
    async fn read_via_cache(&self, key: ByteRange) -> Result<Bytes, RangeReaderError> {
        if let Some(max_weight) = self.maximum_weight {
            if key.length() > max_weight {
                trace!(key = %key, "entry exceeds weight cap, bypassing cache");
                return self.inner.read_range(key.offset(), key.length()).await;
            }
        }
        self.get_or_load(key).await
    }

    /// Serve a validated request by decomposing it into aligned block reads.
    async fn read_aligned(
        &self,
        range: ByteRange,
        block_size: u64,
    ) -> Result<Bytes, RangeReaderError> {
        let size_hint = self.size();
        let first = range.first_block(block_size);
        let last = range.last_block(block_size);

        if first == last {
            let key = ByteRange::block(first, block_size, size_hint);
            let block = self.read_via_cache(key).await?;
            let (offset_in_block, want) = range.slice_in_block(first, block_size);
            let start = offset_in_block as usize;
            if block.len() <= start {
                return Ok(Bytes::new());
            }
            let end = block.len().min(start + want as usize);
            return Ok(block.slice(start..end));
        }

        let mut result = BytesMut::with_capacity(range.length() as usize);
        for index in first..=last {
            let key = ByteRange::block(index, block_size, size_hint);
            if key.is_empty() {
                break;
            }
            let block = self.read_via_cache(key).await?;
            let (offset_in_block, want) = range.slice_in_block(index, block_size);
            let start = offset_in_block as usize;
            if block.len() <= start {
                break;
            }
            let end = block.len().min(start + want as usize);
            result.extend_from_slice(&block[start..end]);
            if end < start + want as usize {
                // Short block: end-of-blob inside this block.
                break;
            }
        }
        Ok(result.freeze())
    }
}

#[async_trait]
impl<R: RangeReader> RangeReader for MemoryCachingReader<R> {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        if let Some(header) = &self.header {
            if range.end() <= header.len() as u64 {
                trace!(range = %range, "header buffer hit");
                return Ok(header.slice(range.offset() as usize..range.end() as usize));
            }
        }

        match self.block_size {
            Some(block_size) => self.read_aligned(range, block_size).await,
            None => self.read_via_cache(range).await,
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
            self.clear().await;
            self.inner.close().await?;
        }
        Ok(())
    }
}
