//! Memory cache effectiveness against a counting delegate.

use std::sync::Arc;

use tileverse_rangereader::{MemoryCacheConfig, MemoryCachingReader, RangeReader};

use super::test_utils::{pattern, TrackingReader};

fn aligned(block_size: u64) -> MemoryCacheConfig {
    MemoryCacheConfig {
        block_size: Some(block_size),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_aligned_cache_reuse() {
    let data = pattern(64 * 1024);
    let delegate = TrackingReader::new(data.clone(), "test://aligned");
    let counter = delegate.request_counter();

    let cache = MemoryCachingReader::new(delegate, aligned(4096))
        .await
        .unwrap();

    let first = cache.read_range(2000, 1).await.unwrap();
    assert_eq!(&first[..], &data[2000..2001]);
    let second = cache.read_range(3000, 100).await.unwrap();
    assert_eq!(&second[..], &data[3000..3100]);

    // One aligned delegate fetch serves both reads.
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    let stats = cache.stats().await;
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.estimated_size_bytes, 4096);
}

#[tokio::test]
async fn test_cross_block_request() {
    let data = pattern(64 * 1024);
    let delegate = TrackingReader::new(data.clone(), "test://cross");
    let cache = MemoryCachingReader::new(delegate, aligned(4096))
        .await
        .unwrap();

    let result = cache.read_range(3500, 2000).await.unwrap();
    assert_eq!(result.len(), 2000);
    assert_eq!(&result[..], &data[3500..5500]);

    let stats = cache.stats().await;
    assert_eq!(stats.entry_count, 2);
    assert_eq!(stats.estimated_size_bytes, 8192);
}

#[tokio::test]
async fn test_aligned_delegate_requests_are_block_shaped() {
    let data = pattern(64 * 1024);
    let delegate = TrackingReader::new(data.clone(), "test://shape");
    let log = delegate.request_log();

    let cache = MemoryCachingReader::new(delegate, aligned(4096))
        .await
        .unwrap();
    cache.read_range(5000, 100).await.unwrap();

    assert_eq!(log.read().await.clone(), vec![(4096, 4096)]);
}

#[tokio::test]
async fn test_concurrent_same_block_coalesces() {
    let data = pattern(16 * 1024);
    let delegate = TrackingReader::new(data.clone(), "test://coalesce");
    let counter = delegate.request_counter();

    let cache = Arc::new(
        MemoryCachingReader::new(delegate, aligned(4096))
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..16 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            // All offsets land in block 0.
            cache.read_range(64 * (i % 8), 32).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repeated_identical_reads_are_stable() {
    let data = pattern(8192);
    let delegate = TrackingReader::new(data.clone(), "test://stable");
    let cache = MemoryCachingReader::new(delegate, MemoryCacheConfig::default())
        .await
        .unwrap();

    let first = cache.read_range(1234, 321).await.unwrap();
    let second = cache.read_range(1234, 321).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(&first[..], &data[1234..1555]);

    let stats = cache.stats().await;
    assert_eq!(stats.hit_count, 1);
    assert_eq!(stats.miss_count, 1);
    assert_eq!(stats.request_count(), 2);
}
