//! Disk cache persistence, sharing, and external-deletion resilience.

use tileverse_rangereader::{DiskCacheConfig, DiskCachingReader, RangeReader};

use super::test_utils::{pattern, TrackingReader};

fn unaligned_config(root: &std::path::Path) -> DiskCacheConfig {
    DiskCacheConfig {
        cache_directory: Some(root.to_path_buf()),
        block_size: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_persistence_across_readers() {
    let root = tempfile::tempdir().unwrap();
    let data = pattern(100 * 1024);

    let first_bytes = {
        let delegate = TrackingReader::new(data.clone(), "test://persist");
        let cache = DiskCachingReader::new(delegate, unaligned_config(root.path()))
            .await
            .unwrap();
        let bytes = cache.read_range(1000, 500).await.unwrap();
        cache.close().await.unwrap();
        bytes
    };
    assert_eq!(&first_bytes[..], &data[1000..1500]);

    // A fresh reader over the same source and root serves the range from
    // disk without touching its delegate.
    let delegate = TrackingReader::new(data.clone(), "test://persist");
    let counter = delegate.request_counter();
    let cache = DiskCachingReader::new(delegate, unaligned_config(root.path()))
        .await
        .unwrap();

    let second_bytes = cache.read_range(1000, 500).await.unwrap();
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_external_deletion_mid_session() {
    super::test_utils::init_tracing();
    let root = tempfile::tempdir().unwrap();
    let data = pattern(256 * 1024);
    let delegate = TrackingReader::new(data.clone(), "test://sweep");
    let counter = delegate.request_counter();

    let config = DiskCacheConfig {
        cache_directory: Some(root.path().to_path_buf()),
        block_size: 16 * 1024,
        ..Default::default()
    };
    let cache = DiskCachingReader::new(delegate, config).await.unwrap();

    let reads: [(u64, u64); 3] = [(100, 200), (40_000, 1000), (200_000, 500)];
    for (offset, length) in reads {
        cache.read_range(offset, length).await.unwrap();
    }
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 3);

    // Sweep every cache file out from under the reader.
    let mut dir = tokio::fs::read_dir(cache.source_directory()).await.unwrap();
    while let Some(entry) = dir.next_entry().await.unwrap() {
        tokio::fs::remove_file(entry.path()).await.unwrap();
    }

    // Repeating the three reads recovers with exactly three delegate
    // calls and recreates the files.
    for (offset, length) in reads {
        let result = cache.read_range(offset, length).await.unwrap();
        assert_eq!(
            &result[..],
            &data[offset as usize..(offset + length) as usize]
        );
    }
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 6);

    // A further repetition is served entirely from the recreated files.
    for (offset, length) in reads {
        cache.read_range(offset, length).await.unwrap();
    }
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_scope_layout_is_stable() {
    let root = tempfile::tempdir().unwrap();
    let data = pattern(8192);
    let delegate = TrackingReader::new(data.clone(), "test://layout");

    let config = DiskCacheConfig {
        cache_directory: Some(root.path().to_path_buf()),
        block_size: 4096,
        ..Default::default()
    };
    let cache = DiskCachingReader::new(delegate, config).await.unwrap();
    cache.read_range(0, 1).await.unwrap();

    // <root>/<8-hex-hash>/<start>_<end_inclusive>.range
    let scope = cache.source_directory();
    let scope_name = scope.file_name().unwrap().to_str().unwrap();
    assert_eq!(scope_name.len(), 8);
    assert!(scope_name.chars().all(|c| c.is_ascii_hexdigit()));

    let file = scope.join("0_4095.range");
    let contents = tokio::fs::read(&file).await.unwrap();
    assert_eq!(&contents[..], &data[..4096]);
}

#[tokio::test]
async fn test_same_source_same_scope() {
    let root = tempfile::tempdir().unwrap();
    let data = pattern(4096);

    let a = DiskCachingReader::new(
        TrackingReader::new(data.clone(), "test://shared"),
        unaligned_config(root.path()),
    )
    .await
    .unwrap();
    let b = DiskCachingReader::new(
        TrackingReader::new(data.clone(), "test://shared"),
        unaligned_config(root.path()),
    )
    .await
    .unwrap();
    let c = DiskCachingReader::new(
        TrackingReader::new(data, "test://other"),
        unaligned_config(root.path()),
    )
    .await
    .unwrap();

    assert_eq!(a.source_directory(), b.source_directory());
    assert_ne!(a.source_directory(), c.source_directory());
}
