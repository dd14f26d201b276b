//! End-to-end scenarios against a file backend and a full decorator stack.

use tileverse_rangereader::{
    DiskCacheConfig, DiskCachingReader, FileRangeReader, MemoryCacheConfig, MemoryCachingReader,
    RangeReader,
};

use super::test_utils::write_blob;

#[tokio::test]
async fn test_basic_file_read() {
    let dir = tempfile::tempdir().unwrap();
    let (path, data) = write_blob(&dir, "blob.bin", 1024);

    let reader = FileRangeReader::new(&path).await.unwrap();
    assert_eq!(reader.size(), Some(1024));

    let result = reader.read_range(100, 50).await.unwrap();
    assert_eq!(result.len(), 50);
    assert_eq!(&result[..], &data[100..150]);

    reader.close().await.unwrap();
}

#[tokio::test]
async fn test_eof_partial_reads() {
    let dir = tempfile::tempdir().unwrap();
    let (path, data) = write_blob(&dir, "blob.bin", 100_000);

    let reader = FileRangeReader::new(&path).await.unwrap();

    let result = reader.read_range(99_500, 1000).await.unwrap();
    assert_eq!(result.len(), 500);
    assert_eq!(&result[..], &data[99_500..]);

    let result = reader.read_range(100_500, 100).await.unwrap();
    assert_eq!(result.len(), 0);
}

#[tokio::test]
async fn test_full_stack_transparency() {
    super::test_utils::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cache_root = tempfile::tempdir().unwrap();
    let (path, data) = write_blob(&dir, "blob.bin", 64 * 1024);

    // Plain backend as the reference.
    let reference = FileRangeReader::new(&path).await.unwrap();

    // memory cache -> disk cache -> file backend
    let backend = FileRangeReader::new(&path).await.unwrap();
    let disk = DiskCachingReader::new(
        backend,
        DiskCacheConfig {
            cache_directory: Some(cache_root.path().to_path_buf()),
            block_size: 8192,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let stack = MemoryCachingReader::new(
        disk,
        MemoryCacheConfig {
            block_size: Some(4096),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(stack.size(), Some(64 * 1024));
    assert!(stack.source_identifier().starts_with("memory-cached:disk-cached:file://"));

    for (offset, length) in [
        (0u64, 100u64),
        (100, 50),
        (4000, 200),
        (8191, 2),
        (63_000, 5000),
        (64 * 1024, 10),
    ] {
        let expected = reference.read_range(offset, length).await.unwrap();
        let actual = stack.read_range(offset, length).await.unwrap();
        assert_eq!(actual, expected, "mismatch at [{offset}, +{length})");
        let end = (offset as usize + actual.len()).min(data.len());
        assert_eq!(&actual[..], &data[offset.min(data.len() as u64) as usize..end]);
    }

    // Repeat: everything is now cached, bytes stay identical.
    for (offset, length) in [(0u64, 100u64), (4000, 200), (63_000, 5000)] {
        let expected = reference.read_range(offset, length).await.unwrap();
        assert_eq!(stack.read_range(offset, length).await.unwrap(), expected);
    }

    // Closing the stack closes every layer.
    stack.close().await.unwrap();
    assert!(stack.is_closed());
    assert!(matches!(
        stack.read_range(0, 1).await,
        Err(tileverse_rangereader::RangeReaderError::Closed(_))
    ));
}

#[tokio::test]
async fn test_read_into_matches_allocating_form() {
    let dir = tempfile::tempdir().unwrap();
    let (path, data) = write_blob(&dir, "blob.bin", 2048);

    let reader = FileRangeReader::new(&path).await.unwrap();

    let allocated = reader.read_range(700, 300).await.unwrap();
    let mut buf = vec![0u8; 300];
    let n = reader.read_range_into(700, &mut buf).await.unwrap();

    assert_eq!(n, 300);
    assert_eq!(&buf[..], &allocated[..]);
    assert_eq!(&buf[..], &data[700..1000]);
}
