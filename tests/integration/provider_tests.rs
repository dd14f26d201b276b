//! Provider selection and factory wrapping through the public surface.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use tileverse_rangereader::{
    ProviderParam, ProviderRegistry, RangeReader, RangeReaderConfig, RangeReaderError,
    RangeReaderProvider, MEMORY_CACHE_BLOCK_ALIGNED, MEMORY_CACHE_BLOCK_SIZE, MEMORY_CACHE_ENABLED,
};

use super::test_utils::{pattern, write_blob};

#[tokio::test]
async fn test_file_uri_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (path, data) = write_blob(&dir, "blob.bin", 4096);
    let uri = Url::from_file_path(&path).unwrap();

    let registry = ProviderRegistry::with_default_providers();
    let reader = registry.open(&RangeReaderConfig::new(uri)).await.unwrap();

    assert_eq!(reader.size(), Some(4096));
    let result = reader.read_range(128, 64).await.unwrap();
    assert_eq!(&result[..], &data[128..192]);
    reader.close().await.unwrap();
}

#[tokio::test]
async fn test_file_uri_with_memory_cache() {
    let dir = tempfile::tempdir().unwrap();
    let (path, data) = write_blob(&dir, "blob.bin", 16 * 1024);
    let uri = Url::from_file_path(&path).unwrap();

    let config = RangeReaderConfig::new(uri)
        .with_param(MEMORY_CACHE_ENABLED, "true")
        .with_param(MEMORY_CACHE_BLOCK_ALIGNED, "true")
        .with_param(MEMORY_CACHE_BLOCK_SIZE, "4096");

    let registry = ProviderRegistry::with_default_providers();
    let reader = registry.open(&config).await.unwrap();

    assert!(reader.source_identifier().starts_with("memory-cached:file://"));
    let result = reader.read_range(5000, 100).await.unwrap();
    assert_eq!(&result[..], &data[5000..5100]);
}

#[tokio::test]
async fn test_unknown_scheme_has_no_provider() {
    let registry = ProviderRegistry::with_default_providers();
    let config = RangeReaderConfig::parse("gopher://host/blob").unwrap();
    assert!(matches!(
        registry.open(&config).await,
        Err(RangeReaderError::NoProvider(_))
    ));
}

#[tokio::test]
async fn test_injected_provider_is_selectable() {
    struct InMemoryProvider;

    #[async_trait]
    impl RangeReaderProvider for InMemoryProvider {
        fn id(&self) -> &'static str {
            "mem"
        }

        fn order(&self) -> i32 {
            5
        }

        fn params(&self) -> Vec<ProviderParam> {
            Vec::new()
        }

        fn can_process(&self, config: &RangeReaderConfig) -> bool {
            if let Some(id) = config.provider_id() {
                return id == self.id();
            }
            config.uri().scheme() == "mem"
        }

        async fn create(
            &self,
            _config: &RangeReaderConfig,
        ) -> Result<Box<dyn RangeReader>, RangeReaderError> {
            Ok(Box::new(super::test_utils::TrackingReader::new(
                pattern(512),
                "mem://blob",
            )))
        }
    }

    let mut registry = ProviderRegistry::with_default_providers();
    registry.register(Arc::new(InMemoryProvider));

    let config = RangeReaderConfig::parse("mem://anything").unwrap();
    let reader = registry.open(&config).await.unwrap();
    assert_eq!(reader.size(), Some(512));

    // The same provider also answers when forced by id on a foreign URI.
    let forced = RangeReaderConfig::parse("https://example.com/x")
        .unwrap()
        .with_provider("mem");
    let reader = registry.open(&forced).await.unwrap();
    assert_eq!(reader.source_identifier(), "mem://blob");
}
