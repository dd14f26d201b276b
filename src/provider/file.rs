use async_trait::async_trait;

use super::{ProviderParam, RangeReaderProvider};
use crate::config::RangeReaderConfig;
use crate::error::RangeReaderError;
use crate::reader::{FileRangeReader, RangeReader};

/// Provider for `file:` URIs.
pub struct FileRangeReaderProvider;

#[async_trait]
impl RangeReaderProvider for FileRangeReaderProvider {
    fn id(&self) -> &'static str {
        "file"
    }

    fn order(&self) -> i32 {
        0
    }

    fn params(&self) -> Vec<ProviderParam> {
        Vec::new()
    }

    fn can_process(&self, config: &RangeReaderConfig) -> bool {
        if let Some(id) = config.provider_id() {
            return id == self.id();
        }
        config.uri().scheme() == "file"
    }

    async fn create(
        &self,
        config: &RangeReaderConfig,
    ) -> Result<Box<dyn RangeReader>, RangeReaderError> {
        let path = config.uri().to_file_path().map_err(|_| {
            RangeReaderError::Config(format!("not a file path: {}", config.uri()))
        })?;
        Ok(Box::new(FileRangeReader::new(path).await?))
    }
}
