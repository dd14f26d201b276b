//! Provider registry and reader factory.
//!
//! A [`RangeReaderProvider`] knows how to build a backend reader for the
//! URIs it understands; the [`ProviderRegistry`] picks the right provider
//! for a [`RangeReaderConfig`] and applies the standard caching
//! parameters to whatever it builds.
//!
//! Selection:
//!
//! 1. A forced `provider_id` selects that provider directly.
//! 2. Otherwise every available provider is asked
//!    [`can_process`](RangeReaderProvider::can_process), in `order`.
//! 3. No match is a [`NoProvider`] error; a unique match wins.
//! 4. Several matches on an `http(s)` URI are disambiguated by a single
//!    HEAD probe whose response headers are offered to each candidate's
//!    [`can_process_headers`](RangeReaderProvider::can_process_headers);
//!    the first acceptor wins, falling back to the first candidate by
//!    `order`.
//!
//! [`NoProvider`]: crate::error::RangeReaderError::NoProvider

mod file;
mod http;
mod s3;

pub use file::FileRangeReaderProvider;
pub use http::HttpRangeReaderProvider;
pub use s3::S3RangeReaderProvider;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{MemoryCacheConfig, MemoryCachingReader};
use crate::config::{
    RangeReaderConfig, MEMORY_CACHE_BLOCK_ALIGNED, MEMORY_CACHE_BLOCK_SIZE, MEMORY_CACHE_ENABLED,
};
use crate::error::RangeReaderError;
use crate::reader::{BlockAlignedReader, RangeReader};

/// Value type of a provider parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

/// Descriptor for one typed configuration parameter a provider accepts.
#[derive(Debug, Clone)]
pub struct ProviderParam {
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub param_type: ParamType,
    /// Logical grouping for UIs, e.g. `"Authentication"`.
    pub group: Option<&'static str>,
    /// Enumerated legal values, when the parameter is a choice.
    pub options: Vec<&'static str>,
    pub default_value: Option<&'static str>,
    /// Secret values (passwords, keys) that UIs must mask.
    pub masked: bool,
}

impl ProviderParam {
    pub fn new(
        key: &'static str,
        title: &'static str,
        description: &'static str,
        param_type: ParamType,
    ) -> Self {
        Self {
            key,
            title,
            description,
            param_type,
            group: None,
            options: Vec::new(),
            default_value: None,
            masked: false,
        }
    }

    pub fn group(mut self, group: &'static str) -> Self {
        self.group = Some(group);
        self
    }

    pub fn options(mut self, options: Vec<&'static str>) -> Self {
        self.options = options;
        self
    }

    pub fn default_value(mut self, value: &'static str) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn masked(mut self) -> Self {
        self.masked = true;
        self
    }
}

/// Environment toggle: `IO_TILEVERSE_RANGEREADER_<ID>=false` disables a
/// provider.
pub(crate) fn provider_enabled(id: &str) -> bool {
    let var = format!(
        "IO_TILEVERSE_RANGEREADER_{}",
        id.to_ascii_uppercase().replace('-', "_")
    );
    match std::env::var(var) {
        Ok(value) => !value.eq_ignore_ascii_case("false"),
        Err(_) => true,
    }
}

/// Pluggable factory for one kind of backend reader.
#[async_trait]
pub trait RangeReaderProvider: Send + Sync {
    /// Stable identifier, e.g. `"file"`, `"http"`, `"s3"`.
    fn id(&self) -> &'static str;

    /// Selection order; lower is preferred.
    fn order(&self) -> i32;

    /// Whether this provider may be used at all. The default honors the
    /// `IO_TILEVERSE_RANGEREADER_<ID>` environment toggle.
    fn is_available(&self) -> bool {
        provider_enabled(self.id())
    }

    /// The typed parameters this provider understands, in display order.
    fn params(&self) -> Vec<ProviderParam>;

    /// Whether this provider can handle the configured URI.
    fn can_process(&self, config: &RangeReaderConfig) -> bool;

    /// Disambiguation hook: whether the HEAD response of an `http(s)` URI
    /// identifies this provider's kind of backend (e.g. `x-amz-*` headers
    /// betray an S3-compatible server).
    fn can_process_headers(&self, _uri: &Url, _headers: &HeaderMap) -> bool {
        false
    }

    /// Build a reader for the configuration.
    async fn create(
        &self,
        config: &RangeReaderConfig,
    ) -> Result<Box<dyn RangeReader>, RangeReaderError>;
}

/// An ordered collection of providers.
///
/// The process-wide [`default_registry`] carries the built-in providers;
/// tests and embedders build their own with [`ProviderRegistry::empty`]
/// and [`ProviderRegistry::register`].
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn RangeReaderProvider>>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Registry holding the built-in `file`, `http`, and `s3` providers.
    pub fn with_default_providers() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(FileRangeReaderProvider));
        registry.register(Arc::new(HttpRangeReaderProvider));
        registry.register(Arc::new(S3RangeReaderProvider));
        registry
    }

    /// Add a provider, keeping the collection sorted by `order`.
    pub fn register(&mut self, provider: Arc<dyn RangeReaderProvider>) {
        self.providers.push(provider);
        self.providers.sort_by_key(|p| p.order());
    }

    /// Available providers, sorted by `order`.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn RangeReaderProvider>> {
        self.providers.iter().filter(|p| p.is_available())
    }

    pub fn find(&self, id: &str) -> Option<&Arc<dyn RangeReaderProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Select the provider for a configuration per the rules above.
    async fn select(
        &self,
        config: &RangeReaderConfig,
    ) -> Result<&Arc<dyn RangeReaderProvider>, RangeReaderError> {
        if let Some(id) = config.provider_id() {
            return self
                .find(id)
                .filter(|p| p.is_available())
                .ok_or_else(|| RangeReaderError::NoProvider(format!("forced provider {id:?}")));
        }

        let candidates: Vec<&Arc<dyn RangeReaderProvider>> = self
            .providers()
            .filter(|p| p.can_process(config))
            .collect();

        match candidates.len() {
            0 => Err(RangeReaderError::NoProvider(config.uri().to_string())),
            1 => Ok(candidates[0]),
            _ => {
                if let Some(headers) = probe_headers(config.uri()).await {
                    for candidate in &candidates {
                        if candidate.can_process_headers(config.uri(), &headers) {
                            debug!(
                                provider = candidate.id(),
                                uri = %config.uri(),
                                "disambiguated by response headers"
                            );
                            return Ok(candidate);
                        }
                    }
                }
                Ok(candidates[0])
            }
        }
    }

    /// Select a provider, build its reader, and apply the standard caching
    /// parameters.
    pub async fn open(
        &self,
        config: &RangeReaderConfig,
    ) -> Result<Box<dyn RangeReader>, RangeReaderError> {
        let provider = self.select(config).await?;
        warn_unknown_params(provider.as_ref(), config);
        let reader = provider.create(config).await?;
        apply_standard_caching(reader, config).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_default_providers()
    }
}

static DEFAULT_REGISTRY: OnceLock<ProviderRegistry> = OnceLock::new();

/// The process-wide registry of built-in providers.
pub fn default_registry() -> &'static ProviderRegistry {
    DEFAULT_REGISTRY.get_or_init(ProviderRegistry::with_default_providers)
}

/// Open a reader through the process-wide registry.
pub async fn open_reader(
    config: &RangeReaderConfig,
) -> Result<Box<dyn RangeReader>, RangeReaderError> {
    default_registry().open(config).await
}

/// One HEAD request against an `http(s)` URI for provider disambiguation.
async fn probe_headers(uri: &Url) -> Option<HeaderMap> {
    if !matches!(uri.scheme(), "http" | "https") {
        return None;
    }
    match reqwest::Client::new().head(uri.clone()).send().await {
        Ok(response) => Some(response.headers().clone()),
        Err(e) => {
            debug!(uri = %uri, error = %e, "disambiguation probe failed");
            None
        }
    }
}

fn warn_unknown_params(provider: &dyn RangeReaderProvider, config: &RangeReaderConfig) {
    const STANDARD_KEYS: [&str; 3] = [
        MEMORY_CACHE_ENABLED,
        MEMORY_CACHE_BLOCK_ALIGNED,
        MEMORY_CACHE_BLOCK_SIZE,
    ];
    let known = provider.params();
    for key in config.param_keys() {
        if STANDARD_KEYS.contains(&key) || known.iter().any(|p| p.key == key) {
            continue;
        }
        warn!(
            provider = provider.id(),
            key, "ignoring unknown configuration parameter"
        );
    }
}

/// Wrap a freshly created reader per the standard caching parameters.
async fn apply_standard_caching(
    reader: Box<dyn RangeReader>,
    config: &RangeReaderConfig,
) -> Result<Box<dyn RangeReader>, RangeReaderError> {
    let cache_enabled = config.bool_param(MEMORY_CACHE_ENABLED)?.unwrap_or(false);
    let block_aligned = config
        .bool_param(MEMORY_CACHE_BLOCK_ALIGNED)?
        .unwrap_or(false);
    let block_size = config.u64_param(MEMORY_CACHE_BLOCK_SIZE)?;

    if cache_enabled {
        let cache_config = MemoryCacheConfig {
            block_size: block_aligned
                .then_some(block_size.unwrap_or(crate::reader::DEFAULT_BLOCK_SIZE)),
            ..Default::default()
        };
        let cached = MemoryCachingReader::new(reader, cache_config).await?;
        return Ok(Box::new(cached));
    }
    if block_aligned {
        let aligned = match block_size {
            Some(size) => BlockAlignedReader::with_block_size(reader, size)?,
            None => BlockAlignedReader::new(reader)?,
        };
        return Ok(Box::new(aligned));
    }
    Ok(reader)
}
