//! Configuration passed to the provider factory.
//!
//! A [`RangeReaderConfig`] names the blob (a URI), optionally forces a
//! provider, and carries typed key/value parameters. Well-known keys form a
//! namespaced vocabulary per provider (e.g.
//! `io.tileverse.rangereader.s3.region`); the caching keys below are
//! recognized for every provider. Unknown keys are ignored with a warning.

use std::collections::HashMap;

use url::Url;

use crate::error::RangeReaderError;

/// Wrap the created reader with an in-memory cache.
pub const MEMORY_CACHE_ENABLED: &str = "memory-cache.enabled";

/// Enable internal block alignment in the memory cache (or, without the
/// cache, wrap with a block-aligned reader).
pub const MEMORY_CACHE_BLOCK_ALIGNED: &str = "memory-cache.block-aligned";

/// Block size in bytes when alignment is enabled.
pub const MEMORY_CACHE_BLOCK_SIZE: &str = "memory-cache.block-size";

/// Configuration for opening a [`RangeReader`] through the provider
/// factory.
///
/// [`RangeReader`]: crate::reader::RangeReader
#[derive(Debug, Clone)]
pub struct RangeReaderConfig {
    uri: Url,
    provider_id: Option<String>,
    params: HashMap<String, String>,
}

impl RangeReaderConfig {
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            provider_id: None,
            params: HashMap::new(),
        }
    }

    /// Parse the URI and build a config for it.
    pub fn parse(uri: &str) -> Result<Self, RangeReaderError> {
        let uri = Url::parse(uri)
            .map_err(|e| RangeReaderError::Config(format!("invalid URI {uri:?}: {e}")))?;
        Ok(Self::new(uri))
    }

    /// Force a specific provider instead of scheme-based selection.
    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn param_keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// A boolean parameter; `Ok(None)` when absent, `ConfigError` when
    /// present but not `true`/`false`.
    pub fn bool_param(&self, key: &str) -> Result<Option<bool>, RangeReaderError> {
        match self.param(key) {
            None => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(v) => Err(RangeReaderError::Config(format!(
                "parameter {key} must be true or false, got {v:?}"
            ))),
        }
    }

    /// An unsigned integer parameter; `Ok(None)` when absent.
    pub fn u64_param(&self, key: &str) -> Result<Option<u64>, RangeReaderError> {
        match self.param(key) {
            None => Ok(None),
            Some(v) => v.parse::<u64>().map(Some).map_err(|e| {
                RangeReaderError::Config(format!(
                    "parameter {key} must be a non-negative integer, got {v:?}: {e}"
                ))
            }),
        }
    }
}
