//! # Tileverse Range Reader
//!
//! A composable pipeline for resolving small, random byte-range reads
//! against large immutable blobs stored on local disk, HTTP servers, or
//! object storage.
//!
//! Cloud-optimized formats (PMTiles, COG, GeoParquet, FlatGeobuf) are read
//! through many scattered range requests; issuing each one against remote
//! storage is ruinously slow. This crate layers alignment and caching
//! decorators over interchangeable backends so that scattered reads become
//! few, large, reusable ones.
//!
//! ## Features
//!
//! - **Range-based access**: every backend resolves `[offset, offset+len)`
//!   requests via positional reads or RFC 7233 range requests
//! - **Block alignment**: requests round outward to block boundaries so
//!   nearby reads share one backend fetch
//! - **Memory caching**: weight-bounded LRU over range keys, with optional
//!   TTL and a prefetched header buffer for file headers and indices
//! - **Disk caching**: persistent per-source cache directories shared
//!   across instances, resilient to external file deletion
//! - **Provider factory**: URI-scheme-driven backend selection with typed,
//!   namespaced configuration parameters
//!
//! ## Architecture
//!
//! - [`reader`] - the [`RangeReader`] contract, backends, and block
//!   alignment
//! - [`cache`] - memory and disk caching decorators
//! - [`channel`] - sequential and seekable stream facades
//! - [`provider`] - provider registry and reader factory
//! - [`config`] - factory configuration and well-known parameter keys
//! - [`error`] - the error taxonomy
//!
//! Decorators own their delegate exclusively and close it when closed;
//! composition is free-form but the useful stack reads caches outside,
//! backend inside:
//!
//! ```text
//! client -> MemoryCachingReader -> DiskCachingReader -> S3RangeReader
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use tileverse_rangereader::{open_reader, RangeReaderConfig, MEMORY_CACHE_ENABLED};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RangeReaderConfig::parse("s3://my-bucket/tiles.pmtiles")?
//!         .with_param(MEMORY_CACHE_ENABLED, "true");
//!
//!     let reader = open_reader(&config).await?;
//!     let header = reader.read_range(0, 16384).await?;
//!     println!("read {} header bytes", header.len());
//!
//!     reader.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod provider;
pub mod range;
pub mod reader;

// Re-export commonly used types
pub use cache::{
    CacheStats, DiskCacheConfig, DiskCachingReader, MemoryCacheConfig, MemoryCachingReader,
    DEFAULT_CACHE_DIR_NAME,
};
pub use channel::{RangeReaderChannel, SeekableRangeReaderChannel};
pub use config::{
    RangeReaderConfig, MEMORY_CACHE_BLOCK_ALIGNED, MEMORY_CACHE_BLOCK_SIZE, MEMORY_CACHE_ENABLED,
};
pub use error::RangeReaderError;
pub use provider::{
    default_registry, open_reader, FileRangeReaderProvider, HttpRangeReaderProvider, ParamType,
    ProviderParam, ProviderRegistry, RangeReaderProvider, S3RangeReaderProvider,
};
pub use range::ByteRange;
pub use reader::{
    create_s3_client, BlockAlignedReader, FileRangeReader, HttpAuth, HttpRangeReader, RangeReader,
    S3ClientOptions, S3RangeReader,
};
