use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::RangeReader;
use crate::error::RangeReaderError;
use crate::range::ByteRange;

/// Options for building an S3 client.
///
/// Custom endpoints cover S3-compatible services (MinIO, localstack); those
/// usually also need path-style addressing. Credentials default to the AWS
/// default provider chain unless a static key pair or a named profile is
/// given.
#[derive(Debug, Clone, Default)]
pub struct S3ClientOptions {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub credentials_profile: Option<String>,
}

/// Create an S3 client from [`S3ClientOptions`].
///
/// ```ignore
/// // MinIO on localhost
/// let client = create_s3_client(S3ClientOptions {
///     endpoint_url: Some("http://localhost:9000".into()),
///     force_path_style: true,
///     ..Default::default()
/// })
/// .await;
/// ```
pub async fn create_s3_client(options: S3ClientOptions) -> Client {
    let region = aws_config::Region::new(
        options.region.unwrap_or_else(|| "us-east-1".to_string()),
    );
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(profile) = options.credentials_profile {
        config_loader = config_loader.profile_name(profile);
    }

    if let (Some(access_key), Some(secret_key)) =
        (options.access_key_id, options.secret_access_key)
    {
        config_loader = config_loader.credentials_provider(
            aws_sdk_s3::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "tileverse-rangereader",
            ),
        );
    }

    if let Some(endpoint) = options.endpoint_url.as_deref() {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(options.force_path_style || options.endpoint_url.is_some())
        .build();

    Client::from_conf(s3_config)
}

/// S3-backed implementation of [`RangeReader`].
///
/// Reads byte ranges from objects in S3 or S3-compatible storage using HTTP
/// range requests. The object size is fetched once at construction via HEAD.
#[derive(Debug)]
pub struct S3RangeReader {
    client: Client,
    bucket: String,
    key: String,
    size: u64,
    identifier: String,
    closed: AtomicBool,
}

impl S3RangeReader {
    /// Create a reader for the given bucket and key.
    ///
    /// Performs a HEAD request to determine the object size. Returns an
    /// error if the object does not exist or is inaccessible.
    pub async fn new(client: Client, bucket: String, key: String) -> Result<Self, RangeReaderError> {
        let identifier = format!("s3://{bucket}/{key}");

        let head = client
            .head_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false)
                    || e.raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);

                if is_not_found {
                    RangeReaderError::NotFound(identifier.clone())
                } else {
                    let status = e.raw_response().map(|r| r.status().as_u16());
                    match status {
                        Some(401) => RangeReaderError::Unauthorized(identifier.clone()),
                        Some(403) => RangeReaderError::Forbidden(identifier.clone()),
                        _ => RangeReaderError::io(&identifier, ByteRange::new(0, 0), e),
                    }
                }
            })?;

        let size = head.content_length().unwrap_or(0) as u64;

        Ok(Self {
            client,
            bucket,
            key,
            size,
            identifier,
            closed: AtomicBool::new(false),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl RangeReader for S3RangeReader {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        // Range header is inclusive on both ends.
        let header = format!("bytes={}-{}", range.offset(), range.end_inclusive());

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(header)
            .send()
            .await
            .map_err(|e| RangeReaderError::io(&self.identifier, range, e))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| RangeReaderError::io(&self.identifier, range, e))?
            .into_bytes();

        Ok(data)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn source_identifier(&self) -> &str {
        &self.identifier
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), RangeReaderError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
