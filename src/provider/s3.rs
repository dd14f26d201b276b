use async_trait::async_trait;
use reqwest::header::HeaderMap;
use url::Url;

use super::{ParamType, ProviderParam, RangeReaderProvider};
use crate::config::RangeReaderConfig;
use crate::error::RangeReaderError;
use crate::reader::{create_s3_client, RangeReader, S3ClientOptions, S3RangeReader};

/// `io.tileverse.rangereader.s3.region`
pub const S3_REGION: &str = "io.tileverse.rangereader.s3.region";
/// `io.tileverse.rangereader.s3.endpoint`
pub const S3_ENDPOINT: &str = "io.tileverse.rangereader.s3.endpoint";
/// `io.tileverse.rangereader.s3.aws-access-key-id`
pub const S3_ACCESS_KEY_ID: &str = "io.tileverse.rangereader.s3.aws-access-key-id";
/// `io.tileverse.rangereader.s3.aws-secret-access-key`
pub const S3_SECRET_ACCESS_KEY: &str = "io.tileverse.rangereader.s3.aws-secret-access-key";
/// `io.tileverse.rangereader.s3.use-default-credentials-provider`
pub const S3_USE_DEFAULT_CREDENTIALS: &str =
    "io.tileverse.rangereader.s3.use-default-credentials-provider";
/// `io.tileverse.rangereader.s3.default-credentials-profile`
pub const S3_CREDENTIALS_PROFILE: &str =
    "io.tileverse.rangereader.s3.default-credentials-profile";
/// `io.tileverse.rangereader.s3.force-path-style`
pub const S3_FORCE_PATH_STYLE: &str = "io.tileverse.rangereader.s3.force-path-style";

/// Provider for `s3:` URIs and S3-served `http(s):` URLs.
pub struct S3RangeReaderProvider;

/// Split a URI into `(bucket, key)`.
///
/// `s3://bucket/key` is the native form; `http(s)` URLs use path-style
/// addressing (`https://host/bucket/key`), the layout S3-compatible
/// endpoints serve.
fn parse_bucket_and_key(uri: &Url) -> Result<(String, String), RangeReaderError> {
    match uri.scheme() {
        "s3" => {
            let bucket = uri
                .host_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| {
                    RangeReaderError::Config(format!("missing bucket in {uri}"))
                })?
                .to_string();
            let key = uri.path().trim_start_matches('/').to_string();
            if key.is_empty() {
                return Err(RangeReaderError::Config(format!("missing object key in {uri}")));
            }
            Ok((bucket, key))
        }
        "http" | "https" => {
            let mut segments = uri
                .path_segments()
                .ok_or_else(|| RangeReaderError::Config(format!("missing path in {uri}")))?;
            let bucket = segments
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    RangeReaderError::Config(format!("missing bucket in {uri}"))
                })?
                .to_string();
            let key = segments.collect::<Vec<_>>().join("/");
            if key.is_empty() {
                return Err(RangeReaderError::Config(format!("missing object key in {uri}")));
            }
            Ok((bucket, key))
        }
        other => Err(RangeReaderError::Config(format!(
            "unsupported scheme {other:?} for the s3 provider"
        ))),
    }
}

/// Whether a host is a recognizable S3 endpoint.
fn looks_like_s3_host(host: &str) -> bool {
    host.ends_with(".amazonaws.com") || host.contains(".s3.") || host.starts_with("s3.")
}

#[async_trait]
impl RangeReaderProvider for S3RangeReaderProvider {
    fn id(&self) -> &'static str {
        "s3"
    }

    fn order(&self) -> i32 {
        20
    }

    fn params(&self) -> Vec<ProviderParam> {
        vec![
            ProviderParam::new(
                S3_REGION,
                "Region",
                "AWS region of the bucket",
                ParamType::String,
            )
            .default_value("us-east-1"),
            ProviderParam::new(
                S3_ENDPOINT,
                "Endpoint",
                "Custom endpoint URL for S3-compatible services",
                ParamType::String,
            ),
            ProviderParam::new(
                S3_FORCE_PATH_STYLE,
                "Force path-style addressing",
                "Use path-style requests; required by most S3-compatible services",
                ParamType::Boolean,
            )
            .default_value("false"),
            ProviderParam::new(
                S3_USE_DEFAULT_CREDENTIALS,
                "Use default credentials provider",
                "Resolve credentials from the AWS default chain",
                ParamType::Boolean,
            )
            .group("Authentication")
            .default_value("true"),
            ProviderParam::new(
                S3_CREDENTIALS_PROFILE,
                "Credentials profile",
                "Named profile for the default credentials chain",
                ParamType::String,
            )
            .group("Authentication"),
            ProviderParam::new(
                S3_ACCESS_KEY_ID,
                "Access key ID",
                "Static AWS access key ID",
                ParamType::String,
            )
            .group("Authentication"),
            ProviderParam::new(
                S3_SECRET_ACCESS_KEY,
                "Secret access key",
                "Static AWS secret access key",
                ParamType::String,
            )
            .group("Authentication")
            .masked(),
        ]
    }

    fn can_process(&self, config: &RangeReaderConfig) -> bool {
        if let Some(id) = config.provider_id() {
            return id == self.id();
        }
        match config.uri().scheme() {
            "s3" => true,
            "http" | "https" => config
                .uri()
                .host_str()
                .is_some_and(looks_like_s3_host),
            _ => false,
        }
    }

    fn can_process_headers(&self, _uri: &Url, headers: &HeaderMap) -> bool {
        headers
            .keys()
            .any(|name| name.as_str().starts_with("x-amz-"))
    }

    async fn create(
        &self,
        config: &RangeReaderConfig,
    ) -> Result<Box<dyn RangeReader>, RangeReaderError> {
        let (bucket, key) = parse_bucket_and_key(config.uri())?;

        let use_default_chain = config
            .bool_param(S3_USE_DEFAULT_CREDENTIALS)?
            .unwrap_or(true);
        let access_key_id = config.param(S3_ACCESS_KEY_ID).map(str::to_string);
        let secret_access_key = config.param(S3_SECRET_ACCESS_KEY).map(str::to_string);
        if !use_default_chain && access_key_id.is_none() {
            return Err(RangeReaderError::Config(
                "static credentials requested but no access key configured".to_string(),
            ));
        }

        let options = S3ClientOptions {
            region: config.param(S3_REGION).map(str::to_string),
            endpoint_url: config.param(S3_ENDPOINT).map(str::to_string),
            force_path_style: config.bool_param(S3_FORCE_PATH_STYLE)?.unwrap_or(false),
            access_key_id,
            secret_access_key,
            credentials_profile: config.param(S3_CREDENTIALS_PROFILE).map(str::to_string),
        };

        let client = create_s3_client(options).await;
        let reader = S3RangeReader::new(client, bucket, key).await?;
        Ok(Box::new(reader))
    }
}
