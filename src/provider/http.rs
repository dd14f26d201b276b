use async_trait::async_trait;

use super::{ParamType, ProviderParam, RangeReaderProvider};
use crate::config::RangeReaderConfig;
use crate::error::RangeReaderError;
use crate::reader::{HttpAuth, HttpRangeReader, RangeReader};

/// `io.tileverse.rangereader.http.username`
pub const HTTP_USERNAME: &str = "io.tileverse.rangereader.http.username";
/// `io.tileverse.rangereader.http.password`
pub const HTTP_PASSWORD: &str = "io.tileverse.rangereader.http.password";
/// `io.tileverse.rangereader.http.bearer-token`
pub const HTTP_BEARER_TOKEN: &str = "io.tileverse.rangereader.http.bearer-token";

/// Provider for plain `http:`/`https:` URIs.
///
/// Vendor-specific providers that also accept `https:` URLs outrank or
/// underrank this one via `order`; disambiguation headers decide when both
/// match.
pub struct HttpRangeReaderProvider;

#[async_trait]
impl RangeReaderProvider for HttpRangeReaderProvider {
    fn id(&self) -> &'static str {
        "http"
    }

    fn order(&self) -> i32 {
        10
    }

    fn params(&self) -> Vec<ProviderParam> {
        vec![
            ProviderParam::new(
                HTTP_USERNAME,
                "Username",
                "Username for HTTP basic authentication",
                ParamType::String,
            )
            .group("Authentication"),
            ProviderParam::new(
                HTTP_PASSWORD,
                "Password",
                "Password for HTTP basic authentication",
                ParamType::String,
            )
            .group("Authentication")
            .masked(),
            ProviderParam::new(
                HTTP_BEARER_TOKEN,
                "Bearer token",
                "Token for HTTP bearer authentication",
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
        matches!(config.uri().scheme(), "http" | "https")
    }

    async fn create(
        &self,
        config: &RangeReaderConfig,
    ) -> Result<Box<dyn RangeReader>, RangeReaderError> {
        let auth = match (
            config.param(HTTP_USERNAME),
            config.param(HTTP_BEARER_TOKEN),
        ) {
            (Some(_), Some(_)) => {
                return Err(RangeReaderError::Config(
                    "basic and bearer HTTP authentication are mutually exclusive".to_string(),
                ))
            }
            (Some(username), None) => HttpAuth::Basic {
                username: username.to_string(),
                password: config.param(HTTP_PASSWORD).map(str::to_string),
            },
            (None, Some(token)) => HttpAuth::Bearer {
                token: token.to_string(),
            },
            (None, None) => HttpAuth::None,
        };

        let reader = HttpRangeReader::with_client(
            reqwest::Client::new(),
            config.uri().clone(),
            auth,
        )
        .await?;
        Ok(Box::new(reader))
    }
}
