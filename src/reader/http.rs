use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode};
use url::Url;

use super::RangeReader;
use crate::error::RangeReaderError;
use crate::range::ByteRange;

/// Authentication applied to every HTTP request.
#[derive(Debug, Clone, Default)]
pub enum HttpAuth {
    #[default]
    None,
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer {
        token: String,
    },
}

impl HttpAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            HttpAuth::None => request,
            HttpAuth::Basic { username, password } => {
                request.basic_auth(username, password.as_deref())
            }
            HttpAuth::Bearer { token } => request.bearer_auth(token),
        }
    }
}

/// HTTP(S) implementation of [`RangeReader`] using RFC 7233 range requests
/// (`Range: bytes=start-end`, both ends inclusive).
///
/// The resource size is discovered once at construction via a HEAD request.
/// Servers that do not report a `Content-Length` yield an unknown size and
/// end-of-resource shows up as short reads; servers that advertise
/// `Accept-Ranges: none` or answer a range request with the full body fail
/// with [`RangeReaderError::UnsupportedRangeRequests`].
pub struct HttpRangeReader {
    client: Client,
    url: Url,
    auth: HttpAuth,
    size: Option<u64>,
    identifier: String,
    closed: AtomicBool,
}

impl HttpRangeReader {
    /// Create a reader for `url` with a default client and no auth.
    pub async fn new(url: Url) -> Result<Self, RangeReaderError> {
        Self::with_client(Client::new(), url, HttpAuth::None).await
    }

    /// Create a reader with a caller-supplied client and authentication.
    ///
    /// Performs a HEAD request to discover the resource size and to reject
    /// servers that advertise `Accept-Ranges: none` up front.
    pub async fn with_client(
        client: Client,
        url: Url,
        auth: HttpAuth,
    ) -> Result<Self, RangeReaderError> {
        let identifier = url.to_string();

        let head = auth
            .apply(client.head(url.clone()))
            .send()
            .await
            .map_err(|e| RangeReaderError::io(&identifier, ByteRange::new(0, 0), e))?;

        map_status(head.status(), &identifier)?;

        if let Some(accept) = head.headers().get(reqwest::header::ACCEPT_RANGES) {
            if accept.as_bytes().eq_ignore_ascii_case(b"none") {
                return Err(RangeReaderError::UnsupportedRangeRequests(identifier));
            }
        }

        let size = head
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        Ok(Self {
            client,
            url,
            auth,
            size,
            identifier,
            closed: AtomicBool::new(false),
        })
    }
}

fn map_status(status: StatusCode, identifier: &str) -> Result<(), RangeReaderError> {
    match status {
        StatusCode::NOT_FOUND => Err(RangeReaderError::NotFound(identifier.to_string())),
        StatusCode::UNAUTHORIZED => Err(RangeReaderError::Unauthorized(identifier.to_string())),
        StatusCode::FORBIDDEN => Err(RangeReaderError::Forbidden(identifier.to_string())),
        s if s.is_client_error() || s.is_server_error() => Err(RangeReaderError::io(
            identifier,
            ByteRange::new(0, 0),
            format!("unexpected status {s}"),
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl RangeReader for HttpRangeReader {
    async fn read_clipped(&self, range: ByteRange) -> Result<Bytes, RangeReaderError> {
        let header = format!("bytes={}-{}", range.offset(), range.end_inclusive());

        let response = self
            .auth
            .apply(self.client.get(self.url.clone()))
            .header(reqwest::header::RANGE, header)
            .send()
            .await
            .map_err(|e| RangeReaderError::io(&self.identifier, range, e))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            // Only reachable when the size is unknown and the request ran
            // past the end of the resource.
            StatusCode::RANGE_NOT_SATISFIABLE => return Ok(Bytes::new()),
            StatusCode::OK => {
                return Err(RangeReaderError::UnsupportedRangeRequests(
                    self.identifier.clone(),
                ))
            }
            status => map_status(status, &self.identifier)?,
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| RangeReaderError::io(&self.identifier, range, e))?;

        // The contract caps the result at the requested length even when a
        // server over-answers the end bound.
        if data.len() as u64 > range.length() {
            Ok(data.slice(..range.length() as usize))
        } else {
            Ok(data)
        }
    }

    fn size(&self) -> Option<u64> {
        self.size
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
