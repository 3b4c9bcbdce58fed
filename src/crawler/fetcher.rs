//! Fetch strategies
//!
//! This module defines the [`PageFetcher`] seam the crawl engine drives and the
//! static HTTP implementation of it:
//! - Building HTTP clients with proper user agent strings
//! - Size-capped GET requests (declared length checked up front, body
//!   streamed and cut off once it crosses the limit)
//! - Markup detection from the Content-Type header
//! - Error classification

use super::parser::{parse_references, PageReferences};
use crate::config::{FetcherConfig, UserAgentConfig};
use crate::url::{is_private_host, same_host};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, Response};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Maximum redirect hops followed for a single request
const MAX_REDIRECTS: usize = 10;

/// Why a single fetch produced nothing
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} exceeds the size limit ({size} > {limit} bytes)")]
    TooLarge { url: String, size: u64, limit: u64 },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Rendering infrastructure unavailable: {0}")]
    Infrastructure(String),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true when the failure affects the whole job rather than one resource
    pub fn is_job_fatal(&self) -> bool {
        matches!(self, FetchError::Infrastructure(_))
    }

    fn from_reqwest(url: &Url, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            FetchError::Network {
                url: url.to_string(),
                message: "Connection refused".to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// A fetched page with the references discovered in it
#[derive(Debug, Clone)]
pub struct RetrievedPage {
    /// Final URL after redirects
    pub url: Url,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Empty unless the body is markup
    pub references: PageReferences,
}

impl RetrievedPage {
    pub fn is_markup(&self) -> bool {
        is_markup_type(self.content_type.as_deref())
    }
}

/// A fetched asset body
#[derive(Debug, Clone)]
pub struct RetrievedAsset {
    pub url: Url,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// A strategy for retrieving pages and assets
///
/// `max_bytes` bounds the retained body; implementations return
/// [`FetchError::TooLarge`] instead of keeping anything bigger.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<RetrievedPage, FetchError>;

    async fn fetch_asset(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<RetrievedAsset, FetchError>;
}

/// Returns true for HTML and XHTML content types
pub fn is_markup_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|value| {
            let value = value.to_ascii_lowercase();
            value.contains("text/html") || value.contains("application/xhtml+xml")
        })
        .unwrap_or(false)
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use sumi_mirror::config::{FetcherConfig, UserAgentConfig};
/// use sumi_mirror::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default(), &UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    fetcher: &FetcherConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(fetcher.request_timeout())
        .connect_timeout(fetcher.connect_timeout())
        .redirect(redirect_policy())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Follows up to [`MAX_REDIRECTS`] hops but never onto a private host other
/// than the one originally requested
///
/// A refused hop returns the redirect response itself, which the caller
/// reports as a status error.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }

        let off_origin = attempt
            .previous()
            .first()
            .map(|origin| !same_host(origin, attempt.url()))
            .unwrap_or(true);
        if off_origin && is_private_host(attempt.url()) {
            tracing::warn!("Refusing redirect to private host {}", attempt.url());
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

/// Static strategy: one plain GET per resource
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(
        fetcher: &FetcherConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, reqwest::Error> {
        build_http_client(fetcher, user_agent).map(Self::new)
    }

    /// Sends a GET and reads at most `max_bytes` of body
    async fn get(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<RetrievedAsset, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.client.get(url.clone()).send() => {
                response.map_err(|e| FetchError::from_reqwest(url, e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(declared) = response.content_length() {
            if declared > max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    size: declared,
                    limit: max_bytes,
                });
            }
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            body = read_capped(response, url, max_bytes) => body?,
        };

        Ok(RetrievedAsset {
            url: final_url,
            content_type,
            body,
        })
    }
}

/// Streams a response body, failing as soon as it grows past `max_bytes`
async fn read_capped(
    mut response: Response,
    url: &Url,
    max_bytes: u64,
) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?
    {
        let size = (body.len() + chunk.len()) as u64;
        if size > max_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size,
                limit: max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<RetrievedPage, FetchError> {
        let fetched = self.get(url, max_bytes, cancel).await?;

        let references = if is_markup_type(fetched.content_type.as_deref()) {
            parse_references(&String::from_utf8_lossy(&fetched.body), &fetched.url)
        } else {
            PageReferences::default()
        };

        Ok(RetrievedPage {
            url: fetched.url,
            content_type: fetched.content_type,
            body: fetched.body,
            references,
        })
    }

    async fn fetch_asset(
        &self,
        url: &Url,
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<RetrievedAsset, FetchError> {
        self.get(url, max_bytes, cancel).await
    }
}
