//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Politeness delay between successive request dispatches
//! - Manual redirect handling (the client never follows redirects itself)
//! - Download size enforcement
//! - Error classification

use crate::config::HttpConfig;
use crate::url::canonicalize;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Status codes treated as redirects when redirect following is enabled.
pub(crate) const REDIRECT_CODES: [u16; 6] = [300, 301, 302, 303, 307, 308];

/// Ways a fetch can fail.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("content size {0} exceeds the configured maximum")]
    TooLarge(u64),

    #[error("fetcher is closed")]
    Closed,

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Raw result of fetching one URL.
#[derive(Debug)]
pub struct FetchedPage {
    /// HTTP status code
    pub status: u16,

    /// Content-Type header value, if present
    pub content_type: Option<String>,

    /// Response body
    pub body: Vec<u8>,

    /// The URL the response actually came from. Differs from the requested
    /// URL when the client normalized it.
    pub final_url: String,

    /// Canonicalized Location header for redirect responses
    pub redirect_target: Option<String>,
}

/// Shared HTTP fetcher.
///
/// Dispatches are serialized through a politeness gate: each request starts
/// at least the configured delay after the previous one, while responses
/// may still overlap in flight.
pub struct PageFetcher {
    client: Client,
    politeness_delay: Duration,
    max_download_size: u64,
    last_dispatch: tokio::sync::Mutex<Option<Instant>>,
    closed: AtomicBool,
}

impl PageFetcher {
    pub fn new(http: &HttpConfig, politeness_delay: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_millis(http.socket_timeout_ms))
            .connect_timeout(Duration::from_millis(http.connect_timeout_ms))
            .redirect(Policy::none()) // Redirects are handled by the worker
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            politeness_delay,
            max_download_size: http.max_download_size,
            last_dispatch: tokio::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Clone of the underlying client, for callers that fetch outside the
    /// politeness gate (robots.txt lookups).
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Fetches one URL.
    ///
    /// Redirect responses come back as ordinary results with
    /// `redirect_target` set; deciding whether to follow them is the
    /// caller's business.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::Closed);
        }

        {
            let mut last = self.last_dispatch.lock().await;
            if let Some(previous) = *last {
                let since = previous.elapsed();
                if since < self.politeness_delay {
                    tokio::time::sleep(self.politeness_delay - since).await;
                }
            }
            *last = Some(Instant::now());
        }

        debug!("fetching {url}");
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(FetchError::Timeout),
            Err(e) if e.is_connect() => return Err(FetchError::Connect(e.to_string())),
            Err(e) => return Err(FetchError::Transport(e)),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let redirect_target = if REDIRECT_CODES.contains(&status) {
            let requested = Url::parse(url).ok();
            response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| canonicalize(location, requested.as_ref()))
        } else {
            None
        };

        if let Some(length) = response.content_length() {
            if length > self.max_download_size {
                return Err(FetchError::TooLarge(length));
            }
        }

        let body = self.read_body(response).await?;

        Ok(FetchedPage {
            status,
            content_type,
            body,
            final_url,
            redirect_target,
        })
    }

    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let size = (body.len() + chunk.len()) as u64;
                    if size > self.max_download_size {
                        return Err(FetchError::TooLarge(size));
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => return Ok(body),
                Err(e) if e.is_timeout() => return Err(FetchError::Timeout),
                Err(e) => return Err(FetchError::Transport(e)),
            }
        }
    }

    /// Rejects all future fetches. In-flight requests are not interrupted.
    pub fn shutdown(&self) {
        info!("fetcher closed");
        self.closed.store(true, Ordering::SeqCst);
    }
}
