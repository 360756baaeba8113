//! Source fetcher for public proxy lists
//!
//! Every source is requested independently; a failing source is reported and skipped
//! without affecting the others.

use crate::Result;
use futures::future::join_all;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default timeout for a whole source request in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Why a single source produced nothing
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Result of fetching a single source
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The source URL
    pub source: String,
    /// Raw lines of the response body
    pub lines: Vec<String>,
    /// Error message if fetching failed
    pub error: Option<String>,
}

impl FetchResult {
    pub fn success(source: String, lines: Vec<String>) -> Self {
        Self {
            source,
            lines,
            error: None,
        }
    }

    pub fn failure(source: String, error: String) -> Self {
        Self {
            source,
            lines: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for the source fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Upper bound for one source request, body included
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Fetches raw proxy-list text from remote sources
pub struct SourceFetcher {
    client: Client,
}

impl SourceFetcher {
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch one source and split its body on newlines
    pub async fn fetch_source(&self, url: &str) -> std::result::Result<Vec<String>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = response.text().await?;
        Ok(body.split('\n').map(str::to_string).collect())
    }

    /// Fetch every distinct source concurrently, one result per source
    pub async fn fetch_sources_with_results<S: AsRef<str>>(&self, sources: &[S]) -> Vec<FetchResult> {
        let mut seen: HashSet<&str> = HashSet::new();
        let unique: Vec<&str> = sources
            .iter()
            .map(|source| source.as_ref())
            .filter(|url| seen.insert(*url))
            .collect();

        let requests = unique.into_iter().map(|url| async move {
            match self.fetch_source(url).await {
                Ok(lines) => FetchResult::success(url.to_string(), lines),
                Err(e) => FetchResult::failure(url.to_string(), e.to_string()),
            }
        });

        join_all(requests).await
    }

    /// Union of raw lines over every source that answered with 2xx.
    ///
    /// Failed sources are logged as warnings and otherwise ignored.
    pub async fn fetch_lines<S: AsRef<str>>(&self, sources: &[S]) -> Vec<String> {
        let mut lines = Vec::new();

        for result in self.fetch_sources_with_results(sources).await {
            if result.is_success() {
                debug!(source = %result.source, lines = result.lines.len(), "fetched source");
                lines.extend(result.lines);
            } else if let Some(error) = &result.error {
                warn!(source = %result.source, %error, "Error while fetching from \"{}\"", result.source);
            }
        }

        lines
    }
}
