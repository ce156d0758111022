use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    /// Doubling delay from `base_delay`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt)
            .ok()
            .and_then(|a| 1u32.checked_shl(a))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Server errors and throttling are worth another attempt; anything else in
/// the 4xx range will not improve.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            max_concurrency: 4,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetcher is shutting down")]
    Closed,
}

/// Shared HTTP client for source listings. Caps in-flight requests and retries
/// transient failures with exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(agent) = config.user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            backoff: config.backoff,
        })
    }

    pub async fn get(&self, run_id: Uuid, source_id: &str, url: &str) -> Result<FetchedPage, FetchError> {
        let _permit = self.permits.acquire().await.map_err(|_| FetchError::Closed)?;
        self.get_with_retries(url)
            .instrument(info_span!("http_fetch", %run_id, source_id, url))
            .await
    }

    async fn get_with_retries(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;
        loop {
            let retry = attempt < self.backoff.max_retries;
            let outcome = self.client.get(url).send().await;
            let failure = match outcome {
                Ok(resp) if resp.status().is_success() => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    let content_type = resp
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let body = resp.bytes().await.map_err(|source| FetchError::Request {
                        url: final_url.clone(),
                        source,
                    })?;
                    debug!(status = status.as_u16(), bytes = body.len(), "fetched");
                    return Ok(FetchedPage {
                        status,
                        final_url,
                        content_type,
                        body: body.to_vec(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let err = FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: resp.url().to_string(),
                    };
                    if !(retry && is_retryable_status(status)) {
                        return Err(err);
                    }
                    err
                }
                Err(source) => {
                    let transient = is_retryable_error(&source);
                    let err = FetchError::Request {
                        url: url.to_string(),
                        source,
                    };
                    if !(retry && transient) {
                        return Err(err);
                    }
                    err
                }
            };

            let delay = self.backoff.delay_for_attempt(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %failure, "retrying fetch");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_millis(350));
    }

    #[test]
    fn only_server_errors_and_throttling_retry() {
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn unreachable_host_fails_after_retries() {
        let fetcher = HttpFetcher::new(FetcherConfig {
            timeout: Duration::from_millis(200),
            backoff: BackoffPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            ..Default::default()
        })
        .unwrap();
        let err = fetcher
            .get(Uuid::new_v4(), "mysideline", "http://127.0.0.1:9/events")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
    }
}
