//! Source adapter contract and the MySideline implementation.

use async_trait::async_trait;
use carnival_core::ExternalCarnival;
use carnival_storage::{FetchError, HttpFetcher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod fixture;
pub mod mysideline;

pub use fixture::{load_fixture_bundle, FixtureBundle, FixtureRawArtifact};
pub use mysideline::MySidelineAdapter;

pub const CRATE_NAME: &str = "carnival-adapters";

/// One raw listing response, either fetched live or read from a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingPage {
    pub url: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl ListingPage {
    pub fn is_json(&self) -> bool {
        if self.content_type.to_ascii_lowercase().contains("json") {
            return true;
        }
        let head = self.body.iter().find(|b| !b.is_ascii_whitespace());
        matches!(head, Some(b'{') | Some(b'['))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector {selector}: {message}")]
    Selector { selector: String, message: String },
    #[error("malformed listing from {url}: {message}")]
    Malformed { url: String, message: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_listing(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        listing_urls: &[String],
    ) -> Result<Vec<ListingPage>, AdapterError>;

    /// Records without a title or a readable date are dropped, not errors.
    fn parse_listing(&self, page: &ListingPage) -> Result<Vec<ExternalCarnival>, AdapterError>;
}

pub fn adapter_for_source(source_id: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_id {
        mysideline::SOURCE_ID => Some(Box::new(MySidelineAdapter)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(content_type: &str, body: &str) -> ListingPage {
        ListingPage {
            url: "https://example.test".into(),
            content_type: content_type.into(),
            body: body.as_bytes().to_vec(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn json_is_detected_by_header_or_body() {
        assert!(page("application/json; charset=utf-8", "").is_json());
        assert!(page("text/plain", "  [ ]").is_json());
        assert!(!page("text/html", "<html></html>").is_json());
    }

    #[test]
    fn registry_knows_mysideline_only() {
        assert_eq!(
            adapter_for_source("mysideline").map(|a| a.source_id()),
            Some("mysideline")
        );
        assert!(adapter_for_source("sportstg").is_none());
    }
}
