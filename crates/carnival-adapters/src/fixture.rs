//! Captured source pages used for offline sync runs and parser tests.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ListingPage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub fixture_id: String,
    pub source_id: String,
    pub captured_from_url: String,
    pub fetched_at: DateTime<Utc>,
    pub raw_artifact: FixtureRawArtifact,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRawArtifact {
    pub content_type: String,
    /// Relative to the bundle file.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub inline_text: Option<String>,
}

impl FixtureBundle {
    pub fn to_listing_page(&self) -> ListingPage {
        ListingPage {
            url: self.captured_from_url.clone(),
            content_type: self.raw_artifact.content_type.clone(),
            body: self
                .raw_artifact
                .inline_text
                .clone()
                .unwrap_or_default()
                .into_bytes(),
            fetched_at: self.fetched_at,
        }
    }
}

/// Reads `bundle.json` and inlines the raw artifact it points at.
pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut bundle: FixtureBundle =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;

    if bundle.raw_artifact.inline_text.is_none() {
        if let Some(rel) = &bundle.raw_artifact.path {
            let raw_path = path.parent().unwrap_or_else(|| Path::new(".")).join(rel);
            let raw = fs::read_to_string(&raw_path)
                .with_context(|| format!("reading fixture artifact {}", raw_path.display()))?;
            bundle.raw_artifact.inline_text = Some(raw);
        }
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn bundle_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/mysideline/sample/bundle.json")
    }

    #[test]
    fn bundle_inlines_referenced_artifact() {
        let bundle = load_fixture_bundle(bundle_path()).unwrap();
        assert_eq!(bundle.source_id, "mysideline");
        let page = bundle.to_listing_page();
        assert!(page.is_json());
        assert!(!page.body.is_empty());
    }

    #[test]
    fn missing_bundle_reports_path() {
        let err = load_fixture_bundle("/nonexistent/bundle.json").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/bundle.json"));
    }
}
