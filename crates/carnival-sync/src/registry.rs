use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Live,
    /// Reads `fixtures/<source_id>/sample/bundle.json` instead of the network.
    Fixture,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub mode: SourceMode,
    #[serde(default)]
    pub listing_urls: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn parse(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry")
    }

    pub async fn load(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join("sources.yaml");
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

impl SourceConfig {
    pub fn fixture_bundle_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root
            .join("fixtures")
            .join(&self.source_id)
            .join("sample")
            .join("bundle.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
sources:
  - source_id: mysideline
    display_name: MySideline
    enabled: true
    mode: fixture
    listing_urls:
      - https://www.mysideline.com.au/api/events/search?category=masters
  - source_id: legacy-calendar
    display_name: Legacy calendar
    enabled: false
    mode: live
"#;

    #[test]
    fn parses_modes_and_filters_disabled() {
        let registry = SourceRegistry::parse(YAML).unwrap();
        let enabled: Vec<_> = registry.enabled().map(|s| s.source_id.as_str()).collect();
        assert_eq!(enabled, vec!["mysideline"]);
        assert_eq!(registry.sources[0].mode, SourceMode::Fixture);
        assert_eq!(registry.sources[1].mode, SourceMode::Live);
        assert!(registry.sources[1].listing_urls.is_empty());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let bad = YAML.replace("mode: fixture", "mode: manual");
        assert!(SourceRegistry::parse(&bad).is_err());
    }

    #[test]
    fn bundle_path_is_per_source() {
        let registry = SourceRegistry::parse(YAML).unwrap();
        assert_eq!(
            registry.sources[0].fixture_bundle_path(Path::new("/srv/carnival")),
            PathBuf::from("/srv/carnival/fixtures/mysideline/sample/bundle.json")
        );
    }
}
