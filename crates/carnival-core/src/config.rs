//! Site-wide switches, read once at start-up and passed to whoever needs them.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SiteMode {
    #[default]
    Live,
    ComingSoon,
    Maintenance,
}

impl SiteMode {
    pub fn is_live(self) -> bool {
        self == SiteMode::Live
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub mode: SiteMode,
    pub site_name: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            mode: SiteMode::Live,
            site_name: "Masters Carnivals".to_string(),
        }
    }
}

fn flag(value: Option<String>) -> bool {
    value
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false)
}

impl SiteConfig {
    /// `SITE_MODE` wins; otherwise the `FEATURE_MAINTENANCE_MODE` and
    /// `FEATURE_COMING_SOON_MODE` booleans apply, maintenance first.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mode = match lookup("SITE_MODE").as_deref().map(str::trim) {
            Some("maintenance") => SiteMode::Maintenance,
            Some("coming_soon") | Some("coming-soon") => SiteMode::ComingSoon,
            Some("live") => SiteMode::Live,
            _ if flag(lookup("FEATURE_MAINTENANCE_MODE")) => SiteMode::Maintenance,
            _ if flag(lookup("FEATURE_COMING_SOON_MODE")) => SiteMode::ComingSoon,
            _ => SiteMode::Live,
        };
        let site_name = lookup("SITE_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| SiteConfig::default().site_name);
        Self { mode, site_name }
    }
}
