use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use carnival_adapters::{adapter_for_source, load_fixture_bundle, AdapterContext, ListingPage, SourceAdapter};
use carnival_core::{CarnivalStore, ExternalCarnival};
use carnival_storage::{FetcherConfig, HttpFetcher, SnapshotArchive};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::registry::{SourceConfig, SourceMode, SourceRegistry};
use crate::upsert::sync_external_records;

#[derive(Debug, Clone, Serialize)]
pub struct SourceRunReport {
    pub source_id: String,
    pub display_name: String,
    pub ok: bool,
    pub error: Option<String>,
    pub pages: usize,
    pub parsed_records: usize,
    pub new_carnivals: usize,
    pub updated_carnivals: usize,
    pub skipped_past: usize,
    pub failed_records: usize,
}

impl SourceRunReport {
    fn new(source: &SourceConfig) -> Self {
        Self {
            source_id: source.source_id.clone(),
            display_name: source.display_name.clone(),
            ok: true,
            error: None,
            pages: 0,
            parsed_records: 0,
            new_carnivals: 0,
            updated_carnivals: 0,
            skipped_past: 0,
            failed_records: 0,
        }
    }

    fn failed(mut self, err: impl std::fmt::Display) -> Self {
        self.ok = false;
        self.error = Some(err.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_sources: usize,
    pub new_carnivals: usize,
    pub updated_carnivals: usize,
    pub skipped_past: usize,
    pub failed_records: usize,
    pub sources: Vec<SourceRunReport>,
    pub reports_dir: String,
}

pub struct SyncPipeline {
    config: SyncConfig,
    store: Arc<dyn CarnivalStore>,
    archive: SnapshotArchive,
    http: HttpFetcher,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig, store: Arc<dyn CarnivalStore>) -> Result<Self> {
        let http = HttpFetcher::new(FetcherConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        Ok(Self::with_fetcher(config, store, http))
    }

    pub fn with_fetcher(config: SyncConfig, store: Arc<dyn CarnivalStore>, http: HttpFetcher) -> Self {
        let archive = SnapshotArchive::new(config.snapshots_dir.clone());
        Self {
            config,
            store,
            archive,
            http,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// One pass over every enabled source. A source that cannot be fetched or
    /// parsed is reported and skipped; stored carnivals are left as they were.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        self.run(run_id)
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    async fn run(&self, run_id: Uuid) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let registry = SourceRegistry::load(&self.config.workspace_root).await?;
        let enabled: Vec<&SourceConfig> = registry.enabled().collect();
        info!(sources = enabled.len(), "sync run started");

        let mut sources = Vec::with_capacity(enabled.len());
        for source in &enabled {
            let ctx = AdapterContext {
                run_id,
                fetched_at: Utc::now(),
            };
            let report = self.sync_source(source, &ctx).await;
            if let Some(err) = &report.error {
                error!(source_id = %source.source_id, error = %err, "source skipped");
            }
            sources.push(report);
        }

        let finished_at = Utc::now();
        let mut summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at,
            enabled_sources: enabled.len(),
            new_carnivals: sources.iter().map(|s| s.new_carnivals).sum(),
            updated_carnivals: sources.iter().map(|s| s.updated_carnivals).sum(),
            skipped_past: sources.iter().map(|s| s.skipped_past).sum(),
            failed_records: sources.iter().map(|s| s.failed_records).sum(),
            sources,
            reports_dir: String::new(),
        };
        let reports_dir = self.write_reports(&summary).await?;
        summary.reports_dir = reports_dir.display().to_string();
        info!(
            new_carnivals = summary.new_carnivals,
            updated_carnivals = summary.updated_carnivals,
            "sync run finished"
        );
        Ok(summary)
    }

    async fn sync_source(&self, source: &SourceConfig, ctx: &AdapterContext) -> SourceRunReport {
        let mut report = SourceRunReport::new(source);
        let Some(adapter) = adapter_for_source(&source.source_id) else {
            return report.failed(format!("no adapter registered for {}", source.source_id));
        };
        let pages = match self.pages_for(source, adapter.as_ref(), ctx).await {
            Ok(pages) => pages,
            Err(err) => return report.failed(format!("{err:#}")),
        };
        report.pages = pages.len();

        let mut records: Vec<ExternalCarnival> = Vec::new();
        for page in &pages {
            self.archive_page(&source.source_id, page).await;
            match adapter.parse_listing(page) {
                Ok(parsed) => records.extend(parsed),
                Err(err) => return report.failed(err),
            }
        }
        report.parsed_records = records.len();

        let synced = sync_external_records(self.store.as_ref(), records, ctx.fetched_at).await;
        report.new_carnivals = synced.new_carnivals;
        report.updated_carnivals = synced.updated_carnivals;
        report.skipped_past = synced.skipped_past;
        report.failed_records = synced.failed;
        report
    }

    async fn pages_for(
        &self,
        source: &SourceConfig,
        adapter: &dyn SourceAdapter,
        ctx: &AdapterContext,
    ) -> Result<Vec<ListingPage>> {
        match source.mode {
            SourceMode::Fixture => {
                let bundle = load_fixture_bundle(source.fixture_bundle_path(&self.config.workspace_root))?;
                Ok(vec![bundle.to_listing_page()])
            }
            SourceMode::Live => adapter
                .fetch_listing(&self.http, ctx, &source.listing_urls)
                .await
                .with_context(|| format!("fetching {} listings", source.source_id)),
        }
    }

    /// Archive failures are logged; they never block the sync itself.
    async fn archive_page(&self, source_id: &str, page: &ListingPage) {
        let ext = if page.is_json() { "json" } else { "html" };
        match self.archive.store(page.fetched_at, source_id, ext, &page.body).await {
            Ok(snapshot) => info!(
                path = %snapshot.relative_path.display(),
                deduplicated = snapshot.deduplicated,
                "archived listing page"
            ),
            Err(err) => warn!(error = %format!("{err:#}"), "could not archive listing page"),
        }
    }

    async fn write_reports(&self, summary: &SyncRunSummary) -> Result<PathBuf> {
        let reports_dir = self
            .config
            .workspace_root
            .join("reports")
            .join(summary.run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let json = serde_json::to_vec_pretty(summary).context("serializing sync summary")?;
        fs::write(reports_dir.join("sync_summary.json"), json)
            .await
            .context("writing sync_summary.json")?;
        fs::write(reports_dir.join("daily_brief.md"), daily_brief(summary))
            .await
            .context("writing daily_brief.md")?;
        Ok(reports_dir)
    }
}

fn daily_brief(summary: &SyncRunSummary) -> String {
    let mut lines = vec![
        "# Carnival Sync Brief".to_string(),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Started: {}", summary.started_at),
        format!("- Finished: {}", summary.finished_at),
        format!("- New carnivals: {}", summary.new_carnivals),
        format!("- Updated carnivals: {}", summary.updated_carnivals),
        format!("- Skipped (already held): {}", summary.skipped_past),
        format!("- Failed records: {}", summary.failed_records),
        String::new(),
        "## Sources".to_string(),
    ];
    for source in &summary.sources {
        let status = match &source.error {
            None => format!("{} new, {} updated", source.new_carnivals, source.updated_carnivals),
            Some(err) => format!("skipped ({err})"),
        };
        lines.push(format!("- {}: {}", source.display_name, status));
    }
    lines.push(String::new());
    lines.join("\n")
}
