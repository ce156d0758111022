use std::sync::Arc;

use anyhow::{Context, Result};
use carnival_core::{CarnivalNotifier, CarnivalService, NoopNotifier, SiteConfig};
use carnival_notify::{EmailConfig, EmailNotifier};
use carnival_storage::PgCarnivalStore;
use carnival_sync::{build_scheduler, SyncConfig, SyncPipeline};
use carnival_web::{AppState, ServerConfig};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "carnival")]
#[command(about = "Masters carnival directory command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync pass over every enabled source.
    Sync,
    /// Apply pending database migrations.
    Migrate,
    /// Serve the JSON API (and the sync scheduler when enabled).
    Serve,
    /// Run only the sync scheduler until interrupted.
    Schedule,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "carnival=info,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn connect(config: &SyncConfig) -> Result<Arc<PgCarnivalStore>> {
    let store = PgCarnivalStore::connect(&config.database_url)
        .await
        .context("connecting to DATABASE_URL")?;
    Ok(Arc::new(store))
}

fn notifier(site: &SiteConfig) -> Result<Arc<dyn CarnivalNotifier>> {
    match EmailConfig::from_env() {
        Some(config) => Ok(Arc::new(
            EmailNotifier::new(config, site.clone()).context("building SMTP notifier")?,
        )),
        None => {
            info!("SMTP_HOST unset; notifications disabled");
            Ok(Arc::new(NoopNotifier))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let sync_config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let store = connect(&sync_config).await?;
            let summary = SyncPipeline::new(sync_config, store)?.run_once().await?;
            println!(
                "sync complete: run_id={} sources={} new={} updated={} reports={}",
                summary.run_id,
                summary.enabled_sources,
                summary.new_carnivals,
                summary.updated_carnivals,
                summary.reports_dir
            );
        }
        Commands::Migrate => {
            let store = connect(&sync_config).await?;
            store.migrate().await.context("applying migrations")?;
            info!("migrations applied");
        }
        Commands::Serve => {
            let site = SiteConfig::from_env();
            let store = connect(&sync_config).await?;
            let service = CarnivalService::new(store.clone(), notifier(&site)?);
            let pipeline = Arc::new(SyncPipeline::new(sync_config, store)?);

            let scheduler = build_scheduler(Arc::clone(&pipeline)).await?;
            if let Some(sched) = &scheduler {
                sched.start().await.context("starting scheduler")?;
                info!(cron = %pipeline.config().sync_cron, "sync scheduler started");
            }

            let state = AppState::new(service, site).with_pipeline(pipeline);
            carnival_web::serve(ServerConfig::from_env(), state).await?;

            if let Some(mut sched) = scheduler {
                sched.shutdown().await.context("stopping scheduler")?;
            }
        }
        Commands::Schedule => {
            let store = connect(&sync_config).await?;
            let pipeline = Arc::new(SyncPipeline::new(sync_config, store)?);
            let Some(mut sched) = build_scheduler(Arc::clone(&pipeline)).await? else {
                warn!("CARNIVAL_SCHEDULER_ENABLED is not set; nothing to schedule");
                return Ok(());
            };
            sched.start().await.context("starting scheduler")?;
            info!(cron = %pipeline.config().sync_cron, "sync scheduler started");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
    }

    Ok(())
}
