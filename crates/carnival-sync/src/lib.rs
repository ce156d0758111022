//! External-source sync: configuration, source registry, fill-empty upserts,
//! the per-run pipeline and its cron scheduler.

pub mod config;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod upsert;

pub use config::SyncConfig;
pub use pipeline::{SourceRunReport, SyncPipeline, SyncRunSummary};
pub use registry::{SourceConfig, SourceMode, SourceRegistry};
pub use scheduler::build_scheduler;
pub use upsert::{sync_external_records, upsert_external_record, SyncReport, UpsertOutcome};

pub const CRATE_NAME: &str = "carnival-sync";
