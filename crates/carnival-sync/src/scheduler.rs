use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::pipeline::SyncPipeline;

/// Builds (but does not start) the cron job that runs the pipeline. `None`
/// when the scheduler is disabled.
pub async fn build_scheduler(pipeline: Arc<SyncPipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config().scheduler_enabled {
        return Ok(None);
    }
    let cron = pipeline.config().sync_cron.clone();

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron.as_str(), move |_id, _sched| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            match pipeline.run_once().await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    new_carnivals = summary.new_carnivals,
                    "scheduled sync finished"
                ),
                Err(err) => error!(error = %format!("{err:#}"), "scheduled sync failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use carnival_core::MemoryCarnivalStore;

    #[tokio::test]
    async fn disabled_scheduler_builds_nothing() {
        let config = SyncConfig::from_lookup(|_| None);
        let pipeline = SyncPipeline::new(config, Arc::new(MemoryCarnivalStore::new())).unwrap();
        assert!(build_scheduler(Arc::new(pipeline)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bad_cron_is_an_error() {
        let config = SyncConfig::from_lookup(|key| match key {
            "CARNIVAL_SCHEDULER_ENABLED" => Some("1".into()),
            "SYNC_CRON" => Some("every evening".into()),
            _ => None,
        });
        let pipeline = SyncPipeline::new(config, Arc::new(MemoryCarnivalStore::new())).unwrap();
        assert!(build_scheduler(Arc::new(pipeline)).await.is_err());
    }
}
