//! Fill-empty-only ingestion of external carnival records.

use carnival_core::rules::{fill_empty_syncable, validate_identity};
use carnival_core::{
    Carnival, CarnivalError, CarnivalId, CarnivalStore, DescriptiveField, ExternalCarnival,
    NewCarnival,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(Carnival),
    /// `filled` lists the descriptive fields that were empty and now hold the
    /// external value.
    Updated {
        carnival: Carnival,
        filled: Vec<DescriptiveField>,
    },
    /// The stored carnival has already happened and is left untouched.
    SkippedPast(CarnivalId),
}

/// Creates or refreshes the carnival keyed by the exact stored `title` and
/// `date`. Concurrent runs for the same key queue on the identity lock, so
/// only one of them inserts.
///
/// A stored value is never overwritten: syncable descriptive fields,
/// `external_id` and `external_title` are copied only into empty slots.
/// `last_external_sync` is always refreshed unless the carnival is in the
/// past.
pub async fn upsert_external_record(
    store: &dyn CarnivalStore,
    record: ExternalCarnival,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome, CarnivalError> {
    validate_identity(Some(&record.title), Some(record.date))?;

    let mut tx = store.begin().await?;
    tx.lock_identity(&record.title, record.date).await?;
    let Some(mut existing) = tx.lock_by_title_and_date(&record.title, record.date).await? else {
        let created = tx.insert(NewCarnival::external(record, now)).await?;
        tx.commit().await?;
        debug!(carnival_id = created.id, "created carnival from external record");
        return Ok(UpsertOutcome::Created(created));
    };

    if existing.date < now.date_naive() {
        return Ok(UpsertOutcome::SkippedPast(existing.id));
    }

    let filled = fill_empty_syncable(&mut existing.details, &record.details);
    if existing.external_id.is_none() {
        existing.external_id = record.external_id;
    }
    if existing.external_title.is_none() {
        existing.external_title = Some(record.title);
    }
    existing.last_external_sync = Some(now);

    let carnival = tx.save(&existing).await?;
    tx.commit().await?;
    Ok(UpsertOutcome::Updated { carnival, filled })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Created and updated carnivals, in input order.
    pub records: Vec<Carnival>,
    pub new_carnivals: usize,
    pub updated_carnivals: usize,
    pub skipped_past: usize,
    pub failed: usize,
}

/// Upserts every record on its own transaction. A failing record is logged
/// and counted; the rest still apply.
pub async fn sync_external_records(
    store: &dyn CarnivalStore,
    records: Vec<ExternalCarnival>,
    now: DateTime<Utc>,
) -> SyncReport {
    let mut report = SyncReport::default();
    for record in records {
        let title = record.title.clone();
        match upsert_external_record(store, record, now).await {
            Ok(UpsertOutcome::Created(carnival)) => {
                report.new_carnivals += 1;
                report.records.push(carnival);
            }
            Ok(UpsertOutcome::Updated { carnival, .. }) => {
                report.updated_carnivals += 1;
                report.records.push(carnival);
            }
            Ok(UpsertOutcome::SkippedPast(_)) => report.skipped_past += 1,
            Err(err) => {
                warn!(title = %title, error = %err, "external record not synced");
                report.failed += 1;
            }
        }
    }
    report
}
