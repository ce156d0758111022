//! Create-or-merge for user-submitted carnivals.

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::error::{CarnivalError, StoreError};
use crate::matcher::find_match;
use crate::model::{ActingUser, Carnival, CarnivalSubmission, NewCarnival};
use crate::notify::CarnivalEvent;
use crate::rules::{near_duplicates, overlay_submission, resolve, validate_identity, Resolution};
use crate::service::CarnivalService;
use crate::store::CarnivalTx;

impl CarnivalService {
    /// Creates a carnival from `submission`, or merges it into the unclaimed
    /// imported record it matches.
    ///
    /// Members need a club. An admin without one may submit too; the record
    /// is then left unowned.
    ///
    /// Matching, the decision and the write share one transaction that first
    /// locks the title and date, so two concurrent submissions for the same
    /// event queue behind each other even when no row exists yet.
    /// `force_create` skips matching entirely.
    pub async fn create_or_merge(
        &self,
        submission: CarnivalSubmission,
        actor: &ActingUser,
        force_create: bool,
    ) -> Result<Carnival, CarnivalError> {
        let (title, date) = validate_identity(submission.title.as_deref(), submission.date)?;
        let title = title.to_string();
        if actor.club_id.is_none() && !actor.is_admin {
            return Err(CarnivalError::NoClub);
        }

        let mut tx = self.store.begin().await?;
        tx.lock_identity(&title, date).await?;
        let matched = if force_create {
            None
        } else {
            if let Some(club_id) = actor.club_id {
                if let Some(existing) = tx.lock_club_duplicate(&title, date, club_id).await? {
                    info!(existing_id = existing.id, user_id = actor.id, %date, "rejected duplicate club carnival");
                    return Err(CarnivalError::DuplicateConflict {
                        existing_id: existing.id,
                    });
                }
            }
            find_match(&mut *tx, Some(&title), Some(date)).await?
        };

        let (carnival, event) = match resolve(matched.as_ref(), actor.club_id) {
            Resolution::Conflict(existing_id) => {
                info!(existing_id, user_id = actor.id, %date, "rejected duplicate manual carnival");
                return Err(CarnivalError::DuplicateConflict { existing_id });
            }
            Resolution::Create => {
                if !force_create {
                    log_near_duplicates(&mut *tx, &title, date).await;
                }
                let created = tx
                    .insert(NewCarnival::manual(title, date, submission.details, actor))
                    .await?;
                info!(carnival_id = created.id, user_id = actor.id, force_create, "created carnival");
                (created, None)
            }
            Resolution::MergeInto(id) => {
                let mut record = matched
                    .filter(|m| m.id == id)
                    .ok_or(StoreError::Vanished(id))?;
                record.title = title;
                record.date = date;
                let changed = overlay_submission(&mut record.details, &submission.details);
                record.is_manually_entered = true;
                if actor.club_id.is_some() {
                    record.assign_owner(actor.id, actor.club_id, Utc::now());
                }
                let saved = tx.save(&record).await?;
                info!(
                    carnival_id = saved.id,
                    user_id = actor.id,
                    fields_changed = changed.len(),
                    "merged submission into imported carnival"
                );
                let event = CarnivalEvent::Merged {
                    carnival: saved.clone(),
                    actor: actor.clone(),
                };
                (saved, Some(event))
            }
        };

        tx.commit().await?;
        if let Some(event) = event {
            self.announce(event).await;
        }
        Ok(carnival)
    }
}

/// Exact matching misses titles that differ only in spacing or spelling.
/// Those are logged so an admin can merge them by hand.
async fn log_near_duplicates(tx: &mut dyn CarnivalTx, title: &str, date: NaiveDate) {
    match tx.carnivals_on(date).await {
        Ok(same_day) => {
            for (carnival_id, score) in near_duplicates(title, &same_day) {
                warn!(carnival_id, score, title, %date, "possible duplicate carnival title");
            }
        }
        Err(err) => warn!(error = %err, "near-duplicate scan skipped"),
    }
}
