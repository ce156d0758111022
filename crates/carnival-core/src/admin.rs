//! Admin-only consolidation of two carnival records that describe the same
//! event.

use serde::Serialize;
use tracing::info;

use crate::error::CarnivalError;
use crate::fields::DescriptiveField;
use crate::model::{ActingUser, Carnival, CarnivalId};
use crate::rules::merge_with_precedence;
use crate::service::CarnivalService;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub target: Carnival,
    pub archived: Carnival,
    pub fields_filled: Vec<&'static str>,
}

impl CarnivalService {
    /// Folds `source_id` into `target_id` and archives the source.
    ///
    /// The target's values win; the source only fills gaps. Both rows are
    /// locked in id order so two opposing merges cannot deadlock.
    pub async fn merge_carnivals(
        &self,
        source_id: CarnivalId,
        target_id: CarnivalId,
        admin: &ActingUser,
    ) -> Result<MergeReport, CarnivalError> {
        if !admin.is_admin {
            return Err(CarnivalError::Forbidden(
                "Only administrators can merge carnivals.".into(),
            ));
        }
        if source_id == target_id {
            return Err(CarnivalError::InvalidMerge(
                "A carnival cannot be merged into itself.".into(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let (first, second) = if source_id < target_id {
            (source_id, target_id)
        } else {
            (target_id, source_id)
        };
        let first_row = tx.lock_by_id(first).await?.ok_or(CarnivalError::NotFound(first))?;
        let second_row = tx.lock_by_id(second).await?.ok_or(CarnivalError::NotFound(second))?;
        let (mut source, mut target) = if first == source_id {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };
        if !source.is_active {
            return Err(CarnivalError::InvalidMerge(format!(
                "Carnival {source_id} is already archived."
            )));
        }
        if !target.is_active || target.is_disabled {
            return Err(CarnivalError::InvalidMerge(format!(
                "Carnival {target_id} is archived or disabled."
            )));
        }

        let mut filled: Vec<&'static str> = merge_with_precedence(&mut target.details, &source.details)
            .into_iter()
            .map(DescriptiveField::column)
            .collect();
        if target.external_id.is_none() && source.external_id.is_some() {
            target.external_id = source.external_id.clone();
            filled.push("external_id");
        }
        if target.external_title.is_none() && source.external_title.is_some() {
            target.external_title = source.external_title.clone();
            filled.push("external_title");
        }
        if source.last_external_sync > target.last_external_sync {
            target.last_external_sync = source.last_external_sync;
        }
        target.is_manually_entered |= source.is_manually_entered;
        if !target.is_owned() && source.is_owned() {
            target.created_by_user_id = source.created_by_user_id;
            target.club_id = source.club_id;
            target.claimed_at = source.claimed_at;
            filled.push("created_by_user_id");
        }

        source.is_active = false;
        let target = tx.save(&target).await?;
        let archived = tx.save(&source).await?;
        tx.commit().await?;
        info!(
            source_id,
            target_id,
            admin_id = admin.id,
            fields_filled = filled.len(),
            "merged carnivals"
        );

        Ok(MergeReport {
            target,
            archived,
            fields_filled: filled,
        })
    }
}
