use chrono::Utc;
use tracing::info;

use crate::error::CarnivalError;
use crate::model::{ActingUser, CarnivalId, ClaimOutcome};
use crate::notify::CarnivalEvent;
use crate::rules::{check_claim, check_release, ClaimRefusal};
use crate::service::CarnivalService;

impl CarnivalService {
    /// Gives an unclaimed imported carnival to `user` and their club.
    ///
    /// Precondition failures come back as `success: false`; only store
    /// failures are errors.
    pub async fn take_ownership(
        &self,
        carnival_id: CarnivalId,
        user: &ActingUser,
    ) -> Result<ClaimOutcome, CarnivalError> {
        let mut tx = self.store.begin().await?;
        let Some(mut carnival) = tx.lock_by_id(carnival_id).await? else {
            return Ok(refuse(carnival_id, user, ClaimRefusal::NotFound));
        };
        let club_id = match check_claim(&carnival, user) {
            Ok(club_id) => club_id,
            Err(refusal) => return Ok(refuse(carnival_id, user, refusal)),
        };

        carnival.assign_owner(user.id, Some(club_id), Utc::now());
        let saved = tx.save(&carnival).await?;
        tx.commit().await?;
        info!(carnival_id, user_id = user.id, club_id, "carnival claimed");

        let message = format!("You now manage \"{}\".", saved.title);
        self.announce(CarnivalEvent::Claimed {
            carnival: saved,
            actor: user.clone(),
        })
        .await;
        Ok(ClaimOutcome::ok(message))
    }

    /// Returns a claimed carnival to the unclaimed pool. `is_manually_entered`
    /// stays as it was.
    pub async fn release_ownership(
        &self,
        carnival_id: CarnivalId,
        user: &ActingUser,
    ) -> Result<ClaimOutcome, CarnivalError> {
        let mut tx = self.store.begin().await?;
        let Some(mut carnival) = tx.lock_by_id(carnival_id).await? else {
            return Ok(refuse(carnival_id, user, ClaimRefusal::NotFound));
        };
        if let Err(refusal) = check_release(&carnival, user) {
            return Ok(refuse(carnival_id, user, refusal));
        }

        let previous_owner = carnival.created_by_user_id;
        carnival.clear_owner();
        let saved = tx.save(&carnival).await?;
        tx.commit().await?;
        info!(carnival_id, user_id = user.id, ?previous_owner, "carnival released");

        let message = format!("\"{}\" has been released.", saved.title);
        self.announce(CarnivalEvent::Released {
            carnival: saved,
            actor: user.clone(),
        })
        .await;
        Ok(ClaimOutcome::ok(message))
    }
}

fn refuse(carnival_id: CarnivalId, user: &ActingUser, refusal: ClaimRefusal) -> ClaimOutcome {
    info!(carnival_id, user_id = user.id, reason = ?refusal, "ownership change refused");
    ClaimOutcome::refused(refusal.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::CarnivalDetails;
    use crate::service::testing::{member, seed_external, service, RecordingNotifier};
    use crate::store::{CarnivalStore, MemoryCarnivalStore};

    fn in_state(state: &str) -> CarnivalDetails {
        CarnivalDetails {
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn nsw_carnival_refuses_qld_club() {
        let store = MemoryCarnivalStore::new();
        let svc = service(&store, Arc::default());
        let row = seed_external(&store, "Sydney Masters Cup", "2025-08-15", in_state("NSW")).await;

        let outcome = svc.take_ownership(row.id, &member(1, 10, "QLD")).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.message.contains("NSW"));
        let stored = store.find_carnival(row.id).await.unwrap().unwrap();
        assert_eq!(stored.created_by_user_id, None);
        assert_eq!(stored.claimed_at, None);
    }

    #[tokio::test]
    async fn stateless_carnival_can_be_claimed_from_any_state() {
        let store = MemoryCarnivalStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let svc = service(&store, notifier.clone());
        let row = seed_external(&store, "Outback Masters", "2025-09-20", Default::default()).await;

        let outcome = svc.take_ownership(row.id, &member(1, 10, "QLD")).await.unwrap();

        assert!(outcome.success, "{}", outcome.message);
        let stored = store.find_carnival(row.id).await.unwrap().unwrap();
        assert_eq!(stored.created_by_user_id, Some(1));
        assert_eq!(stored.club_id, Some(10));
        assert!(stored.claimed_at.is_some());
        assert!(!stored.is_manually_entered);
        assert_eq!(*notifier.kinds.lock().unwrap(), vec!["claimed"]);
    }

    #[tokio::test]
    async fn second_claim_is_refused() {
        let store = MemoryCarnivalStore::new();
        let svc = service(&store, Arc::default());
        let row = seed_external(&store, "Sydney Masters Cup", "2025-08-15", in_state("nsw ")).await;

        assert!(svc.take_ownership(row.id, &member(1, 10, "NSW")).await.unwrap().success);
        let again = svc.take_ownership(row.id, &member(2, 20, "NSW")).await.unwrap();
        assert!(!again.success);
        assert_eq!(again.message, ClaimRefusal::AlreadyClaimed.to_string());
    }

    #[tokio::test]
    async fn missing_carnival_is_a_refusal_not_an_error() {
        let store = MemoryCarnivalStore::new();
        let svc = service(&store, Arc::default());
        let outcome = svc.take_ownership(404, &member(1, 10, "NSW")).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::refused(ClaimRefusal::NotFound.to_string()));
    }

    #[tokio::test]
    async fn release_by_owner_or_admin_only() {
        let store = MemoryCarnivalStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let svc = service(&store, notifier.clone());
        let row = seed_external(&store, "Sydney Masters Cup", "2025-08-15", in_state("NSW")).await;
        svc.take_ownership(row.id, &member(1, 10, "NSW")).await.unwrap();

        let stranger = svc.release_ownership(row.id, &member(2, 20, "NSW")).await.unwrap();
        assert!(!stranger.success);

        let mut admin = member(3, 30, "VIC");
        admin.is_admin = true;
        let released = svc.release_ownership(row.id, &admin).await.unwrap();
        assert!(released.success);

        let stored = store.find_carnival(row.id).await.unwrap().unwrap();
        assert_eq!(stored.created_by_user_id, None);
        assert_eq!(stored.club_id, None);
        assert_eq!(stored.claimed_at, None);
        assert_eq!(*notifier.kinds.lock().unwrap(), vec!["claimed", "released"]);

        let twice = svc.release_ownership(row.id, &admin).await.unwrap();
        assert_eq!(twice.message, ClaimRefusal::NotClaimed.to_string());
    }

    #[tokio::test]
    async fn failed_notification_keeps_the_claim() {
        let store = MemoryCarnivalStore::new();
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let svc = service(&store, notifier);
        let row = seed_external(&store, "Sydney Masters Cup", "2025-08-15", in_state("NSW")).await;

        let outcome = svc.take_ownership(row.id, &member(1, 10, "NSW")).await.unwrap();

        assert!(outcome.success);
        let stored = store.find_carnival(row.id).await.unwrap().unwrap();
        assert_eq!(stored.created_by_user_id, Some(1));
    }
}
