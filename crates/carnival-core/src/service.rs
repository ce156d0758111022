use std::sync::Arc;

use tracing::warn;

use crate::notify::{CarnivalEvent, CarnivalNotifier, NoopNotifier};
use crate::store::CarnivalStore;

/// Entry point for every user- and admin-driven carnival mutation.
///
/// Methods live next to the rule they orchestrate: `resolver.rs`
/// (`create_or_merge`), `ownership.rs` (claim/release), `admin.rs` (merge).
#[derive(Clone)]
pub struct CarnivalService {
    pub(crate) store: Arc<dyn CarnivalStore>,
    notifier: Arc<dyn CarnivalNotifier>,
}

impl CarnivalService {
    pub fn new(store: Arc<dyn CarnivalStore>, notifier: Arc<dyn CarnivalNotifier>) -> Self {
        Self { store, notifier }
    }

    pub fn without_notifications(store: Arc<dyn CarnivalStore>) -> Self {
        Self::new(store, Arc::new(NoopNotifier))
    }

    pub fn store(&self) -> &Arc<dyn CarnivalStore> {
        &self.store
    }

    /// Runs after commit. A failure here never undoes the mutation.
    pub(crate) async fn announce(&self, event: CarnivalEvent) {
        if let Err(err) = self.notifier.notify(&event).await {
            warn!(
                kind = event.kind(),
                carnival_id = event.carnival().id,
                error = %err,
                "carnival notification failed"
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::error::StoreError;
    use crate::model::{
        ActingUser, Carnival, CarnivalDetails, CarnivalId, ClubId, ExternalCarnival, NewCarnival,
        UserId,
    };
    use crate::notify::NotifyResult;
    use crate::store::{CarnivalTx, MemoryCarnivalStore};

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub kinds: Mutex<Vec<&'static str>>,
        pub fail: bool,
    }

    #[async_trait]
    impl CarnivalNotifier for RecordingNotifier {
        async fn notify(&self, event: &CarnivalEvent) -> NotifyResult {
            self.kinds.lock().unwrap().push(event.kind());
            if self.fail {
                return Err("smtp relay unreachable".into());
            }
            Ok(())
        }
    }

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub fn member(id: i64, club_id: i64, state: &str) -> ActingUser {
        ActingUser {
            id,
            email: Some(format!("user{id}@example.com")),
            club_id: Some(club_id),
            club_state: Some(state.to_string()),
            is_admin: false,
        }
    }

    pub fn admin(id: i64) -> ActingUser {
        ActingUser {
            id,
            email: Some(format!("admin{id}@example.com")),
            club_id: None,
            club_state: None,
            is_admin: true,
        }
    }

    pub fn service(
        store: &MemoryCarnivalStore,
        notifier: Arc<RecordingNotifier>,
    ) -> CarnivalService {
        CarnivalService::new(Arc::new(store.clone()), notifier)
    }

    pub async fn seed_external(
        store: &MemoryCarnivalStore,
        title: &str,
        on: &str,
        details: CarnivalDetails,
    ) -> Carnival {
        let mut tx = store.begin().await.unwrap();
        let row = tx
            .insert(NewCarnival::external(
                ExternalCarnival {
                    external_id: Some(format!("ms-{title}")),
                    title: title.to_string(),
                    date: date(on),
                    details,
                },
                Utc::now(),
            ))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        row
    }

    /// Memory store that logs the identity locks and match lookups each
    /// transaction makes, in order.
    #[derive(Clone, Default)]
    pub struct LockLogStore {
        pub inner: MemoryCarnivalStore,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    struct LockLogTx {
        inner: Box<dyn CarnivalTx>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CarnivalStore for LockLogStore {
        async fn begin(&self) -> Result<Box<dyn CarnivalTx>, StoreError> {
            Ok(Box::new(LockLogTx {
                inner: self.inner.begin().await?,
                log: Arc::clone(&self.log),
            }))
        }

        async fn find_carnival(&self, id: CarnivalId) -> Result<Option<Carnival>, StoreError> {
            self.inner.find_carnival(id).await
        }

        async fn list_visible(&self) -> Result<Vec<Carnival>, StoreError> {
            self.inner.list_visible().await
        }

        async fn find_acting_user(&self, user_id: UserId) -> Result<Option<ActingUser>, StoreError> {
            self.inner.find_acting_user(user_id).await
        }
    }

    #[async_trait]
    impl CarnivalTx for LockLogTx {
        async fn lock_identity(&mut self, title: &str, date: NaiveDate) -> Result<(), StoreError> {
            self.log.lock().unwrap().push(format!("identity {title} {date}"));
            self.inner.lock_identity(title, date).await
        }

        async fn lock_unclaimed_match(
            &mut self,
            title: &str,
            date: NaiveDate,
        ) -> Result<Option<Carnival>, StoreError> {
            self.log.lock().unwrap().push("unclaimed match".into());
            self.inner.lock_unclaimed_match(title, date).await
        }

        async fn lock_by_title_and_date(
            &mut self,
            title: &str,
            date: NaiveDate,
        ) -> Result<Option<Carnival>, StoreError> {
            self.log.lock().unwrap().push("title and date".into());
            self.inner.lock_by_title_and_date(title, date).await
        }

        async fn lock_club_duplicate(
            &mut self,
            title: &str,
            date: NaiveDate,
            club_id: ClubId,
        ) -> Result<Option<Carnival>, StoreError> {
            self.log.lock().unwrap().push(format!("club duplicate {club_id}"));
            self.inner.lock_club_duplicate(title, date, club_id).await
        }

        async fn lock_by_id(&mut self, id: CarnivalId) -> Result<Option<Carnival>, StoreError> {
            self.inner.lock_by_id(id).await
        }

        async fn carnivals_on(&mut self, date: NaiveDate) -> Result<Vec<Carnival>, StoreError> {
            self.inner.carnivals_on(date).await
        }

        async fn insert(&mut self, carnival: NewCarnival) -> Result<Carnival, StoreError> {
            self.inner.insert(carnival).await
        }

        async fn save(&mut self, carnival: &Carnival) -> Result<Carnival, StoreError> {
            self.inner.save(carnival).await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.commit().await
        }
    }
}
