//! Persistence seam for carnival records.
//!
//! Every mutating operation opens a [`CarnivalTx`], locks the rows it reads
//! (`lock_*` methods), and commits once. Dropping a transaction without
//! committing discards its writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::model::{ActingUser, Carnival, CarnivalId, ClubId, NewCarnival, UserId};

#[async_trait]
pub trait CarnivalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CarnivalTx>, StoreError>;

    async fn find_carnival(&self, id: CarnivalId) -> Result<Option<Carnival>, StoreError>;

    /// Active, non-disabled carnivals ordered by date.
    async fn list_visible(&self) -> Result<Vec<Carnival>, StoreError>;

    async fn find_acting_user(&self, user_id: UserId) -> Result<Option<ActingUser>, StoreError>;
}

#[async_trait]
pub trait CarnivalTx: Send {
    /// Serialises every writer of the (`title`, `date`) identity for the rest
    /// of the transaction, including writers that will insert a new row.
    async fn lock_identity(&mut self, title: &str, date: NaiveDate) -> Result<(), StoreError>;

    /// Unclaimed carnival on `date` whose title or external title equals
    /// `title` exactly. Imported records come before manual ones, then
    /// earliest-created.
    async fn lock_unclaimed_match(
        &mut self,
        title: &str,
        date: NaiveDate,
    ) -> Result<Option<Carnival>, StoreError>;

    /// Earliest-created carnival whose stored title equals `title` on `date`.
    async fn lock_by_title_and_date(
        &mut self,
        title: &str,
        date: NaiveDate,
    ) -> Result<Option<Carnival>, StoreError>;

    /// Active carnival on `date` owned by `club_id` whose title or external
    /// title equals `title`, claimed or not.
    async fn lock_club_duplicate(
        &mut self,
        title: &str,
        date: NaiveDate,
        club_id: ClubId,
    ) -> Result<Option<Carnival>, StoreError>;

    async fn lock_by_id(&mut self, id: CarnivalId) -> Result<Option<Carnival>, StoreError>;

    /// Unlocked read of every carnival on `date`.
    async fn carnivals_on(&mut self, date: NaiveDate) -> Result<Vec<Carnival>, StoreError>;

    async fn insert(&mut self, carnival: NewCarnival) -> Result<Carnival, StoreError>;

    /// Writes every column of `carnival` and bumps `updated_at`.
    async fn save(&mut self, carnival: &Carnival) -> Result<Carnival, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

fn creation_order(a: &Carnival, b: &Carnival) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

fn import_first(a: &Carnival, b: &Carnival) -> std::cmp::Ordering {
    a.is_manually_entered
        .cmp(&b.is_manually_entered)
        .then_with(|| creation_order(a, b))
}

fn same_identity(c: &Carnival, title: &str, date: NaiveDate) -> bool {
    c.date == date && (c.title == title || c.external_title.as_deref() == Some(title))
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    carnivals: BTreeMap<CarnivalId, Carnival>,
    users: HashMap<UserId, ActingUser>,
    next_id: CarnivalId,
}

/// Process-local store. One transaction at a time holds the state lock, which
/// gives the same serialisation a row lock would.
#[derive(Debug, Clone, Default)]
pub struct MemoryCarnivalStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCarnivalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: ActingUser) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn all_carnivals(&self) -> Vec<Carnival> {
        self.state.lock().await.carnivals.values().cloned().collect()
    }
}

#[async_trait]
impl CarnivalStore for MemoryCarnivalStore {
    async fn begin(&self) -> Result<Box<dyn CarnivalTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn find_carnival(&self, id: CarnivalId) -> Result<Option<Carnival>, StoreError> {
        Ok(self.state.lock().await.carnivals.get(&id).cloned())
    }

    async fn list_visible(&self) -> Result<Vec<Carnival>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .carnivals
            .values()
            .filter(|c| c.is_active && !c.is_disabled)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| creation_order(a, b)));
        Ok(rows)
    }

    async fn find_acting_user(&self, user_id: UserId) -> Result<Option<ActingUser>, StoreError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl MemoryTx {
    fn first_where(&self, pred: impl Fn(&Carnival) -> bool) -> Option<Carnival> {
        self.first_by(pred, creation_order)
    }

    fn first_by(
        &self,
        pred: impl Fn(&Carnival) -> bool,
        order: fn(&Carnival, &Carnival) -> std::cmp::Ordering,
    ) -> Option<Carnival> {
        self.staged
            .carnivals
            .values()
            .filter(|c| pred(c))
            .min_by(|a, b| order(a, b))
            .cloned()
    }
}

#[async_trait]
impl CarnivalTx for MemoryTx {
    /// The whole store is already held by this transaction.
    async fn lock_identity(&mut self, _title: &str, _date: NaiveDate) -> Result<(), StoreError> {
        Ok(())
    }

    async fn lock_unclaimed_match(
        &mut self,
        title: &str,
        date: NaiveDate,
    ) -> Result<Option<Carnival>, StoreError> {
        Ok(self.first_by(
            |c| c.claimed_at.is_none() && same_identity(c, title, date),
            import_first,
        ))
    }

    async fn lock_by_title_and_date(
        &mut self,
        title: &str,
        date: NaiveDate,
    ) -> Result<Option<Carnival>, StoreError> {
        Ok(self.first_where(|c| c.date == date && c.title == title))
    }

    async fn lock_club_duplicate(
        &mut self,
        title: &str,
        date: NaiveDate,
        club_id: ClubId,
    ) -> Result<Option<Carnival>, StoreError> {
        Ok(self.first_where(|c| {
            c.is_active && c.club_id == Some(club_id) && same_identity(c, title, date)
        }))
    }

    async fn lock_by_id(&mut self, id: CarnivalId) -> Result<Option<Carnival>, StoreError> {
        Ok(self.staged.carnivals.get(&id).cloned())
    }

    async fn carnivals_on(&mut self, date: NaiveDate) -> Result<Vec<Carnival>, StoreError> {
        Ok(self
            .staged
            .carnivals
            .values()
            .filter(|c| c.date == date)
            .cloned()
            .collect())
    }

    async fn insert(&mut self, carnival: NewCarnival) -> Result<Carnival, StoreError> {
        self.staged.next_id += 1;
        let row = Carnival::from_new(self.staged.next_id, carnival, Utc::now());
        self.staged.carnivals.insert(row.id, row.clone());
        Ok(row)
    }

    async fn save(&mut self, carnival: &Carnival) -> Result<Carnival, StoreError> {
        let slot = self
            .staged
            .carnivals
            .get_mut(&carnival.id)
            .ok_or(StoreError::Vanished(carnival.id))?;
        *slot = carnival.clone();
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CarnivalDetails, ExternalCarnival};

    fn external(title: &str) -> NewCarnival {
        NewCarnival::external(
            ExternalCarnival {
                external_id: None,
                title: title.to_string(),
                date: NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
                details: CarnivalDetails::default(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = MemoryCarnivalStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(external("Dropped")).await.unwrap();
        }
        assert!(store.all_carnivals().await.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.insert(external("Kept")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.all_carnivals().await.len(), 1);
    }

    #[tokio::test]
    async fn unclaimed_match_picks_earliest_created() {
        let store = MemoryCarnivalStore::new();
        let mut tx = store.begin().await.unwrap();
        let first = tx.insert(external("Cup")).await.unwrap();
        let second = tx.insert(external("Cup")).await.unwrap();
        tx.commit().await.unwrap();
        assert!(first.id < second.id);

        let mut tx = store.begin().await.unwrap();
        let hit = tx
            .lock_unclaimed_match("Cup", first.date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, first.id);
    }

    #[tokio::test]
    async fn unclaimed_match_prefers_import_over_older_manual() {
        let store = MemoryCarnivalStore::new();
        let owner = ActingUser {
            id: 2,
            email: None,
            club_id: Some(20),
            club_state: None,
            is_admin: false,
        };
        let mut tx = store.begin().await.unwrap();
        let manual = tx
            .insert(NewCarnival::manual(
                "Cup".into(),
                NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
                CarnivalDetails::default(),
                &owner,
            ))
            .await
            .unwrap();
        let import = tx.insert(external("Cup")).await.unwrap();
        tx.commit().await.unwrap();
        assert!(manual.created_at <= import.created_at);

        let mut tx = store.begin().await.unwrap();
        let hit = tx
            .lock_unclaimed_match("Cup", import.date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, import.id);
    }

    #[tokio::test]
    async fn club_duplicate_sees_claimed_rows_only_for_that_club() {
        let store = MemoryCarnivalStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut row = tx.insert(external("Cup")).await.unwrap();
        row.assign_owner(1, Some(10), Utc::now());
        tx.save(&row).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let hit = tx.lock_club_duplicate("Cup", row.date, 10).await.unwrap();
        assert_eq!(hit.map(|c| c.id), Some(row.id));
        assert!(tx.lock_club_duplicate("Cup", row.date, 20).await.unwrap().is_none());
        assert!(tx.lock_unclaimed_match("Cup", row.date).await.unwrap().is_none());
    }
}
