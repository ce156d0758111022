//! Postgres-backed [`CarnivalStore`].
//!
//! Descriptive columns are read and written by walking
//! [`DescriptiveField::ALL`], so the registry and the `carnivals` table stay in
//! one-to-one correspondence.

use async_trait::async_trait;
use carnival_core::{
    ActingUser, Carnival, CarnivalDetails, CarnivalId, CarnivalStore, CarnivalTx, ClubId,
    DescriptiveField, FieldValue, MergeCategory, NewCarnival, StoreError, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

/// Transaction-scoped advisory lock on a (title, date) identity. Row locks
/// cannot cover a row that does not exist yet.
const IDENTITY_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock(hashtext($1::text || '|' || $2::date::text))";

const CREATION_ORDER: &str = "created_at ASC, id ASC";
const IMPORT_FIRST_ORDER: &str = "is_manually_entered ASC, created_at ASC, id ASC";

const IDENTITY_COLUMNS: [&str; 11] = [
    "title",
    "external_title",
    "date",
    "external_id",
    "created_by_user_id",
    "club_id",
    "claimed_at",
    "is_manually_entered",
    "is_active",
    "is_disabled",
    "last_external_sync",
];

/// Columns written on insert and update, in bind order.
fn writable_columns() -> Vec<&'static str> {
    IDENTITY_COLUMNS
        .into_iter()
        .chain(DescriptiveField::ALL.into_iter().map(DescriptiveField::column))
        .collect()
}

fn select_columns() -> String {
    let mut columns = vec!["id"];
    columns.extend(writable_columns());
    columns.extend(["created_at", "updated_at"]);
    columns.join(", ")
}

fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::backend(err)
}

fn carnival_from_row(row: &PgRow) -> Result<Carnival, sqlx::Error> {
    let mut details = CarnivalDetails::default();
    for field in DescriptiveField::ALL {
        let column = field.column();
        let value = match field.category() {
            MergeCategory::Text => row.try_get::<Option<String>, _>(column)?.map(FieldValue::Text),
            MergeCategory::Date => row.try_get::<Option<NaiveDate>, _>(column)?.map(FieldValue::Date),
            MergeCategory::Numeric => row.try_get::<Option<f64>, _>(column)?.map(FieldValue::Numeric),
            MergeCategory::Boolean => row.try_get::<Option<bool>, _>(column)?.map(FieldValue::Boolean),
        };
        details.set(field, value);
    }
    Ok(Carnival {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        external_title: row.try_get("external_title")?,
        date: row.try_get("date")?,
        external_id: row.try_get("external_id")?,
        created_by_user_id: row.try_get("created_by_user_id")?,
        club_id: row.try_get("club_id")?,
        claimed_at: row.try_get("claimed_at")?,
        is_manually_entered: row.try_get("is_manually_entered")?,
        is_active: row.try_get("is_active")?,
        is_disabled: row.try_get("is_disabled")?,
        last_external_sync: row.try_get("last_external_sync")?,
        details,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Borrowed view over the writable columns of either a new or stored record.
struct WritableRow<'a> {
    title: &'a str,
    external_title: Option<&'a str>,
    date: NaiveDate,
    external_id: Option<&'a str>,
    created_by_user_id: Option<UserId>,
    club_id: Option<i64>,
    claimed_at: Option<DateTime<Utc>>,
    is_manually_entered: bool,
    is_active: bool,
    is_disabled: bool,
    last_external_sync: Option<DateTime<Utc>>,
    details: &'a CarnivalDetails,
}

impl<'a> From<&'a NewCarnival> for WritableRow<'a> {
    fn from(c: &'a NewCarnival) -> Self {
        Self {
            title: &c.title,
            external_title: c.external_title.as_deref(),
            date: c.date,
            external_id: c.external_id.as_deref(),
            created_by_user_id: c.created_by_user_id,
            club_id: c.club_id,
            claimed_at: c.claimed_at,
            is_manually_entered: c.is_manually_entered,
            is_active: c.is_active,
            is_disabled: c.is_disabled,
            last_external_sync: c.last_external_sync,
            details: &c.details,
        }
    }
}

impl<'a> From<&'a Carnival> for WritableRow<'a> {
    fn from(c: &'a Carnival) -> Self {
        Self {
            title: &c.title,
            external_title: c.external_title.as_deref(),
            date: c.date,
            external_id: c.external_id.as_deref(),
            created_by_user_id: c.created_by_user_id,
            club_id: c.club_id,
            claimed_at: c.claimed_at,
            is_manually_entered: c.is_manually_entered,
            is_active: c.is_active,
            is_disabled: c.is_disabled,
            last_external_sync: c.last_external_sync,
            details: &c.details,
        }
    }
}

impl<'a> WritableRow<'a> {
    fn bind(self, query: Query<'a, Postgres, PgArguments>) -> Query<'a, Postgres, PgArguments> {
        let mut query = query
            .bind(self.title)
            .bind(self.external_title)
            .bind(self.date)
            .bind(self.external_id)
            .bind(self.created_by_user_id)
            .bind(self.club_id)
            .bind(self.claimed_at)
            .bind(self.is_manually_entered)
            .bind(self.is_active)
            .bind(self.is_disabled)
            .bind(self.last_external_sync);
        for field in DescriptiveField::ALL {
            let value = self.details.get(field);
            query = match field.category() {
                MergeCategory::Text => query.bind(value.and_then(|v| match v {
                    FieldValue::Text(s) => Some(s),
                    _ => None,
                })),
                MergeCategory::Date => query.bind(value.and_then(|v| match v {
                    FieldValue::Date(d) => Some(d),
                    _ => None,
                })),
                MergeCategory::Numeric => query.bind(value.and_then(|v| match v {
                    FieldValue::Numeric(n) => Some(n),
                    _ => None,
                })),
                MergeCategory::Boolean => query.bind(value.and_then(|v| match v {
                    FieldValue::Boolean(b) => Some(b),
                    _ => None,
                })),
            };
        }
        query
    }
}

#[derive(Debug, Clone)]
pub struct PgCarnivalStore {
    pool: PgPool,
}

impl PgCarnivalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl CarnivalStore for PgCarnivalStore {
    async fn begin(&self) -> Result<Box<dyn CarnivalTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgCarnivalTx { tx }))
    }

    async fn find_carnival(&self, id: CarnivalId) -> Result<Option<Carnival>, StoreError> {
        let sql = format!("SELECT {} FROM carnivals WHERE id = $1", select_columns());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(carnival_from_row).transpose().map_err(db_err)
    }

    async fn list_visible(&self) -> Result<Vec<Carnival>, StoreError> {
        let sql = format!(
            "SELECT {} FROM carnivals \
             WHERE is_active AND NOT is_disabled \
             ORDER BY date ASC, created_at ASC, id ASC",
            select_columns()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(carnival_from_row).collect::<Result<_, _>>().map_err(db_err)
    }

    async fn find_acting_user(&self, user_id: UserId) -> Result<Option<ActingUser>, StoreError> {
        let row = sqlx::query(
            "SELECT u.id, u.email, u.is_admin, u.club_id, c.state AS club_state \
             FROM users u LEFT JOIN clubs c ON c.id = u.club_id \
             WHERE u.id = $1 AND u.is_active",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let user = ActingUser {
            id: row.try_get("id").map_err(db_err)?,
            email: row.try_get("email").map_err(db_err)?,
            club_id: row.try_get("club_id").map_err(db_err)?,
            club_state: row.try_get("club_state").map_err(db_err)?,
            is_admin: row.try_get("is_admin").map_err(db_err)?,
        };
        Ok(Some(user))
    }
}

pub struct PgCarnivalTx {
    tx: Transaction<'static, Postgres>,
}

impl PgCarnivalTx {
    /// `$1` is the title and `$2` the date; `club_id`, when given, binds `$3`.
    async fn fetch_one_locked(
        &mut self,
        filter: &str,
        order: &str,
        title: &str,
        date: NaiveDate,
        club_id: Option<ClubId>,
    ) -> Result<Option<Carnival>, StoreError> {
        let sql = format!(
            "SELECT {} FROM carnivals WHERE {filter} \
             ORDER BY {order} LIMIT 1 FOR UPDATE",
            select_columns()
        );
        let mut query = sqlx::query(&sql).bind(title).bind(date);
        if let Some(club_id) = club_id {
            query = query.bind(club_id);
        }
        let row = query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(carnival_from_row).transpose().map_err(db_err)
    }
}

#[async_trait]
impl CarnivalTx for PgCarnivalTx {
    async fn lock_identity(&mut self, title: &str, date: NaiveDate) -> Result<(), StoreError> {
        sqlx::query(IDENTITY_LOCK_SQL)
            .bind(title)
            .bind(date)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn lock_unclaimed_match(
        &mut self,
        title: &str,
        date: NaiveDate,
    ) -> Result<Option<Carnival>, StoreError> {
        self.fetch_one_locked(
            "date = $2 AND (title = $1 OR external_title = $1) AND claimed_at IS NULL",
            IMPORT_FIRST_ORDER,
            title,
            date,
            None,
        )
        .await
    }

    async fn lock_by_title_and_date(
        &mut self,
        title: &str,
        date: NaiveDate,
    ) -> Result<Option<Carnival>, StoreError> {
        self.fetch_one_locked("date = $2 AND title = $1", CREATION_ORDER, title, date, None)
            .await
    }

    async fn lock_club_duplicate(
        &mut self,
        title: &str,
        date: NaiveDate,
        club_id: ClubId,
    ) -> Result<Option<Carnival>, StoreError> {
        self.fetch_one_locked(
            "date = $2 AND (title = $1 OR external_title = $1) AND club_id = $3 AND is_active",
            CREATION_ORDER,
            title,
            date,
            Some(club_id),
        )
        .await
    }

    async fn lock_by_id(&mut self, id: CarnivalId) -> Result<Option<Carnival>, StoreError> {
        let sql = format!("SELECT {} FROM carnivals WHERE id = $1 FOR UPDATE", select_columns());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(carnival_from_row).transpose().map_err(db_err)
    }

    async fn carnivals_on(&mut self, date: NaiveDate) -> Result<Vec<Carnival>, StoreError> {
        let sql = format!(
            "SELECT {} FROM carnivals WHERE date = $1 ORDER BY created_at ASC, id ASC",
            select_columns()
        );
        let rows = sqlx::query(&sql)
            .bind(date)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        rows.iter().map(carnival_from_row).collect::<Result<_, _>>().map_err(db_err)
    }

    async fn insert(&mut self, carnival: NewCarnival) -> Result<Carnival, StoreError> {
        let columns = writable_columns();
        let sql = format!(
            "INSERT INTO carnivals ({}) VALUES ({}) RETURNING {}",
            columns.join(", "),
            placeholders(1, columns.len()),
            select_columns()
        );
        let row = WritableRow::from(&carnival)
            .bind(sqlx::query(&sql))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
        let created = carnival_from_row(&row).map_err(db_err)?;
        debug!(carnival_id = created.id, "inserted carnival");
        Ok(created)
    }

    async fn save(&mut self, carnival: &Carnival) -> Result<Carnival, StoreError> {
        let columns = writable_columns();
        let sql = format!(
            "UPDATE carnivals SET ({}) = ({}), updated_at = NOW() \
             WHERE id = ${} RETURNING {}",
            columns.join(", "),
            placeholders(1, columns.len()),
            columns.len() + 1,
            select_columns()
        );
        let row = WritableRow::from(carnival)
            .bind(sqlx::query(&sql))
            .bind(carnival.id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::Vanished(carnival.id))?;
        carnival_from_row(&row).map_err(db_err)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_columns_cover_identity_and_registry() {
        let columns = writable_columns();
        assert_eq!(columns.len(), IDENTITY_COLUMNS.len() + DescriptiveField::ALL.len());
        assert_eq!(columns[0], "title");
        assert!(columns.contains(&"organiser_contact_email"));
        assert!(!columns.contains(&"id"));
    }

    #[test]
    fn identity_lock_is_transaction_scoped_and_keyed_on_title_and_date() {
        assert!(IDENTITY_LOCK_SQL.contains("pg_advisory_xact_lock"));
        assert!(IDENTITY_LOCK_SQL.contains("$1::text") && IDENTITY_LOCK_SQL.contains("$2::date"));
        assert!(IMPORT_FIRST_ORDER.starts_with("is_manually_entered ASC"));
    }

    #[test]
    fn placeholders_are_numbered_from_offset() {
        assert_eq!(placeholders(1, 3), "$1, $2, $3");
        assert_eq!(placeholders(4, 2), "$4, $5");
    }

    #[test]
    fn select_list_starts_with_id_and_ends_with_timestamps() {
        let select = select_columns();
        assert!(select.starts_with("id, title, "));
        assert!(select.ends_with("created_at, updated_at"));
    }
}
