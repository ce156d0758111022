use chrono::NaiveDate;

use crate::error::CarnivalError;
use crate::model::Carnival;
use crate::rules::validate_identity;
use crate::store::CarnivalTx;

/// Finds the unclaimed carnival a candidate should merge into, locking it for
/// the rest of `tx`.
///
/// Titles compare with exact string equality against both `title` and
/// `external_title`. Ties go to the earliest-created record.
pub async fn find_match(
    tx: &mut dyn CarnivalTx,
    title: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<Option<Carnival>, CarnivalError> {
    let (title, date) = validate_identity(title, date)?;
    Ok(tx.lock_unclaimed_match(title, date).await?)
}
