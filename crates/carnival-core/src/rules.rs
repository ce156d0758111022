//! Pure decision rules behind matching, merging, syncing and claiming.
//!
//! Nothing here touches a store; the services in this crate load rows inside a
//! transaction, apply these rules, and write the result back.

use std::fmt;

use chrono::NaiveDate;
use strsim::jaro_winkler;

use crate::error::CarnivalError;
use crate::fields::{DescriptiveField, FieldValue, MergeCategory};
use crate::model::{ActingUser, Carnival, CarnivalDetails, CarnivalId, ClubId};

/// Titles on the same date scoring at least this are reported as possible
/// duplicates. They are never merged automatically.
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.92;

/// Checks that both identity fields are present. Title must be non-blank but
/// is otherwise used exactly as given.
pub fn validate_identity(
    title: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<(&str, NaiveDate), CarnivalError> {
    let title = title.filter(|t| !t.trim().is_empty());
    match (title, date) {
        (Some(title), Some(date)) => Ok((title, date)),
        (title, date) => {
            let mut missing = Vec::new();
            if title.is_none() {
                missing.push("title");
            }
            if date.is_none() {
                missing.push("date");
            }
            Err(CarnivalError::MissingIdentityFields { missing })
        }
    }
}

/// What the resolver does with a candidate once the matcher has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Create,
    MergeInto(CarnivalId),
    Conflict(CarnivalId),
}

pub fn resolve(matched: Option<&Carnival>, actor_club: Option<ClubId>) -> Resolution {
    let Some(existing) = matched else {
        return Resolution::Create;
    };
    if !existing.is_manually_entered {
        return Resolution::MergeInto(existing.id);
    }
    match (existing.club_id, actor_club) {
        (Some(theirs), Some(ours)) if theirs == ours => Resolution::Conflict(existing.id),
        _ => Resolution::Create,
    }
}

/// Applies every non-empty submitted field over `target`. Returns the fields
/// whose stored value changed.
pub fn overlay_submission(
    target: &mut CarnivalDetails,
    submitted: &CarnivalDetails,
) -> Vec<DescriptiveField> {
    let mut changed = Vec::new();
    for field in DescriptiveField::ALL {
        let Some(value) = submitted.get(field) else {
            continue;
        };
        if target.get(field).as_ref() != Some(&value) {
            target.set(field, Some(value));
            changed.push(field);
        }
    }
    changed
}

/// Copies syncable external values into fields that are empty on `target`.
/// Non-empty stored values are never touched.
pub fn fill_empty_syncable(
    target: &mut CarnivalDetails,
    incoming: &CarnivalDetails,
) -> Vec<DescriptiveField> {
    let mut filled = Vec::new();
    for field in DescriptiveField::syncable() {
        if !target.is_empty(field) {
            continue;
        }
        if let Some(value) = incoming.get(field) {
            target.set(field, Some(value));
            filled.push(field);
        }
    }
    filled
}

/// Admin merge of two descriptive field sets with `target` taking precedence.
///
/// Text, date and numeric fields are filled from `source` only when empty on
/// `target`. Boolean fields combine with logical OR.
pub fn merge_with_precedence(
    target: &mut CarnivalDetails,
    source: &CarnivalDetails,
) -> Vec<DescriptiveField> {
    let mut changed = Vec::new();
    for field in DescriptiveField::ALL {
        let theirs = source.get(field);
        let next = match (field.category(), target.get(field), theirs) {
            (_, None, Some(value)) => Some(value),
            (
                MergeCategory::Boolean,
                Some(FieldValue::Boolean(false)),
                Some(FieldValue::Boolean(true)),
            ) => Some(FieldValue::Boolean(true)),
            _ => None,
        };
        if let Some(value) = next {
            target.set(field, Some(value));
            changed.push(field);
        }
    }
    changed
}

/// Why a claim or release was turned down. `Display` is the user-facing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRefusal {
    NotFound,
    Inactive,
    NotExternal,
    AlreadyClaimed,
    NoClub,
    StateMismatch {
        carnival_state: String,
        club_state: Option<String>,
    },
    NotClaimed,
    NotPermitted,
}

impl fmt::Display for ClaimRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimRefusal::NotFound => write!(f, "Carnival not found."),
            ClaimRefusal::Inactive => {
                write!(f, "This carnival is not active and cannot be claimed.")
            }
            ClaimRefusal::NotExternal => {
                write!(f, "Only carnivals imported from MySideline can be claimed.")
            }
            ClaimRefusal::AlreadyClaimed => write!(f, "This carnival has already been claimed."),
            ClaimRefusal::NoClub => write!(
                f,
                "You must be associated with a club to claim a carnival."
            ),
            ClaimRefusal::StateMismatch {
                carnival_state,
                club_state,
            } => match club_state {
                Some(club_state) => write!(
                    f,
                    "This carnival is in {carnival_state}; your club is in {club_state}. \
                     You can only claim carnivals in your club's state."
                ),
                None => write!(
                    f,
                    "This carnival is in {carnival_state} and your club has no state set."
                ),
            },
            ClaimRefusal::NotClaimed => write!(f, "This carnival is not currently claimed."),
            ClaimRefusal::NotPermitted => write!(
                f,
                "Only the carnival owner or an administrator can release ownership."
            ),
        }
    }
}

fn same_state(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Preconditions for `take_ownership`, checked in a fixed order. Returns the
/// club the carnival will belong to.
pub fn check_claim(carnival: &Carnival, user: &ActingUser) -> Result<ClubId, ClaimRefusal> {
    if !carnival.is_active {
        return Err(ClaimRefusal::Inactive);
    }
    if !carnival.has_external_marker() {
        return Err(ClaimRefusal::NotExternal);
    }
    if carnival.is_owned() {
        return Err(ClaimRefusal::AlreadyClaimed);
    }
    let Some(club_id) = user.club_id else {
        return Err(ClaimRefusal::NoClub);
    };
    let carnival_state = carnival
        .details
        .state
        .as_deref()
        .filter(|s| !s.trim().is_empty());
    if let Some(carnival_state) = carnival_state {
        let matches = user
            .club_state
            .as_deref()
            .is_some_and(|club_state| same_state(club_state, carnival_state));
        if !matches {
            return Err(ClaimRefusal::StateMismatch {
                carnival_state: carnival_state.to_string(),
                club_state: user.club_state.clone(),
            });
        }
    }
    Ok(club_id)
}

pub fn check_release(carnival: &Carnival, user: &ActingUser) -> Result<(), ClaimRefusal> {
    if !carnival.is_owned() {
        return Err(ClaimRefusal::NotClaimed);
    }
    if !user.is_admin && !carnival.is_owned_by(user.id) {
        return Err(ClaimRefusal::NotPermitted);
    }
    Ok(())
}

fn normalize_title(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Same-date carnivals whose title is close to, but not exactly, `title`.
pub fn near_duplicates(title: &str, same_date: &[Carnival]) -> Vec<(CarnivalId, f64)> {
    let wanted = normalize_title(title);
    same_date
        .iter()
        .filter(|c| c.title != title && c.external_title.as_deref() != Some(title))
        .filter_map(|c| {
            let score = std::iter::once(c.title.as_str())
                .chain(c.external_title.as_deref())
                .map(|t| jaro_winkler(&wanted, &normalize_title(t)))
                .fold(0.0_f64, f64::max);
            (score >= NEAR_DUPLICATE_THRESHOLD).then_some((c.id, score))
        })
        .collect()
}
