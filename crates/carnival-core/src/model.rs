//! Carnival records and the values that flow into and out of the resolver.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type CarnivalId = i64;
pub type UserId = i64;
pub type ClubId = i64;

/// Descriptive carnival fields. None of these take part in identity matching;
/// how each one merges is declared in [`crate::fields::DescriptiveField`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CarnivalDetails {
    pub state: Option<String>,
    pub location_address: Option<String>,
    pub location_suburb: Option<String>,
    pub location_postcode: Option<String>,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub organiser_contact_name: Option<String>,
    pub organiser_contact_email: Option<String>,
    pub organiser_contact_phone: Option<String>,
    pub schedule_details: Option<String>,
    pub registration_link: Option<String>,
    pub registration_deadline: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub fee_first_team: Option<f64>,
    pub fee_subsequent_team: Option<f64>,
    pub is_registration_open: Option<bool>,
    pub social_facebook_url: Option<String>,
    pub social_instagram_url: Option<String>,
    pub social_website_url: Option<String>,
    pub club_logo_url: Option<String>,
    pub promotional_image_url: Option<String>,
    pub draw_file_url: Option<String>,
    pub additional_info: Option<String>,
}

/// A persisted carnival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Carnival {
    pub id: CarnivalId,
    pub title: String,
    pub external_title: Option<String>,
    pub date: NaiveDate,
    pub external_id: Option<String>,
    pub created_by_user_id: Option<UserId>,
    pub club_id: Option<ClubId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub is_manually_entered: bool,
    pub is_active: bool,
    pub is_disabled: bool,
    pub last_external_sync: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: CarnivalDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Carnival {
    pub fn from_new(id: CarnivalId, new: NewCarnival, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: new.title,
            external_title: new.external_title,
            date: new.date,
            external_id: new.external_id,
            created_by_user_id: new.created_by_user_id,
            club_id: new.club_id,
            claimed_at: new.claimed_at,
            is_manually_entered: new.is_manually_entered,
            is_active: new.is_active,
            is_disabled: new.is_disabled,
            last_external_sync: new.last_external_sync,
            details: new.details,
            created_at: now,
            updated_at: now,
        }
    }

    /// Imported from MySideline at some point, whether or not a club has
    /// since taken it over.
    pub fn has_external_marker(&self) -> bool {
        self.external_id.is_some() || self.last_external_sync.is_some()
    }

    pub fn is_owned(&self) -> bool {
        self.created_by_user_id.is_some()
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.created_by_user_id == Some(user_id)
    }

    /// Assigns the owning user and club together.
    pub fn assign_owner(&mut self, user_id: UserId, club_id: Option<ClubId>, at: DateTime<Utc>) {
        self.created_by_user_id = Some(user_id);
        self.club_id = club_id;
        self.claimed_at = Some(at);
    }

    pub fn clear_owner(&mut self) {
        self.created_by_user_id = None;
        self.club_id = None;
        self.claimed_at = None;
    }
}

/// Insert payload; the store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCarnival {
    pub title: String,
    pub external_title: Option<String>,
    pub date: NaiveDate,
    pub external_id: Option<String>,
    pub created_by_user_id: Option<UserId>,
    pub club_id: Option<ClubId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub is_manually_entered: bool,
    pub is_active: bool,
    pub is_disabled: bool,
    pub last_external_sync: Option<DateTime<Utc>>,
    pub details: CarnivalDetails,
}

impl NewCarnival {
    pub fn manual(
        title: String,
        date: NaiveDate,
        details: CarnivalDetails,
        owner: &ActingUser,
    ) -> Self {
        Self {
            title,
            external_title: None,
            date,
            external_id: None,
            created_by_user_id: owner.club_id.map(|_| owner.id),
            club_id: owner.club_id,
            claimed_at: None,
            is_manually_entered: true,
            is_active: true,
            is_disabled: false,
            last_external_sync: None,
            details,
        }
    }

    pub fn external(record: ExternalCarnival, synced_at: DateTime<Utc>) -> Self {
        Self {
            external_title: Some(record.title.clone()),
            title: record.title,
            date: record.date,
            external_id: record.external_id,
            created_by_user_id: None,
            club_id: None,
            claimed_at: None,
            is_manually_entered: false,
            is_active: true,
            is_disabled: false,
            last_external_sync: Some(synced_at),
            details: record.details,
        }
    }
}

/// A user-submitted carnival form. Title and date are optional here so a
/// missing identity field surfaces as a typed error rather than a parse
/// failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarnivalSubmission {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub details: CarnivalDetails,
}

/// One event as listed by the external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCarnival {
    #[serde(default)]
    pub external_id: Option<String>,
    pub title: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub details: CarnivalDetails,
}

/// The authenticated user behind a request, with club facts looked up by the
/// caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActingUser {
    pub id: UserId,
    pub email: Option<String>,
    pub club_id: Option<ClubId>,
    pub club_state: Option<String>,
    pub is_admin: bool,
}

/// Result of a claim or release, shaped for flash-message display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub success: bool,
    pub message: String,
}

impl ClaimOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
