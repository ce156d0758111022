//! Static registry of mergeable carnival fields.
//!
//! Every descriptive column is listed once in [`DescriptiveField::ALL`] with its
//! [`MergeCategory`] and whether the external sync may fill it. Merge rules in
//! [`crate::rules`] iterate this list instead of inspecting the schema.

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::CarnivalDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeCategory {
    Text,
    Date,
    Numeric,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptiveField {
    State,
    LocationAddress,
    LocationSuburb,
    LocationPostcode,
    LocationLatitude,
    LocationLongitude,
    OrganiserContactName,
    OrganiserContactEmail,
    OrganiserContactPhone,
    ScheduleDetails,
    RegistrationLink,
    RegistrationDeadline,
    EndDate,
    FeeFirstTeam,
    FeeSubsequentTeam,
    IsRegistrationOpen,
    SocialFacebookUrl,
    SocialInstagramUrl,
    SocialWebsiteUrl,
    ClubLogoUrl,
    PromotionalImageUrl,
    DrawFileUrl,
    AdditionalInfo,
}

/// A non-empty field value. Blank text is never represented.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Numeric(f64),
    Boolean(bool),
}

impl FieldValue {
    fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    fn into_date(self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(v) => Some(v),
            _ => None,
        }
    }

    fn into_numeric(self) -> Option<f64> {
        match self {
            FieldValue::Numeric(v) => Some(v),
            _ => None,
        }
    }

    fn into_boolean(self) -> Option<bool> {
        match self {
            FieldValue::Boolean(v) => Some(v),
            _ => None,
        }
    }
}

impl DescriptiveField {
    pub const ALL: [DescriptiveField; 23] = [
        DescriptiveField::State,
        DescriptiveField::LocationAddress,
        DescriptiveField::LocationSuburb,
        DescriptiveField::LocationPostcode,
        DescriptiveField::LocationLatitude,
        DescriptiveField::LocationLongitude,
        DescriptiveField::OrganiserContactName,
        DescriptiveField::OrganiserContactEmail,
        DescriptiveField::OrganiserContactPhone,
        DescriptiveField::ScheduleDetails,
        DescriptiveField::RegistrationLink,
        DescriptiveField::RegistrationDeadline,
        DescriptiveField::EndDate,
        DescriptiveField::FeeFirstTeam,
        DescriptiveField::FeeSubsequentTeam,
        DescriptiveField::IsRegistrationOpen,
        DescriptiveField::SocialFacebookUrl,
        DescriptiveField::SocialInstagramUrl,
        DescriptiveField::SocialWebsiteUrl,
        DescriptiveField::ClubLogoUrl,
        DescriptiveField::PromotionalImageUrl,
        DescriptiveField::DrawFileUrl,
        DescriptiveField::AdditionalInfo,
    ];

    /// Column name in the `carnivals` table.
    pub fn column(self) -> &'static str {
        use DescriptiveField as F;
        match self {
            F::State => "state",
            F::LocationAddress => "location_address",
            F::LocationSuburb => "location_suburb",
            F::LocationPostcode => "location_postcode",
            F::LocationLatitude => "location_latitude",
            F::LocationLongitude => "location_longitude",
            F::OrganiserContactName => "organiser_contact_name",
            F::OrganiserContactEmail => "organiser_contact_email",
            F::OrganiserContactPhone => "organiser_contact_phone",
            F::ScheduleDetails => "schedule_details",
            F::RegistrationLink => "registration_link",
            F::RegistrationDeadline => "registration_deadline",
            F::EndDate => "end_date",
            F::FeeFirstTeam => "fee_first_team",
            F::FeeSubsequentTeam => "fee_subsequent_team",
            F::IsRegistrationOpen => "is_registration_open",
            F::SocialFacebookUrl => "social_facebook_url",
            F::SocialInstagramUrl => "social_instagram_url",
            F::SocialWebsiteUrl => "social_website_url",
            F::ClubLogoUrl => "club_logo_url",
            F::PromotionalImageUrl => "promotional_image_url",
            F::DrawFileUrl => "draw_file_url",
            F::AdditionalInfo => "additional_info",
        }
    }

    pub fn category(self) -> MergeCategory {
        use DescriptiveField as F;
        match self {
            F::RegistrationDeadline | F::EndDate => MergeCategory::Date,
            F::LocationLatitude | F::LocationLongitude | F::FeeFirstTeam | F::FeeSubsequentTeam => {
                MergeCategory::Numeric
            }
            F::IsRegistrationOpen => MergeCategory::Boolean,
            _ => MergeCategory::Text,
        }
    }

    /// Fields the MySideline sync may fill when they are empty locally.
    pub fn is_syncable(self) -> bool {
        use DescriptiveField as F;
        matches!(
            self,
            F::State
                | F::LocationAddress
                | F::OrganiserContactName
                | F::OrganiserContactEmail
                | F::OrganiserContactPhone
                | F::ScheduleDetails
                | F::RegistrationLink
                | F::SocialFacebookUrl
                | F::SocialInstagramUrl
                | F::SocialWebsiteUrl
        )
    }

    pub fn syncable() -> impl Iterator<Item = DescriptiveField> {
        Self::ALL.into_iter().filter(|f| f.is_syncable())
    }
}

fn text(value: &Option<String>) -> Option<FieldValue> {
    value
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| FieldValue::Text(s.clone()))
}

impl CarnivalDetails {
    /// Current value of `field`, or `None` when it is empty.
    pub fn get(&self, field: DescriptiveField) -> Option<FieldValue> {
        use DescriptiveField as F;
        match field {
            F::State => text(&self.state),
            F::LocationAddress => text(&self.location_address),
            F::LocationSuburb => text(&self.location_suburb),
            F::LocationPostcode => text(&self.location_postcode),
            F::LocationLatitude => self.location_latitude.map(FieldValue::Numeric),
            F::LocationLongitude => self.location_longitude.map(FieldValue::Numeric),
            F::OrganiserContactName => text(&self.organiser_contact_name),
            F::OrganiserContactEmail => text(&self.organiser_contact_email),
            F::OrganiserContactPhone => text(&self.organiser_contact_phone),
            F::ScheduleDetails => text(&self.schedule_details),
            F::RegistrationLink => text(&self.registration_link),
            F::RegistrationDeadline => self.registration_deadline.map(FieldValue::Date),
            F::EndDate => self.end_date.map(FieldValue::Date),
            F::FeeFirstTeam => self.fee_first_team.map(FieldValue::Numeric),
            F::FeeSubsequentTeam => self.fee_subsequent_team.map(FieldValue::Numeric),
            F::IsRegistrationOpen => self.is_registration_open.map(FieldValue::Boolean),
            F::SocialFacebookUrl => text(&self.social_facebook_url),
            F::SocialInstagramUrl => text(&self.social_instagram_url),
            F::SocialWebsiteUrl => text(&self.social_website_url),
            F::ClubLogoUrl => text(&self.club_logo_url),
            F::PromotionalImageUrl => text(&self.promotional_image_url),
            F::DrawFileUrl => text(&self.draw_file_url),
            F::AdditionalInfo => text(&self.additional_info),
        }
    }

    /// Overwrites `field`. A value of the wrong category clears the field.
    pub fn set(&mut self, field: DescriptiveField, value: Option<FieldValue>) {
        use DescriptiveField as F;
        match field {
            F::State => self.state = value.and_then(FieldValue::into_text),
            F::LocationAddress => self.location_address = value.and_then(FieldValue::into_text),
            F::LocationSuburb => self.location_suburb = value.and_then(FieldValue::into_text),
            F::LocationPostcode => self.location_postcode = value.and_then(FieldValue::into_text),
            F::LocationLatitude => {
                self.location_latitude = value.and_then(FieldValue::into_numeric)
            }
            F::LocationLongitude => {
                self.location_longitude = value.and_then(FieldValue::into_numeric)
            }
            F::OrganiserContactName => {
                self.organiser_contact_name = value.and_then(FieldValue::into_text)
            }
            F::OrganiserContactEmail => {
                self.organiser_contact_email = value.and_then(FieldValue::into_text)
            }
            F::OrganiserContactPhone => {
                self.organiser_contact_phone = value.and_then(FieldValue::into_text)
            }
            F::ScheduleDetails => self.schedule_details = value.and_then(FieldValue::into_text),
            F::RegistrationLink => self.registration_link = value.and_then(FieldValue::into_text),
            F::RegistrationDeadline => {
                self.registration_deadline = value.and_then(FieldValue::into_date)
            }
            F::EndDate => self.end_date = value.and_then(FieldValue::into_date),
            F::FeeFirstTeam => self.fee_first_team = value.and_then(FieldValue::into_numeric),
            F::FeeSubsequentTeam => {
                self.fee_subsequent_team = value.and_then(FieldValue::into_numeric)
            }
            F::IsRegistrationOpen => {
                self.is_registration_open = value.and_then(FieldValue::into_boolean)
            }
            F::SocialFacebookUrl => {
                self.social_facebook_url = value.and_then(FieldValue::into_text)
            }
            F::SocialInstagramUrl => {
                self.social_instagram_url = value.and_then(FieldValue::into_text)
            }
            F::SocialWebsiteUrl => self.social_website_url = value.and_then(FieldValue::into_text),
            F::ClubLogoUrl => self.club_logo_url = value.and_then(FieldValue::into_text),
            F::PromotionalImageUrl => {
                self.promotional_image_url = value.and_then(FieldValue::into_text)
            }
            F::DrawFileUrl => self.draw_file_url = value.and_then(FieldValue::into_text),
            F::AdditionalInfo => self.additional_info = value.and_then(FieldValue::into_text),
        }
    }

    pub fn is_empty(&self, field: DescriptiveField) -> bool {
        self.get(field).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_lists_each_field_once() {
        let unique: HashSet<_> = DescriptiveField::ALL.iter().collect();
        assert_eq!(unique.len(), DescriptiveField::ALL.len());
        let columns: HashSet<_> = DescriptiveField::ALL.iter().map(|f| f.column()).collect();
        assert_eq!(columns.len(), DescriptiveField::ALL.len());
    }

    #[test]
    fn every_field_round_trips_through_get_and_set() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        for field in DescriptiveField::ALL {
            let value = match field.category() {
                MergeCategory::Text => FieldValue::Text(format!("{}-value", field.column())),
                MergeCategory::Date => FieldValue::Date(date),
                MergeCategory::Numeric => FieldValue::Numeric(42.5),
                MergeCategory::Boolean => FieldValue::Boolean(true),
            };
            let mut details = CarnivalDetails::default();
            assert!(details.is_empty(field), "{field:?} should start empty");
            details.set(field, Some(value.clone()));
            assert_eq!(details.get(field), Some(value), "{field:?}");
        }
    }

    #[test]
    fn blank_text_reads_as_empty() {
        let details = CarnivalDetails {
            organiser_contact_email: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(details.is_empty(DescriptiveField::OrganiserContactEmail));
    }

    #[test]
    fn sync_whitelist_covers_contact_schedule_and_state() {
        let syncable: Vec<_> = DescriptiveField::syncable().collect();
        assert!(syncable.contains(&DescriptiveField::State));
        assert!(syncable.contains(&DescriptiveField::OrganiserContactEmail));
        assert!(syncable.contains(&DescriptiveField::ScheduleDetails));
        assert!(!syncable.contains(&DescriptiveField::FeeFirstTeam));
        assert!(!syncable.contains(&DescriptiveField::ClubLogoUrl));
    }
}
