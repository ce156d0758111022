//! MySideline event listings, from the JSON search API or the public HTML
//! event cards.

use async_trait::async_trait;
use carnival_core::{CarnivalDetails, ExternalCarnival};
use carnival_storage::HttpFetcher;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::{AdapterContext, AdapterError, ListingPage, SourceAdapter};

pub const SOURCE_ID: &str = "mysideline";

#[derive(Debug, Clone, Copy, Default)]
pub struct MySidelineAdapter;

#[async_trait]
impl SourceAdapter for MySidelineAdapter {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    async fn fetch_listing(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        listing_urls: &[String],
    ) -> Result<Vec<ListingPage>, AdapterError> {
        let mut pages = Vec::with_capacity(listing_urls.len());
        for url in listing_urls {
            let fetched = http.get(ctx.run_id, SOURCE_ID, url).await?;
            pages.push(ListingPage {
                url: fetched.final_url,
                content_type: fetched.content_type.unwrap_or_else(|| "text/html".to_string()),
                body: fetched.body,
                fetched_at: ctx.fetched_at,
            });
        }
        Ok(pages)
    }

    fn parse_listing(&self, page: &ListingPage) -> Result<Vec<ExternalCarnival>, AdapterError> {
        let text = String::from_utf8_lossy(&page.body);
        let records = if page.is_json() {
            parse_json_listing(&page.url, &text)?
        } else {
            parse_html_listing(&text)?
        };
        info!(url = %page.url, records = records.len(), "parsed mysideline listing");
        Ok(records)
    }
}

/// Accepts `YYYY-MM-DD`, an RFC 3339 timestamp, `DD/MM/YYYY` or `15 Aug 2025`.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day_part = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d %b %Y"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d %B %Y"))
        .ok()
}

fn clean(value: &str) -> Option<String> {
    let trimmed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!trimmed.is_empty()).then_some(trimmed)
}

fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    path.iter().try_fold(value, |node, key| node.get(*key))
}

fn json_text(value: &JsonValue, path: &[&str]) -> Option<String> {
    match json_at(value, path)? {
        JsonValue::String(s) => clean(s),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    match json_at(value, path)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_bool(value: &JsonValue, path: &[&str]) -> Option<bool> {
    json_at(value, path)?.as_bool()
}

fn json_events(url: &str, root: &JsonValue) -> Result<Vec<JsonValue>, AdapterError> {
    let list = match root {
        JsonValue::Array(items) => Some(items),
        JsonValue::Object(_) => ["events", "data", "results"]
            .iter()
            .find_map(|key| root.get(*key).and_then(JsonValue::as_array)),
        _ => None,
    };
    list.cloned().ok_or_else(|| AdapterError::Malformed {
        url: url.to_string(),
        message: "expected an event array or an object with `events`".into(),
    })
}

pub fn parse_json_listing(url: &str, text: &str) -> Result<Vec<ExternalCarnival>, AdapterError> {
    let root: JsonValue = serde_json::from_str(text).map_err(|e| AdapterError::Malformed {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let mut out = Vec::new();
    for (index, event) in json_events(url, &root)?.iter().enumerate() {
        let title = json_text(event, &["name"]).or_else(|| json_text(event, &["title"]));
        let date = json_text(event, &["startDate"])
            .or_else(|| json_text(event, &["date"]))
            .and_then(|d| parse_event_date(&d));
        let (Some(title), Some(date)) = (title, date) else {
            warn!(url, index, "dropping mysideline event without title or date");
            continue;
        };

        let details = CarnivalDetails {
            state: json_text(event, &["venue", "state"]).or_else(|| json_text(event, &["state"])),
            location_address: json_text(event, &["venue", "address"]),
            location_suburb: json_text(event, &["venue", "suburb"]),
            location_postcode: json_text(event, &["venue", "postcode"]),
            location_latitude: json_f64(event, &["venue", "lat"]),
            location_longitude: json_f64(event, &["venue", "lng"]),
            organiser_contact_name: json_text(event, &["contact", "name"]),
            organiser_contact_email: json_text(event, &["contact", "email"]),
            organiser_contact_phone: json_text(event, &["contact", "phone"]),
            schedule_details: json_text(event, &["schedule"]),
            registration_link: json_text(event, &["registrationUrl"]),
            end_date: json_text(event, &["endDate"]).and_then(|d| parse_event_date(&d)),
            is_registration_open: json_bool(event, &["registrationOpen"]),
            social_facebook_url: json_text(event, &["social", "facebook"]),
            social_instagram_url: json_text(event, &["social", "instagram"]),
            social_website_url: json_text(event, &["social", "website"]),
            club_logo_url: json_text(event, &["logoUrl"]),
            ..Default::default()
        };

        out.push(ExternalCarnival {
            external_id: json_text(event, &["id"]),
            title,
            date,
            details,
        });
    }
    Ok(out)
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

struct CardSelectors {
    card: Selector,
    title: Selector,
    date: Selector,
    state: Selector,
    address: Selector,
    contact_name: Selector,
    contact_email: Selector,
    contact_phone: Selector,
    schedule: Selector,
    register: Selector,
}

impl CardSelectors {
    fn new() -> Result<Self, AdapterError> {
        Ok(Self {
            card: selector(".event-card")?,
            title: selector(".event-title")?,
            date: selector("time.event-date")?,
            state: selector(".event-state")?,
            address: selector(".event-address")?,
            contact_name: selector(".event-contact-name")?,
            contact_email: selector("a.event-contact-email")?,
            contact_phone: selector(".event-contact-phone")?,
            schedule: selector(".event-schedule")?,
            register: selector("a.event-register")?,
        })
    }
}

fn first_text(card: ElementRef<'_>, sel: &Selector) -> Option<String> {
    card.select(sel)
        .next()
        .and_then(|n| clean(&n.text().collect::<String>()))
}

fn first_attr(card: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    card.select(sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(clean)
}

pub fn parse_html_listing(html: &str) -> Result<Vec<ExternalCarnival>, AdapterError> {
    let sels = CardSelectors::new()?;
    let document = Html::parse_document(html);

    let mut out = Vec::new();
    for (index, card) in document.select(&sels.card).enumerate() {
        let title = first_text(card, &sels.title);
        let date = first_attr(card, &sels.date, "datetime")
            .or_else(|| first_text(card, &sels.date))
            .and_then(|d| parse_event_date(&d));
        let (Some(title), Some(date)) = (title, date) else {
            warn!(index, "dropping mysideline card without title or date");
            continue;
        };

        let email = first_attr(card, &sels.contact_email, "href")
            .map(|href| href.trim_start_matches("mailto:").to_string())
            .or_else(|| first_text(card, &sels.contact_email));
        let details = CarnivalDetails {
            state: first_text(card, &sels.state),
            location_address: first_text(card, &sels.address),
            organiser_contact_name: first_text(card, &sels.contact_name),
            organiser_contact_email: email,
            organiser_contact_phone: first_text(card, &sels.contact_phone),
            schedule_details: first_text(card, &sels.schedule),
            registration_link: first_attr(card, &sels.register, "href"),
            ..Default::default()
        };

        out.push(ExternalCarnival {
            external_id: card.value().attr("data-event-id").and_then(clean),
            title,
            date,
            details,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::load_fixture_bundle;
    use serde::Deserialize;
    use std::fs;
    use std::path::{Path, PathBuf};

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct GoldenEvent {
        external_id: Option<String>,
        title: String,
        date: NaiveDate,
        state: Option<String>,
        organiser_contact_email: Option<String>,
    }

    fn sample_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/mysideline/sample")
    }

    fn to_golden(records: &[ExternalCarnival]) -> Vec<GoldenEvent> {
        records
            .iter()
            .map(|r| GoldenEvent {
                external_id: r.external_id.clone(),
                title: r.title.clone(),
                date: r.date,
                state: r.details.state.clone(),
                organiser_contact_email: r.details.organiser_contact_email.clone(),
            })
            .collect()
    }

    #[test]
    fn json_bundle_matches_snapshot() {
        let bundle = load_fixture_bundle(sample_dir().join("bundle.json")).unwrap();
        let records = MySidelineAdapter.parse_listing(&bundle.to_listing_page()).unwrap();

        let expected: Vec<GoldenEvent> = serde_json::from_str(
            &fs::read_to_string(sample_dir().join("snapshot.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(to_golden(&records), expected);
    }

    #[test]
    fn json_records_without_date_are_dropped() {
        let text = r#"{"events":[
            {"id": 7, "name": "No Date Carnival"},
            {"id": 8, "name": "Dated", "startDate": "2027-03-01T09:00:00+10:00",
             "venue": {"lat": "-27.4", "lng": 153.0}, "registrationOpen": true}
        ]}"#;
        let records = parse_json_listing("https://mysideline.test", text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].external_id.as_deref(), Some("8"));
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2027, 3, 1).unwrap());
        assert_eq!(records[0].details.location_latitude, Some(-27.4));
        assert_eq!(records[0].details.is_registration_open, Some(true));
    }

    #[test]
    fn non_list_json_is_malformed() {
        let err = parse_json_listing("https://mysideline.test", r#"{"ok":true}"#).unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));
    }

    #[test]
    fn html_cards_parse_with_mailto_and_au_dates() {
        let html = fs::read_to_string(sample_dir().join("listing.html")).unwrap();
        let records = parse_html_listing(&html).unwrap();

        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first.title, "Sydney Masters Cup");
        assert_eq!(first.external_id.as_deref(), Some("ms-1001"));
        assert_eq!(first.details.organiser_contact_email.as_deref(), Some("carnivals@sydneymasters.org.au"));
        assert_eq!(first.details.state.as_deref(), Some("NSW"));
        assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2027, 9, 20).unwrap());
    }

    #[test]
    fn date_formats() {
        let want = NaiveDate::from_ymd_opt(2027, 8, 15);
        assert_eq!(parse_event_date("2027-08-15"), want);
        assert_eq!(parse_event_date("15/08/2027"), want);
        assert_eq!(parse_event_date(" 15 Aug 2027 "), want);
        assert_eq!(parse_event_date("2027-08-15T18:00:00Z"), want);
        assert_eq!(parse_event_date("next Saturday"), None);
    }
}
