//! SMTP delivery of carnival notifications.
//!
//! [`EmailNotifier`] sends a plain-text confirmation to the acting user after
//! a merge, claim or release commits. Nothing is sent while the site is in
//! maintenance or coming-soon mode.

use async_trait::async_trait;
use carnival_core::{CarnivalEvent, CarnivalNotifier, NotifyResult, SiteConfig};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

pub const CRATE_NAME: &str = "carnival-notify";

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "noreply@masterscarnivals.local";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("email build error: {0}")]
    Build(#[from] lettre::error::Error),
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// `None` when `SMTP_HOST` is unset: no mailer should be built.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let smtp_host = lookup("SMTP_HOST").filter(|h| !h.trim().is_empty())?;
        Some(Self {
            smtp_host,
            smtp_port: lookup("SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: lookup("SMTP_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: lookup("SMTP_USER"),
            smtp_password: lookup("SMTP_PASSWORD"),
        })
    }
}

pub struct EmailNotifier {
    config: EmailConfig,
    site: SiteConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, site: SiteConfig) -> Result<Self, NotifyError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?.port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            mailer: builder.build(),
            config,
            site,
        })
    }

    /// `None` when there is nothing to send: the site is not live or the
    /// actor has no address on file.
    pub fn build_message(&self, event: &CarnivalEvent) -> Result<Option<Message>, NotifyError> {
        if !self.site.mode.is_live() {
            return Ok(None);
        }
        let Some(to) = event.actor().email.as_deref() else {
            return Ok(None);
        };
        let (subject, body) = render(&self.site.site_name, event);
        let message = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;
        Ok(Some(message))
    }
}

fn render(site_name: &str, event: &CarnivalEvent) -> (String, String) {
    let carnival = event.carnival();
    let when = carnival.date.format("%d %B %Y");
    let (subject, line) = match event {
        CarnivalEvent::Merged { .. } => (
            format!("[{site_name}] Your carnival was linked to an existing listing"),
            format!(
                "\"{}\" on {when} matched a listing we already held. Your details have been merged and your club now manages it.",
                carnival.title
            ),
        ),
        CarnivalEvent::Claimed { .. } => (
            format!("[{site_name}] You now manage {}", carnival.title),
            format!("Your club is now listed as the organiser of \"{}\" on {when}.", carnival.title),
        ),
        CarnivalEvent::Released { .. } => (
            format!("[{site_name}] {} released", carnival.title),
            format!("\"{}\" on {when} no longer lists your club as organiser.", carnival.title),
        ),
    };
    (subject, format!("{line}\n\nCarnival #{}\n", carnival.id))
}

#[async_trait]
impl CarnivalNotifier for EmailNotifier {
    async fn notify(&self, event: &CarnivalEvent) -> NotifyResult {
        let Some(message) = self.build_message(event)? else {
            debug!(kind = event.kind(), "notification email skipped");
            return Ok(());
        };
        self.mailer.send(message).await.map_err(NotifyError::from)?;
        info!(
            kind = event.kind(),
            carnival_id = event.carnival().id,
            "notification email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnival_core::{ActingUser, Carnival, NewCarnival, SiteMode};
    use chrono::{NaiveDate, Utc};

    fn config() -> EmailConfig {
        EmailConfig::from_lookup(|key| match key {
            "SMTP_HOST" => Some("smtp.example.com".into()),
            "SMTP_FROM" => Some("carnivals@example.com".into()),
            _ => None,
        })
        .unwrap()
    }

    fn actor(email: Option<&str>) -> ActingUser {
        ActingUser {
            id: 7,
            email: email.map(str::to_string),
            club_id: Some(3),
            club_state: Some("NSW".into()),
            is_admin: false,
        }
    }

    fn claimed(email: Option<&str>) -> CarnivalEvent {
        let actor = actor(email);
        let new = NewCarnival::manual(
            "Sydney Masters Cup".into(),
            NaiveDate::from_ymd_opt(2027, 8, 15).unwrap(),
            Default::default(),
            &actor,
        );
        CarnivalEvent::Claimed {
            carnival: Carnival::from_new(42, new, Utc::now()),
            actor,
        }
    }

    fn notifier(mode: SiteMode) -> EmailNotifier {
        let site = SiteConfig {
            mode,
            ..Default::default()
        };
        EmailNotifier::new(config(), site).unwrap()
    }

    #[test]
    fn from_lookup_requires_host() {
        assert!(EmailConfig::from_lookup(|_| None).is_none());
        let cfg = config();
        assert_eq!(cfg.smtp_port, 587);
        assert_eq!(cfg.from_address, "carnivals@example.com");
    }

    #[test]
    fn claim_message_is_addressed_to_actor() {
        let message = notifier(SiteMode::Live)
            .build_message(&claimed(Some("sec@club.org.au")))
            .unwrap()
            .expect("message");
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: sec@club.org.au"));
        assert!(raw.contains("Subject: [Masters Carnivals] You now manage Sydney Masters Cup"));
        assert!(raw.contains("Carnival #42"));
    }

    #[test]
    fn body_names_the_carnival_and_date() {
        let (_, body) = render("Masters Carnivals", &claimed(None));
        assert!(body.starts_with("Your club is now listed as the organiser of \"Sydney Masters Cup\" on 15 August 2027."));
    }

    #[test]
    fn nothing_is_sent_while_site_is_down() {
        let event = claimed(Some("sec@club.org.au"));
        for mode in [SiteMode::Maintenance, SiteMode::ComingSoon] {
            assert!(notifier(mode).build_message(&event).unwrap().is_none());
        }
    }

    #[test]
    fn actor_without_email_is_skipped() {
        assert!(notifier(SiteMode::Live)
            .build_message(&claimed(None))
            .unwrap()
            .is_none());
    }

    #[test]
    fn bad_recipient_is_an_address_error() {
        let err = notifier(SiteMode::Live)
            .build_message(&claimed(Some("not-an-email")))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Address(_)));
    }

    #[tokio::test]
    async fn gated_notify_succeeds_without_network() {
        let event = claimed(Some("sec@club.org.au"));
        notifier(SiteMode::Maintenance).notify(&event).await.unwrap();
    }
}
