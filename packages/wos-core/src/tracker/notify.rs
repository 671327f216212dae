use std::collections::BTreeSet;

use anyhow::Context;
use chrono::{DateTime, Local};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use log::info;

use crate::config::EmailConfig;

/// Tells someone about newly appeared codes, once per batch
pub trait Notifier {
    fn notify(&self, codes: &BTreeSet<String>) -> anyhow::Result<()>;
}

pub fn subject(title: &str, count: usize) -> String {
    format!("🎁 {count} New {title} Codes!")
}

pub fn html_body(title: &str, url: &str, time: DateTime<Local>, codes: &BTreeSet<String>) -> String {
    let items = codes
        .iter()
        .map(|code| format!("<li><strong>{}</strong></li>", escape_html(code)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<html><body>\n\
         <h2>New {title} gift codes</h2>\n\
         <ul>\n{items}\n</ul>\n\
         <p>Source: <a href=\"{url}\">{url}</a><br>\n\
         Found at: {}</p>\n\
         </body></html>\n",
        time.format("%Y-%m-%d %H:%M:%S")
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Sends one html mail over smtp with starttls
pub struct EmailNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Vec<Mailbox>,
    title: String,
    url: String,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig, title: &str, url: &str) -> anyhow::Result<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("invalid sender {:?}", config.from))?;
        let to = config
            .recipients
            .iter()
            .map(|r| {
                r.parse::<Mailbox>()
                    .with_context(|| format!("invalid recipient {r:?}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        if to.is_empty() {
            anyhow::bail!("email notification enabled without recipients");
        }

        let transport = SmtpTransport::starttls_relay(&config.smtp_server)
            .with_context(|| format!("invalid smtp server {:?}", config.smtp_server))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from,
            to,
            title: title.to_string(),
            url: url.to_string(),
        })
    }

    pub fn message(&self, codes: &BTreeSet<String>) -> anyhow::Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(&self.title, codes.len()))
            .header(ContentType::TEXT_HTML);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(html_body(&self.title, &self.url, Local::now(), codes))
            .context("failed to build the mail")
    }
}

impl Notifier for EmailNotifier {
    fn notify(&self, codes: &BTreeSet<String>) -> anyhow::Result<()> {
        let message = self.message(codes)?;
        self.transport
            .send(&message)
            .context("failed to send the mail")?;
        info!("[EmailNotifier]: mailed {} codes to {} recipients", codes.len(), self.to.len());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            from: "bot@example.com".to_string(),
            username: "bot@example.com".to_string(),
            password: "secret".to_string(),
            recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
        }
    }

    #[test]
    fn test_subject() {
        assert_eq!(
            subject("Whiteout Survival", 2),
            "🎁 2 New Whiteout Survival Codes!"
        );
    }

    #[test]
    fn test_html_body() {
        let codes = ["XYZ999".to_string(), "A<B".to_string()].into_iter().collect();
        let time = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let body = html_body("Whiteout Survival", "https://wosgiftcodes.com/", time, &codes);
        assert!(body.contains("<li><strong>XYZ999</strong></li>"));
        assert!(body.contains("A&lt;B"));
        assert!(body.contains("https://wosgiftcodes.com/"));
        assert!(body.contains("2025-01-02 03:04:05"));
    }

    #[test]
    fn test_message() {
        let notifier =
            EmailNotifier::new(&config(), "Whiteout Survival", "https://wosgiftcodes.com/").unwrap();
        let codes = ["XYZ999".to_string()].into_iter().collect();
        let message = notifier.message(&codes).unwrap();
        assert_eq!(message.envelope().to().len(), 2);

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("text/html"));
        assert!(raw.contains("XYZ999"));
    }

    #[test]
    fn test_bad_addresses() {
        let mut bad_from = config();
        bad_from.from = "not an address".to_string();
        assert!(EmailNotifier::new(&bad_from, "t", "u").is_err());

        let mut no_recipients = config();
        no_recipients.recipients.clear();
        assert!(EmailNotifier::new(&no_recipients, "t", "u").is_err());
    }
}
