//! Transactional email.

use crate::config::EmailConfig;
use crate::domain::{DropRecord, ExpiryMode, User};
use crate::error::{DropError, Result};
use askama::Template;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Sends through an HTTP email API (`POST {api_base}/emails`, bearer auth).
pub struct HttpMailer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(api_base: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let body = SendEmailRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        };
        let resp = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(DropError::Provider {
                message: format!("email API returned {status}: {detail}"),
            });
        }
        info!(to = message.to.len(), subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Logs messages instead of sending them; used when no API key is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = ?message.to,
            subject = %message.subject,
            "Email delivery disabled, message not sent"
        );
        Ok(())
    }
}

pub fn mailer_from_config(config: &EmailConfig) -> Arc<dyn Mailer> {
    match config.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            Arc::new(HttpMailer::new(&config.api_base, key, &config.from))
        }
        _ => Arc::new(LogMailer),
    }
}

fn availability_line(drop: &DropRecord) -> String {
    match (drop.expiry_mode, drop.expires_at, drop.access_window_minutes) {
        (ExpiryMode::PerRecipient, _, Some(minutes)) => format!(
            "Once you open it you will have {minutes} minutes of access."
        ),
        (_, Some(at), _) => format!("Available until {}.", at.format("%Y-%m-%d %H:%M UTC")),
        _ => "Available until the sender closes it.".to_string(),
    }
}

#[derive(Template)]
#[template(path = "email/drop_shared.html")]
struct DropSharedHtml<'a> {
    sender: &'a str,
    drop_name: &'a str,
    link: &'a str,
    recipient: &'a str,
    availability: &'a str,
}

#[derive(Template)]
#[template(path = "email/drop_shared.txt")]
struct DropSharedText<'a> {
    sender: &'a str,
    drop_name: &'a str,
    link: &'a str,
    recipient: &'a str,
    availability: &'a str,
}

/// Notification sent to each recipient when a drop is shared with them.
pub fn drop_shared(
    drop: &DropRecord,
    owner: &User,
    recipient: &str,
    base_url: &str,
) -> Result<EmailMessage> {
    let sender = owner.display_name.as_deref().unwrap_or(&owner.email);
    let link = format!("{}/drops/{}", base_url.trim_end_matches('/'), drop.id);
    let availability = availability_line(drop);

    let html = DropSharedHtml {
        sender,
        drop_name: &drop.name,
        link: &link,
        recipient,
        availability: &availability,
    }
    .render()?;
    let text = DropSharedText {
        sender,
        drop_name: &drop.name,
        link: &link,
        recipient,
        availability: &availability,
    }
    .render()?;

    Ok(EmailMessage {
        to: vec![recipient.to_string()],
        subject: format!("{sender} shared \"{}\" with you", drop.name),
        html,
        text,
    })
}
