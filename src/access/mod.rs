//! Email-gated access to drops.
//!
//! A recipient proves they are on a drop's list by submitting their email. The
//! drop's [`ExpiryMode`] then decides how long the resulting session lives:
//!
//! - `Shared`: everyone is cut off at the drop's `expires_at`.
//! - `PerRecipient`: a timer of `access_window_minutes` starts on the
//!   recipient's first successful verification, capped by `expires_at` if set.
//!
//! Sessions are held server side in a [`SessionStore`] and can be resumed by
//! token until they expire or the recipient is revoked.

pub mod session;

pub use session::{AccessSession, SessionStore};

use crate::domain::{AccessOutcome, DropAccessLog, DropRecipient, DropRecord, ExpiryMode};
use crate::error::{DropError, Result};
use crate::metrics::AccessMetrics;
use crate::storage::Storage;
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Trims and lower-cases an address, rejecting anything that is not shaped like one.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if email.len() > 254 || !EMAIL_RE.is_match(&email) {
        return Err(DropError::InvalidEmail(raw.trim().to_string()));
    }
    Ok(email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Inactive,
    NotRecipient,
    Expired,
    InvalidSession,
    NotReady,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::NotRecipient => "not_recipient",
            Self::Expired => "expired",
            Self::InvalidSession => "invalid_session",
            Self::NotReady => "not_ready",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Inactive | Self::Expired => StatusCode::GONE,
            Self::NotRecipient => StatusCode::FORBIDDEN,
            Self::InvalidSession => StatusCode::UNAUTHORIZED,
            Self::NotReady => StatusCode::CONFLICT,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Inactive => "this drop is no longer available",
            Self::NotRecipient => "this email is not on the recipient list",
            Self::Expired => "access to this drop has expired",
            Self::InvalidSession => "session is missing, unknown or belongs to another drop",
            Self::NotReady => "this drop has no content yet",
        };
        f.write_str(text)
    }
}

/// Outcome of a successful [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Hard end of access, if the drop has one.
    pub deadline: Option<DateTime<Utc>>,
    /// When the recipient's personal timer began (per-recipient drops only).
    pub started_at: Option<DateTime<Utc>>,
    /// True on the first verification of a per-recipient drop.
    pub starts_timer: bool,
}

/// Decides whether `recipient` may open `drop` at `now`. Pure; persists nothing.
pub fn evaluate(
    drop: &DropRecord,
    recipient: Option<&DropRecipient>,
    now: DateTime<Utc>,
) -> std::result::Result<Grant, DenyReason> {
    if !drop.is_active {
        return Err(DenyReason::Inactive);
    }
    let recipient = recipient.ok_or(DenyReason::NotRecipient)?;

    match drop.expiry_mode {
        ExpiryMode::Shared => {
            if let Some(expires_at) = drop.expires_at {
                if now >= expires_at {
                    return Err(DenyReason::Expired);
                }
            }
            Ok(Grant {
                deadline: drop.expires_at,
                started_at: None,
                starts_timer: false,
            })
        }
        ExpiryMode::PerRecipient => {
            let started_at = recipient.access_started_at.unwrap_or(now);
            // A window too large to represent sets no deadline of its own
            let window_end = Duration::try_minutes(drop.access_window_minutes.unwrap_or(0).max(0))
                .and_then(|window| started_at.checked_add_signed(window));
            let deadline = match (window_end, drop.expires_at) {
                (Some(end), Some(cap)) => Some(end.min(cap)),
                (end, cap) => end.or(cap),
            };
            if deadline.is_some_and(|d| now >= d) {
                return Err(DenyReason::Expired);
            }
            Ok(Grant {
                deadline,
                started_at: Some(started_at),
                starts_timer: recipient.access_started_at.is_none(),
            })
        }
    }
}

/// Request metadata kept in the access log.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AccessService {
    storage: Arc<dyn Storage>,
    sessions: Arc<SessionStore>,
    session_ttl: Duration,
}

impl AccessService {
    /// `session_ttl` bounds sessions for drops without a hard deadline.
    pub fn new(storage: Arc<dyn Storage>, sessions: Arc<SessionStore>, session_ttl: Duration) -> Self {
        Self {
            storage,
            sessions,
            session_ttl,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub async fn verify(
        &self,
        drop_id: Uuid,
        raw_email: &str,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<AccessSession> {
        let drop = self
            .storage
            .get_drop(drop_id)
            .await?
            .ok_or_else(|| DropError::not_found("drop"))?;
        let email = normalize_email(raw_email)?;
        let recipient = self.storage.get_recipient(drop_id, &email).await?;

        let mut grant = match evaluate(&drop, recipient.as_ref(), now) {
            Ok(grant) => grant,
            Err(reason) => {
                AccessMetrics::record_denied(reason);
                self.log_access(drop_id, &email, AccessOutcome::Denied, Some(reason), client, now)
                    .await;
                info!(%drop_id, reason = reason.as_str(), "Access denied");
                return Err(DropError::AccessDenied(reason));
            }
        };

        if let Some(recipient) = recipient {
            let start = grant.started_at.filter(|_| grant.starts_timer);
            let stored = self
                .storage
                .record_recipient_access(recipient.id, start, now)
                .await?;
            // A concurrent first verification may have started the timer already.
            // Storage keeps microsecond precision.
            let micros = |t: Option<DateTime<Utc>>| t.map(|t| t.timestamp_micros());
            if micros(stored.access_started_at) != micros(grant.started_at) {
                grant = evaluate(&drop, Some(&stored), now).map_err(DropError::AccessDenied)?;
                grant.starts_timer = false;
            }
        }

        self.log_access(drop_id, &email, AccessOutcome::Granted, None, client, now)
            .await;
        AccessMetrics::record_granted(grant.starts_timer);

        let ttl_end = now + self.session_ttl;
        let expires_at = grant.deadline.map_or(ttl_end, |d| d.min(ttl_end));
        let session = self.sessions.issue(drop_id, &email, expires_at)?;
        info!(%drop_id, expires_at = %session.expires_at, "Access granted");
        Ok(session)
    }

    /// Re-validates a session token. Expired or revoked sessions are evicted.
    pub async fn resume(&self, drop_id: Uuid, token: &str, now: DateTime<Utc>) -> Result<AccessSession> {
        let session = self
            .sessions
            .get(token)?
            .filter(|s| s.drop_id == drop_id)
            .ok_or(DropError::AccessDenied(DenyReason::InvalidSession))?;

        if session.is_expired(now) {
            self.sessions.remove(token)?;
            return Err(DropError::AccessDenied(DenyReason::Expired));
        }

        let drop = self.storage.get_drop(drop_id).await?;
        let recipient = self.storage.get_recipient(drop_id, &session.email).await?;
        let denied = match (&drop, &recipient) {
            (None, _) => Some(DenyReason::Inactive),
            (Some(d), _) if !d.is_active => Some(DenyReason::Inactive),
            (_, None) => Some(DenyReason::NotRecipient),
            _ => None,
        };
        if let Some(reason) = denied {
            self.sessions.remove(token)?;
            return Err(DropError::AccessDenied(reason));
        }

        Ok(session)
    }

    async fn log_access(
        &self,
        drop_id: Uuid,
        email: &str,
        outcome: AccessOutcome,
        reason: Option<DenyReason>,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) {
        let log = DropAccessLog {
            id: Uuid::new_v4(),
            drop_id,
            email: email.to_string(),
            outcome,
            reason: reason.map(|r| r.as_str().to_string()),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            accessed_at: now,
        };
        if let Err(e) = self.storage.create_access_log(&log).await {
            warn!(%drop_id, "Failed to write access log: {}", e);
        }
    }
}
