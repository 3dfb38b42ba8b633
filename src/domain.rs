//! Row types shared by storage backends, services and the HTTP layer.

use crate::tiers::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub api_token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    /// Maps provider status strings; unknown statuses are treated as lapsed.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "canceled" | "incomplete_expired" | "unpaid" => Self::Canceled,
            _ => Self::PastDue,
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown subscription status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn free(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tier: Tier::Free,
            status: SubscriptionStatus::Active,
            provider_customer_id: None,
            provider_subscription_id: None,
            current_period_end: None,
            updated_at: now,
        }
    }

    /// The tier whose limits apply right now. Lapsed subscriptions fall back to free.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        let paid_up = matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        );
        let in_period = self.current_period_end.map_or(true, |end| end > now);
        if paid_up && in_period {
            self.tier
        } else {
            Tier::Free
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropKind {
    File,
    Url,
}

impl DropKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Url => "url",
        }
    }
}

impl FromStr for DropKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "url" => Ok(Self::Url),
            other => Err(format!("unknown drop kind '{other}'")),
        }
    }
}

/// How a drop's access window is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryMode {
    /// Every recipient loses access at the drop's `expires_at`.
    Shared,
    /// Each recipient gets `access_window_minutes` from their first verification.
    PerRecipient,
}

impl ExpiryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::PerRecipient => "per_recipient",
        }
    }
}

impl FromStr for ExpiryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(Self::Shared),
            "per_recipient" => Ok(Self::PerRecipient),
            other => Err(format!("unknown expiry mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub object_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kind: DropKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_url: Option<String>,
    pub file: Option<StoredFile>,
    pub expiry_mode: ExpiryMode,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_window_minutes: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DropRecord {
    pub fn stored_bytes(&self) -> u64 {
        self.file.as_ref().map_or(0, |f| f.size_bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropRecipient {
    pub id: Uuid,
    pub drop_id: Uuid,
    pub email: String,
    pub access_started_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: i64,
    pub created_at: DateTime<Utc>,
}

impl DropRecipient {
    pub fn new(drop_id: Uuid, email: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            drop_id,
            email,
            access_started_at: None,
            last_accessed_at: None,
            access_count: 0,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Granted,
    Denied,
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

impl FromStr for AccessOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown access outcome '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropAccessLog {
    pub id: Uuid,
    pub drop_id: Uuid,
    pub email: String,
    pub outcome: AccessOutcome,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub accessed_at: DateTime<Utc>,
}

/// One row of `usage_tracking`: monthly counters for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: Uuid,
    pub period: String,
    pub drops_created: u64,
    pub recipients_added: u64,
    pub bytes_uploaded: u64,
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn empty(user_id: Uuid, period: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            period,
            drops_created: 0,
            recipients_added: 0,
            bytes_uploaded: 0,
            updated_at: now,
        }
    }
}

/// Increments applied to the current period's usage row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDelta {
    pub drops: u64,
    pub recipients: u64,
    pub bytes: u64,
}
