//! Subscription tiers and the quotas each one grants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Individual,
    Business,
}

/// Features that are switched on or off per tier rather than metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Analytics,
    PerRecipientTimers,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytics => "analytics",
            Self::PerRecipientTimers => "per_recipient_timers",
        }
    }
}

/// Quotas for one tier. `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierLimits {
    pub max_drops_per_month: Option<u64>,
    pub max_recipients_per_drop: Option<u64>,
    pub max_file_size_bytes: Option<u64>,
    pub max_storage_bytes: Option<u64>,
    pub analytics: bool,
    pub per_recipient_timers: bool,
}

impl TierLimits {
    pub fn allows(&self, feature: Feature) -> bool {
        match feature {
            Feature::Analytics => self.analytics,
            Feature::PerRecipientTimers => self.per_recipient_timers,
        }
    }
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Individual, Tier::Business];

    pub fn limits(&self) -> TierLimits {
        match self {
            Tier::Free => TierLimits {
                max_drops_per_month: Some(3),
                max_recipients_per_drop: Some(5),
                max_file_size_bytes: Some(10 * MIB),
                max_storage_bytes: Some(100 * MIB),
                analytics: false,
                per_recipient_timers: false,
            },
            Tier::Individual => TierLimits {
                max_drops_per_month: Some(50),
                max_recipients_per_drop: Some(50),
                max_file_size_bytes: Some(100 * MIB),
                max_storage_bytes: Some(5 * GIB),
                analytics: true,
                per_recipient_timers: true,
            },
            Tier::Business => TierLimits {
                max_drops_per_month: None,
                max_recipients_per_drop: Some(500),
                max_file_size_bytes: Some(GIB),
                max_storage_bytes: Some(50 * GIB),
                analytics: true,
                per_recipient_timers: true,
            },
        }
    }

    /// The tier to suggest when this one runs out of headroom.
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Free => Some(Tier::Individual),
            Tier::Individual => Some(Tier::Business),
            Tier::Business => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Individual => "individual",
            Tier::Business => "business",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "individual" | "pro" => Ok(Tier::Individual),
            "business" | "team" => Ok(Tier::Business),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}
