//! Quota enforcement against the caller's tier and current usage.
//!
//! Every check either passes or fails with [`DropError::LimitExceeded`] carrying
//! a hard [`UpgradePrompt`]. [`upgrade_prompts`] produces the softer nudges shown
//! before a limit is actually hit.

use crate::error::{DropError, Result};
use crate::metrics::GuardMetrics;
use crate::tiers::{Feature, Tier};
use crate::usage::UsageSnapshot;
use serde::Serialize;
use std::fmt;

/// Usage fraction (in percent) at which a soft prompt is shown.
pub const SOFT_PROMPT_PERCENT: u64 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    DropsPerMonth,
    RecipientsPerDrop,
    FileSize,
    Storage,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropsPerMonth => "drops_per_month",
            Self::RecipientsPerDrop => "recipients_per_drop",
            Self::FileSize => "file_size",
            Self::Storage => "storage",
        }
    }

    fn is_bytes(&self) -> bool {
        matches!(self, Self::FileSize | Self::Storage)
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::DropsPerMonth => "monthly drops",
            Self::RecipientsPerDrop => "recipients per drop",
            Self::FileSize => "file size",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptLevel {
    Soft,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradePrompt {
    pub level: PromptLevel,
    pub limit: LimitKind,
    pub current: u64,
    pub max: u64,
    pub current_tier: Tier,
    pub suggested_tier: Option<Tier>,
    pub message: String,
}

impl UpgradePrompt {
    fn new(level: PromptLevel, tier: Tier, limit: LimitKind, current: u64, max: u64) -> Self {
        let suggested_tier = tier.next();
        let amount = |v: u64| {
            if limit.is_bytes() {
                human_bytes(v)
            } else {
                v.to_string()
            }
        };
        let headline = match level {
            PromptLevel::Hard => format!(
                "You've reached the {} limit of the {} plan ({} of {})",
                limit.describe(),
                tier,
                amount(current),
                amount(max)
            ),
            PromptLevel::Soft => format!(
                "You're close to the {} limit of the {} plan ({} of {})",
                limit.describe(),
                tier,
                amount(current),
                amount(max)
            ),
        };
        let message = match suggested_tier {
            Some(next) => format!("{headline}. Upgrade to {next} for more."),
            None => format!("{headline}."),
        };
        Self {
            level,
            limit,
            current,
            max,
            current_tier: tier,
            suggested_tier,
            message,
        }
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn deny(tier: Tier, limit: LimitKind, current: u64, max: u64) -> DropError {
    GuardMetrics::record_denied(limit);
    DropError::LimitExceeded {
        prompt: UpgradePrompt::new(PromptLevel::Hard, tier, limit, current, max),
    }
}

/// A free-tier user with 3 drops this month cannot create a 4th.
pub fn check_drop_creation(tier: Tier, usage: &UsageSnapshot) -> Result<()> {
    if let Some(max) = tier.limits().max_drops_per_month {
        if usage.drops_this_month >= max {
            return Err(deny(tier, LimitKind::DropsPerMonth, usage.drops_this_month, max));
        }
    }
    Ok(())
}

pub fn check_recipients(tier: Tier, existing: u64, adding: u64) -> Result<()> {
    if let Some(max) = tier.limits().max_recipients_per_drop {
        let total = existing + adding;
        if total > max {
            return Err(deny(tier, LimitKind::RecipientsPerDrop, total, max));
        }
    }
    Ok(())
}

/// `replacing_bytes` is the size of a file the upload supersedes, which is
/// released from storage when the new one lands.
pub fn check_file_upload(
    tier: Tier,
    usage: &UsageSnapshot,
    size_bytes: u64,
    replacing_bytes: u64,
) -> Result<()> {
    let limits = tier.limits();
    if let Some(max) = limits.max_file_size_bytes {
        if size_bytes > max {
            return Err(deny(tier, LimitKind::FileSize, size_bytes, max));
        }
    }
    if let Some(max) = limits.max_storage_bytes {
        let projected = usage
            .storage_used_bytes
            .saturating_sub(replacing_bytes)
            .saturating_add(size_bytes);
        if projected > max {
            return Err(deny(tier, LimitKind::Storage, projected, max));
        }
    }
    Ok(())
}

pub fn check_feature(tier: Tier, feature: Feature) -> Result<()> {
    if tier.limits().allows(feature) {
        Ok(())
    } else {
        Err(DropError::FeatureUnavailable {
            feature: feature.as_str().to_string(),
            tier: tier.to_string(),
        })
    }
}

fn prompt_for(tier: Tier, limit: LimitKind, current: u64, max: Option<u64>) -> Option<UpgradePrompt> {
    let max = max?;
    if current >= max {
        return Some(UpgradePrompt::new(PromptLevel::Hard, tier, limit, current, max));
    }
    // u128 keeps byte counts from overflowing when scaled
    if (current as u128) * 100 >= (max as u128) * (SOFT_PROMPT_PERCENT as u128) {
        return Some(UpgradePrompt::new(PromptLevel::Soft, tier, limit, current, max));
    }
    None
}

/// Prompts for every account-wide limit that is at or near exhaustion.
pub fn upgrade_prompts(tier: Tier, usage: &UsageSnapshot) -> Vec<UpgradePrompt> {
    let limits = tier.limits();
    [
        prompt_for(
            tier,
            LimitKind::DropsPerMonth,
            usage.drops_this_month,
            limits.max_drops_per_month,
        ),
        prompt_for(
            tier,
            LimitKind::Storage,
            usage.storage_used_bytes,
            limits.max_storage_bytes,
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}
