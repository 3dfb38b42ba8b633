//! Monthly usage counters and the snapshot the guard checks against.

use crate::domain::UsageDelta;
use crate::error::Result;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Billing period key for `now`, e.g. `2026-10`.
pub fn current_period(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub period: String,
    pub drops_this_month: u64,
    pub recipients_this_month: u64,
    pub bytes_uploaded_this_month: u64,
    pub storage_used_bytes: u64,
}

#[derive(Clone)]
pub struct UsageTracker {
    storage: Arc<dyn Storage>,
}

impl UsageTracker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn snapshot(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<UsageSnapshot> {
        let period = current_period(now);
        let record = self.storage.get_usage(user_id, &period).await?;
        let storage_used_bytes = self.storage.storage_used_by_owner(user_id).await?;

        Ok(match record {
            Some(r) => UsageSnapshot {
                period,
                drops_this_month: r.drops_created,
                recipients_this_month: r.recipients_added,
                bytes_uploaded_this_month: r.bytes_uploaded,
                storage_used_bytes,
            },
            None => UsageSnapshot {
                period,
                drops_this_month: 0,
                recipients_this_month: 0,
                bytes_uploaded_this_month: 0,
                storage_used_bytes,
            },
        })
    }

    pub async fn record_drop_created(&self, user_id: Uuid, recipients: u64, now: DateTime<Utc>) {
        self.record(
            user_id,
            UsageDelta {
                drops: 1,
                recipients,
                bytes: 0,
            },
            now,
        )
        .await
    }

    pub async fn record_recipients_added(&self, user_id: Uuid, count: u64, now: DateTime<Utc>) {
        if count == 0 {
            return;
        }
        self.record(
            user_id,
            UsageDelta {
                recipients: count,
                ..Default::default()
            },
            now,
        )
        .await
    }

    pub async fn record_bytes_uploaded(&self, user_id: Uuid, bytes: u64, now: DateTime<Utc>) {
        self.record(
            user_id,
            UsageDelta {
                bytes,
                ..Default::default()
            },
            now,
        )
        .await
    }

    // Tracking never fails the operation being tracked
    async fn record(&self, user_id: Uuid, delta: UsageDelta, now: DateTime<Utc>) {
        let period = current_period(now);
        if let Err(e) = self
            .storage
            .increment_usage(user_id, &period, delta, now)
            .await
        {
            warn!(%user_id, %period, "Failed to record usage {:?}: {}", delta, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use chrono::TimeZone;

    #[test]
    fn test_current_period_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(current_period(at), "2026-03");
    }

    #[tokio::test]
    async fn test_snapshot_defaults_to_zero() {
        let tracker = UsageTracker::new(Arc::new(InMemoryStorage::new()));
        let snapshot = tracker.snapshot(Uuid::new_v4(), Utc::now()).await.unwrap();
        assert_eq!(snapshot.drops_this_month, 0);
        assert_eq!(snapshot.storage_used_bytes, 0);
    }

    #[tokio::test]
    async fn test_counters_reset_each_month() {
        let tracker = UsageTracker::new(Arc::new(InMemoryStorage::new()));
        let user = Uuid::new_v4();
        let october = Utc.with_ymd_and_hms(2026, 10, 31, 23, 0, 0).unwrap();
        let november = Utc.with_ymd_and_hms(2026, 11, 1, 1, 0, 0).unwrap();

        tracker.record_drop_created(user, 2, october).await;
        tracker.record_drop_created(user, 1, october).await;
        tracker.record_bytes_uploaded(user, 512, october).await;

        let snapshot = tracker.snapshot(user, october).await.unwrap();
        assert_eq!(snapshot.drops_this_month, 2);
        assert_eq!(snapshot.recipients_this_month, 3);
        assert_eq!(snapshot.bytes_uploaded_this_month, 512);

        let snapshot = tracker.snapshot(user, november).await.unwrap();
        assert_eq!(snapshot.drops_this_month, 0);
    }
}
