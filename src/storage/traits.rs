use crate::domain::*;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage trait for persisting users, subscriptions, drops and their usage trail
#[async_trait]
pub trait Storage: Send + Sync {
    // User operations
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn get_user_by_token(&self, token: &str) -> Result<Option<User>>;

    // Subscription operations
    async fn get_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>>;
    async fn get_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>>;
    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()>;

    // Drop operations
    async fn create_drop(&self, drop: &DropRecord) -> Result<()>;
    async fn get_drop(&self, drop_id: Uuid) -> Result<Option<DropRecord>>;
    async fn update_drop(&self, drop: &DropRecord) -> Result<()>;
    /// Removes the drop together with its recipients and access logs.
    async fn delete_drop(&self, drop_id: Uuid) -> Result<()>;
    async fn list_drops_for_owner(&self, owner_id: Uuid) -> Result<Vec<DropRecord>>;
    /// Active drops whose hard deadline is at or before `now`.
    async fn list_expired_drops(&self, now: DateTime<Utc>) -> Result<Vec<DropRecord>>;
    /// Sum of stored file sizes across the owner's active drops.
    async fn storage_used_by_owner(&self, owner_id: Uuid) -> Result<u64>;

    // Recipient operations
    async fn add_recipients(&self, recipients: &[DropRecipient]) -> Result<()>;
    async fn get_recipients(&self, drop_id: Uuid) -> Result<Vec<DropRecipient>>;
    async fn get_recipient(&self, drop_id: Uuid, email: &str) -> Result<Option<DropRecipient>>;
    /// Counts one successful verification. `started_at` only takes effect when the
    /// recipient's timer has not started yet, so the first verification wins.
    async fn record_recipient_access(
        &self,
        recipient_id: Uuid,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DropRecipient>;
    async fn remove_recipient(&self, drop_id: Uuid, email: &str) -> Result<bool>;

    // Access log operations
    async fn create_access_log(&self, log: &DropAccessLog) -> Result<()>;
    async fn get_access_logs(&self, drop_id: Uuid) -> Result<Vec<DropAccessLog>>;

    // Usage tracking operations
    async fn get_usage(&self, user_id: Uuid, period: &str) -> Result<Option<UsageRecord>>;
    /// Adds `delta` to the period's row, creating it when missing, and returns the new totals.
    async fn increment_usage(
        &self,
        user_id: Uuid,
        period: &str,
        delta: UsageDelta,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord>;
}
