use super::traits::Storage;
use crate::domain::*;
use crate::error::{DropError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// In-memory storage implementation for development/testing
pub struct InMemoryStorage {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    subscriptions: Arc<Mutex<HashMap<Uuid, Subscription>>>,
    drops: Arc<Mutex<HashMap<Uuid, DropRecord>>>,
    recipients: Arc<Mutex<HashMap<Uuid, DropRecipient>>>,
    access_logs: Arc<Mutex<Vec<DropAccessLog>>>,
    usage: Arc<Mutex<HashMap<(Uuid, String), UsageRecord>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            drops: Arc::new(Mutex::new(HashMap::new())),
            recipients: Arc::new(Mutex::new(HashMap::new())),
            access_logs: Arc::new(Mutex::new(Vec::new())),
            usage: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| DropError::database(format!("in-memory store poisoned: {e}")))
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user(&self, user: &User) -> Result<()> {
        let mut users = lock(&self.users)?;
        if users.values().any(|u| u.email == user.email) {
            return Err(DropError::Validation(format!(
                "email '{}' is already registered",
                user.email
            )));
        }
        users.insert(user.id, user.clone());

        debug!("Created user: {} with id {}", user.email, user.id);
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(lock(&self.users)?.get(&user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = lock(&self.users)?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let users = lock(&self.users)?;
        Ok(users.values().find(|u| u.api_token == token).cloned())
    }

    async fn get_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        Ok(lock(&self.subscriptions)?.get(&user_id).cloned())
    }

    async fn get_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        let subscriptions = lock(&self.subscriptions)?;
        Ok(subscriptions
            .values()
            .find(|s| s.provider_subscription_id.as_deref() == Some(provider_subscription_id))
            .cloned())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        lock(&self.subscriptions)?.insert(subscription.user_id, subscription.clone());

        debug!(
            "Upserted subscription for user {}: {} ({})",
            subscription.user_id,
            subscription.tier,
            subscription.status.as_str()
        );
        Ok(())
    }

    async fn create_drop(&self, drop: &DropRecord) -> Result<()> {
        lock(&self.drops)?.insert(drop.id, drop.clone());

        debug!("Created drop: {} with id {}", drop.name, drop.id);
        Ok(())
    }

    async fn get_drop(&self, drop_id: Uuid) -> Result<Option<DropRecord>> {
        Ok(lock(&self.drops)?.get(&drop_id).cloned())
    }

    async fn update_drop(&self, drop: &DropRecord) -> Result<()> {
        let mut drops = lock(&self.drops)?;
        if !drops.contains_key(&drop.id) {
            return Err(DropError::not_found("drop"));
        }
        drops.insert(drop.id, drop.clone());

        debug!("Updated drop: {} with id {}", drop.name, drop.id);
        Ok(())
    }

    async fn delete_drop(&self, drop_id: Uuid) -> Result<()> {
        lock(&self.drops)?.remove(&drop_id);
        lock(&self.recipients)?.retain(|_, r| r.drop_id != drop_id);
        lock(&self.access_logs)?.retain(|l| l.drop_id != drop_id);

        debug!("Deleted drop {}", drop_id);
        Ok(())
    }

    async fn list_drops_for_owner(&self, owner_id: Uuid) -> Result<Vec<DropRecord>> {
        let drops = lock(&self.drops)?;
        let mut owned: Vec<DropRecord> = drops
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn list_expired_drops(&self, now: DateTime<Utc>) -> Result<Vec<DropRecord>> {
        let drops = lock(&self.drops)?;
        Ok(drops
            .values()
            .filter(|d| d.is_active && d.expires_at.map_or(false, |at| at <= now))
            .cloned()
            .collect())
    }

    async fn storage_used_by_owner(&self, owner_id: Uuid) -> Result<u64> {
        let drops = lock(&self.drops)?;
        Ok(drops
            .values()
            .filter(|d| d.owner_id == owner_id && d.is_active)
            .map(DropRecord::stored_bytes)
            .sum())
    }

    async fn add_recipients(&self, recipients: &[DropRecipient]) -> Result<()> {
        let mut stored = lock(&self.recipients)?;
        for recipient in recipients {
            let exists = stored
                .values()
                .any(|r| r.drop_id == recipient.drop_id && r.email == recipient.email);
            if !exists {
                stored.insert(recipient.id, recipient.clone());
            }
        }
        Ok(())
    }

    async fn get_recipients(&self, drop_id: Uuid) -> Result<Vec<DropRecipient>> {
        let recipients = lock(&self.recipients)?;
        let mut found: Vec<DropRecipient> = recipients
            .values()
            .filter(|r| r.drop_id == drop_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        Ok(found)
    }

    async fn get_recipient(&self, drop_id: Uuid, email: &str) -> Result<Option<DropRecipient>> {
        let recipients = lock(&self.recipients)?;
        Ok(recipients
            .values()
            .find(|r| r.drop_id == drop_id && r.email == email)
            .cloned())
    }

    async fn record_recipient_access(
        &self,
        recipient_id: Uuid,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DropRecipient> {
        let mut recipients = lock(&self.recipients)?;
        let recipient = recipients
            .get_mut(&recipient_id)
            .ok_or_else(|| DropError::not_found("recipient"))?;
        if recipient.access_started_at.is_none() {
            recipient.access_started_at = started_at;
        }
        recipient.last_accessed_at = Some(now);
        recipient.access_count += 1;
        Ok(recipient.clone())
    }

    async fn remove_recipient(&self, drop_id: Uuid, email: &str) -> Result<bool> {
        let mut recipients = lock(&self.recipients)?;
        let before = recipients.len();
        recipients.retain(|_, r| !(r.drop_id == drop_id && r.email == email));
        Ok(recipients.len() < before)
    }

    async fn create_access_log(&self, log: &DropAccessLog) -> Result<()> {
        lock(&self.access_logs)?.push(log.clone());
        Ok(())
    }

    async fn get_access_logs(&self, drop_id: Uuid) -> Result<Vec<DropAccessLog>> {
        let logs = lock(&self.access_logs)?;
        let mut found: Vec<DropAccessLog> =
            logs.iter().filter(|l| l.drop_id == drop_id).cloned().collect();
        found.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at));
        Ok(found)
    }

    async fn get_usage(&self, user_id: Uuid, period: &str) -> Result<Option<UsageRecord>> {
        let usage = lock(&self.usage)?;
        Ok(usage.get(&(user_id, period.to_string())).cloned())
    }

    async fn increment_usage(
        &self,
        user_id: Uuid,
        period: &str,
        delta: UsageDelta,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        let mut usage = lock(&self.usage)?;
        let record = usage
            .entry((user_id, period.to_string()))
            .or_insert_with(|| UsageRecord::empty(user_id, period.to_string(), now));
        record.drops_created += delta.drops;
        record.recipients_added += delta.recipients;
        record.bytes_uploaded += delta.bytes;
        record.updated_at = now;
        Ok(record.clone())
    }
}
