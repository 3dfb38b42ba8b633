//! Applying payment provider events to subscriptions.

use crate::domain::{Subscription, SubscriptionStatus};
use crate::error::{DropError, Result};
use crate::storage::Storage;
use crate::tiers::Tier;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    client_reference_id: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: Option<String>,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Ignored,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Ignored => "ignored",
        }
    }
}

fn tier_from_metadata(metadata: &HashMap<String, String>) -> Option<Tier> {
    metadata.get("tier").and_then(|t| t.parse().ok())
}

fn user_from_metadata(metadata: &HashMap<String, String>) -> Option<Uuid> {
    metadata.get("user_id").and_then(|u| Uuid::parse_str(u).ok())
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

pub struct PaymentEventHandler {
    storage: Arc<dyn Storage>,
}

impl PaymentEventHandler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn handle(&self, event: &WebhookEvent, now: DateTime<Utc>) -> Result<EventOutcome> {
        match event.event_type.as_str() {
            CHECKOUT_COMPLETED => self.checkout_completed(event, now).await,
            SUBSCRIPTION_UPDATED => self.subscription_changed(event, false, now).await,
            SUBSCRIPTION_DELETED => self.subscription_changed(event, true, now).await,
            other => {
                info!(event_id = %event.id, event_type = other, "Ignoring webhook event");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    async fn checkout_completed(&self, event: &WebhookEvent, now: DateTime<Utc>) -> Result<EventOutcome> {
        let session: CheckoutSessionObject = serde_json::from_value(event.data.object.clone())
            .map_err(|e| DropError::Validation(format!("malformed checkout session: {e}")))?;

        let user_id = session
            .client_reference_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
            .or_else(|| user_from_metadata(&session.metadata));
        let Some(user_id) = user_id else {
            warn!(event_id = %event.id, "Checkout session without a user reference");
            return Ok(EventOutcome::Ignored);
        };
        if self.storage.get_user(user_id).await?.is_none() {
            warn!(event_id = %event.id, %user_id, "Checkout session for unknown user");
            return Ok(EventOutcome::Ignored);
        }
        let Some(tier) = tier_from_metadata(&session.metadata) else {
            warn!(event_id = %event.id, %user_id, "Checkout session without a tier");
            return Ok(EventOutcome::Ignored);
        };

        let mut subscription = self
            .storage
            .get_subscription(user_id)
            .await?
            .unwrap_or_else(|| Subscription::free(user_id, now));
        subscription.tier = tier;
        subscription.status = SubscriptionStatus::Active;
        subscription.provider_customer_id = session.customer.or(subscription.provider_customer_id);
        subscription.provider_subscription_id =
            session.subscription.or(subscription.provider_subscription_id);
        subscription.updated_at = now;
        self.storage.upsert_subscription(&subscription).await?;

        info!(%user_id, %tier, "Subscription activated from checkout");
        Ok(EventOutcome::Applied)
    }

    async fn subscription_changed(
        &self,
        event: &WebhookEvent,
        deleted: bool,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        let object: SubscriptionObject = serde_json::from_value(event.data.object.clone())
            .map_err(|e| DropError::Validation(format!("malformed subscription: {e}")))?;

        let existing = match self.storage.get_subscription_by_provider_id(&object.id).await? {
            Some(s) => Some(s),
            None => match user_from_metadata(&object.metadata) {
                Some(user_id) => self.storage.get_subscription(user_id).await?,
                None => None,
            },
        };
        let Some(mut subscription) = existing else {
            warn!(event_id = %event.id, provider_id = %object.id, "Subscription event for unknown subscription");
            return Ok(EventOutcome::Ignored);
        };

        subscription.provider_subscription_id = Some(object.id.clone());
        if object.customer.is_some() {
            subscription.provider_customer_id = object.customer.clone();
        }
        if deleted {
            subscription.status = SubscriptionStatus::Canceled;
            subscription.tier = Tier::Free;
            subscription.current_period_end = None;
        } else {
            subscription.status = SubscriptionStatus::from_provider(&object.status);
            subscription.current_period_end = timestamp(object.current_period_end);
            if let Some(tier) = tier_from_metadata(&object.metadata) {
                subscription.tier = tier;
            }
        }
        subscription.updated_at = now;
        self.storage.upsert_subscription(&subscription).await?;

        info!(
            user_id = %subscription.user_id,
            tier = %subscription.tier,
            status = subscription.status.as_str(),
            "Subscription updated from provider"
        );
        Ok(EventOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;
    use crate::storage::InMemoryStorage;
    use serde_json::json;

    async fn setup() -> (PaymentEventHandler, Arc<InMemoryStorage>, Uuid) {
        let storage = Arc::new(InMemoryStorage::new());
        let user = User {
            id: Uuid::new_v4(),
            email: "payer@example.com".to_string(),
            display_name: None,
            api_token: "tok".to_string(),
            created_at: Utc::now(),
        };
        storage.create_user(&user).await.unwrap();
        (PaymentEventHandler::new(storage.clone()), storage, user.id)
    }

    fn event(event_type: &str, object: serde_json::Value) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_checkout_then_update_then_delete() {
        let (handler, storage, user_id) = setup().await;
        let now = Utc::now();

        let completed = event(
            CHECKOUT_COMPLETED,
            json!({
                "client_reference_id": user_id.to_string(),
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": { "tier": "business" }
            }),
        );
        assert_eq!(handler.handle(&completed, now).await.unwrap(), EventOutcome::Applied);
        let sub = storage.get_subscription(user_id).await.unwrap().unwrap();
        assert_eq!(sub.effective_tier(now), Tier::Business);

        let period_end = now.timestamp() + 30 * 24 * 3600;
        let updated = event(
            SUBSCRIPTION_UPDATED,
            json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "past_due",
                "current_period_end": period_end,
                "metadata": {}
            }),
        );
        handler.handle(&updated, now).await.unwrap();
        let sub = storage.get_subscription(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(sub.tier, Tier::Business);
        assert_eq!(sub.effective_tier(now), Tier::Free);

        let deleted = event(
            SUBSCRIPTION_DELETED,
            json!({ "id": "sub_1", "status": "canceled" }),
        );
        handler.handle(&deleted, now).await.unwrap();
        let sub = storage.get_subscription(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert_eq!(sub.effective_tier(now), Tier::Free);
    }

    #[tokio::test]
    async fn test_unknown_user_and_type_are_ignored() {
        let (handler, _, _) = setup().await;
        let now = Utc::now();

        let stray = event(
            CHECKOUT_COMPLETED,
            json!({ "client_reference_id": Uuid::new_v4().to_string(), "metadata": { "tier": "individual" } }),
        );
        assert_eq!(handler.handle(&stray, now).await.unwrap(), EventOutcome::Ignored);

        let other = event("invoice.paid", json!({}));
        assert_eq!(handler.handle(&other, now).await.unwrap(), EventOutcome::Ignored);

        let orphan = event(SUBSCRIPTION_UPDATED, json!({ "id": "sub_x", "status": "active" }));
        assert_eq!(handler.handle(&orphan, now).await.unwrap(), EventOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_malformed_object_is_rejected() {
        let (handler, _, _) = setup().await;
        let bad = event(SUBSCRIPTION_UPDATED, json!({ "status": 5 }));
        assert!(matches!(
            handler.handle(&bad, Utc::now()).await,
            Err(DropError::Validation(_))
        ));
    }
}
