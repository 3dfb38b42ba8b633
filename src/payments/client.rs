use crate::config::PaymentsConfig;
use crate::domain::User;
use crate::error::{DropError, Result};
use crate::tiers::Tier;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Creates hosted checkout sessions with the payment provider.
pub struct PaymentsClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    price_individual: Option<String>,
    price_business: Option<String>,
    app_base_url: String,
}

impl PaymentsClient {
    /// `None` when no secret key is configured.
    pub fn from_config(config: &PaymentsConfig, app_base_url: &str) -> Option<Self> {
        let secret_key = config.secret_key.as_deref()?.trim();
        if secret_key.is_empty() {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            price_individual: config.price_individual.clone(),
            price_business: config.price_business.clone(),
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn price_for(&self, tier: Tier) -> Result<&str> {
        let price = match tier {
            Tier::Free => {
                return Err(DropError::Validation(
                    "the free tier cannot be purchased".to_string(),
                ))
            }
            Tier::Individual => self.price_individual.as_deref(),
            Tier::Business => self.price_business.as_deref(),
        };
        price.ok_or_else(|| DropError::Config(format!("no price configured for tier {tier}")))
    }

    /// Form fields for a subscription checkout.
    pub fn checkout_form(&self, user: &User, tier: Tier) -> Result<Vec<(String, String)>> {
        let price = self.price_for(tier)?;
        Ok(vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), price.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("client_reference_id".to_string(), user.id.to_string()),
            ("customer_email".to_string(), user.email.clone()),
            ("metadata[tier]".to_string(), tier.to_string()),
            ("metadata[user_id]".to_string(), user.id.to_string()),
            (
                "subscription_data[metadata][tier]".to_string(),
                tier.to_string(),
            ),
            (
                "subscription_data[metadata][user_id]".to_string(),
                user.id.to_string(),
            ),
            (
                "success_url".to_string(),
                format!("{}/billing?checkout=success", self.app_base_url),
            ),
            (
                "cancel_url".to_string(),
                format!("{}/billing?checkout=cancelled", self.app_base_url),
            ),
        ])
    }

    pub async fn create_checkout_session(&self, user: &User, tier: Tier) -> Result<CheckoutSession> {
        let form = self.checkout_form(user, tier)?;
        let resp = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(DropError::Provider {
                message: format!("checkout creation returned {status}: {detail}"),
            });
        }
        let session: CheckoutSession = resp.json().await?;
        info!(user_id = %user.id, %tier, session_id = %session.id, "Checkout session created");
        Ok(session)
    }
}
