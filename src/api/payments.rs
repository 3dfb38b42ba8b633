use super::header_str;
use crate::auth::AuthUser;
use crate::constants::SIGNATURE_HEADER;
use crate::error::{DropError, Result};
use crate::metrics::PaymentMetrics;
use crate::payments::{CheckoutSession, WebhookReceipt};
use crate::server::AppState;
use crate::tiers::Tier;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub tier: Tier,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
}

pub async fn checkout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>> {
    let client = state
        .payments
        .as_ref()
        .ok_or_else(|| DropError::Config("payments are not configured".to_string()))?;
    let session = client.create_checkout_session(&user, req.tier).await?;
    PaymentMetrics::record_checkout_created();
    Ok(Json(session))
}

/// Signature is checked over the raw body, so it is taken as bytes.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let signature = header_str(&headers, SIGNATURE_HEADER);
    let receipt = state.webhooks.process(signature, &body, Utc::now()).await?;
    Ok(Json(match receipt {
        WebhookReceipt::Duplicate => WebhookResponse {
            received: true,
            duplicate: true,
            outcome: None,
        },
        WebhookReceipt::Processed(outcome) => WebhookResponse {
            received: true,
            duplicate: false,
            outcome: Some(outcome.as_str()),
        },
    }))
}
