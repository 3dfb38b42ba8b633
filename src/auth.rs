//! Accounts and bearer-token authentication.

use crate::access::normalize_email;
use crate::domain::{Subscription, User};
use crate::error::{DropError, Result};
use crate::server::AppState;
use crate::storage::Storage;
use crate::tiers::Tier;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::info;
use uuid::Uuid;

pub fn new_api_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("da_{}", hex::encode(bytes))
}

/// Registers a user on the free tier and returns it with its API token.
pub async fn signup(
    storage: &dyn Storage,
    raw_email: &str,
    display_name: Option<String>,
    now: DateTime<Utc>,
) -> Result<User> {
    let email = normalize_email(raw_email)?;
    if storage.get_user_by_email(&email).await?.is_some() {
        return Err(DropError::Validation(format!(
            "an account already exists for {email}"
        )));
    }

    let user = User {
        id: Uuid::new_v4(),
        email,
        display_name: display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        api_token: new_api_token(),
        created_at: now,
    };
    storage.create_user(&user).await?;
    storage
        .upsert_subscription(&Subscription::free(user.id, now))
        .await?;

    info!(user_id = %user.id, "User signed up");
    Ok(user)
}

/// Tier the user's limits are enforced at. No subscription row means free.
pub async fn effective_tier(storage: &dyn Storage, user_id: Uuid, now: DateTime<Utc>) -> Result<Tier> {
    Ok(storage
        .get_subscription(user_id)
        .await?
        .map_or(Tier::Free, |s| s.effective_tier(now)))
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// The user behind the request's `Authorization: Bearer <token>` header.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = DropError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer_token(parts).ok_or(DropError::Unauthorized)?;
        let user = state
            .storage
            .get_user_by_token(token)
            .await?
            .ok_or(DropError::Unauthorized)?;
        Ok(AuthUser(user))
    }
}
