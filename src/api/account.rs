use crate::auth::{self, AuthUser};
use crate::domain::{Subscription, User};
use crate::error::Result;
use crate::guard::{upgrade_prompts, UpgradePrompt};
use crate::server::AppState;
use crate::tiers::{Tier, TierLimits};
use crate::usage::UsageSnapshot;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user: User,
    /// Only ever returned here.
    pub api_token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub tier: Tier,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub tier: Tier,
    pub usage: UsageSnapshot,
    pub limits: TierLimits,
    pub prompts: Vec<UpgradePrompt>,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>)> {
    let user = auth::signup(
        state.storage.as_ref(),
        &req.email,
        req.display_name,
        Utc::now(),
    )
    .await?;
    let api_token = user.api_token.clone();
    Ok((StatusCode::CREATED, Json(SignupResponse { user, api_token })))
}

pub async fn me(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<MeResponse>> {
    let now = Utc::now();
    let subscription = state.storage.get_subscription(user.id).await?;
    let tier = subscription
        .as_ref()
        .map_or(Tier::Free, |s| s.effective_tier(now));
    Ok(Json(MeResponse {
        user,
        tier,
        subscription,
    }))
}

pub async fn usage(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UsageResponse>> {
    let now = Utc::now();
    let tier = auth::effective_tier(state.storage.as_ref(), user.id, now).await?;
    let usage = state.usage.snapshot(user.id, now).await?;
    Ok(Json(UsageResponse {
        tier,
        prompts: upgrade_prompts(tier, &usage),
        limits: tier.limits(),
        usage,
    }))
}
