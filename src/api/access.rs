use super::header_str;
use crate::access::{AccessSession, ClientInfo, DenyReason};
use crate::constants::{FORWARDED_FOR_HEADER, SESSION_HEADER};
use crate::drops::{DropContent, PublicDropInfo};
use crate::error::{DropError, Result};
use crate::metrics::AccessMetrics;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, USER_AGENT};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        // First hop is the original client
        ip_address: header_str(headers, FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string()),
        user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
    }
}

fn session_token(headers: &HeaderMap) -> Result<&str> {
    header_str(headers, SESSION_HEADER).ok_or(DropError::AccessDenied(DenyReason::InvalidSession))
}

pub async fn public_info(
    State(state): State<AppState>,
    Path(drop_id): Path<Uuid>,
) -> Result<Json<PublicDropInfo>> {
    Ok(Json(state.drops.public_info(drop_id, Utc::now()).await?))
}

pub async fn verify(
    State(state): State<AppState>,
    Path(drop_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<AccessSession>> {
    let client = client_info(&headers);
    let session = state
        .access
        .verify(drop_id, &req.email, &client, Utc::now())
        .instrument(info_span!("verify", %drop_id))
        .await?;
    AccessMetrics::record_sessions_active(state.access.sessions().len());
    Ok(Json(session))
}

pub async fn session(
    State(state): State<AppState>,
    Path(drop_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<AccessSession>> {
    let token = session_token(&headers)?;
    Ok(Json(state.access.resume(drop_id, token, Utc::now()).await?))
}

/// Streams the file (as an attachment) or returns `{ "url": ... }` for link drops.
pub async fn content(
    State(state): State<AppState>,
    Path(drop_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response> {
    let token = session_token(&headers)?;
    let session = state.access.resume(drop_id, token, Utc::now()).await?;

    match state.drops.content(&session).await? {
        DropContent::Url(url) => Ok(Json(serde_json::json!({ "url": url })).into_response()),
        DropContent::File {
            bytes,
            file_name,
            content_type,
        } => {
            AccessMetrics::record_content_served(bytes.len());
            let disposition = format!("attachment; filename=\"{file_name}\"");
            Ok((
                [
                    (CONTENT_TYPE, content_type),
                    (CONTENT_DISPOSITION, disposition),
                    (CACHE_CONTROL, "no-store".to_string()),
                ],
                bytes,
            )
                .into_response())
        }
    }
}
