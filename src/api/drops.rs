use super::header_str;
use crate::auth::AuthUser;
use crate::constants::{DEFAULT_CONTENT_TYPE, FILE_NAME_HEADER};
use crate::domain::DropRecord;
use crate::drops::{CreateDropRequest, DropAnalytics, DropDetails, RecipientsAdded};
use crate::error::{DropError, Result};
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AddRecipientsRequest {
    pub emails: Vec<String>,
}

pub async fn create_drop(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateDropRequest>,
) -> Result<(StatusCode, Json<DropDetails>)> {
    let details = state.drops.create(&user, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

pub async fn list_drops(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<DropRecord>>> {
    Ok(Json(state.drops.list(&user).await?))
}

pub async fn get_drop(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(drop_id): Path<Uuid>,
) -> Result<Json<DropDetails>> {
    Ok(Json(state.drops.get(&user, drop_id).await?))
}

pub async fn delete_drop(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(drop_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.drops.delete(&user, drop_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(drop_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DropRecord>> {
    let max = state.config.server.max_upload_bytes;
    if body.len() as u64 > max {
        return Err(DropError::PayloadTooLarge {
            size: body.len() as u64,
            max,
        });
    }
    let file_name = header_str(&headers, FILE_NAME_HEADER).unwrap_or("file");
    let content_type = header_str(&headers, CONTENT_TYPE.as_str()).unwrap_or(DEFAULT_CONTENT_TYPE);

    let drop = state
        .drops
        .upload_file(&user, drop_id, file_name, content_type, &body, Utc::now())
        .instrument(info_span!("upload", %drop_id, bytes = body.len()))
        .await?;
    Ok(Json(drop))
}

pub async fn add_recipients(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(drop_id): Path<Uuid>,
    Json(req): Json<AddRecipientsRequest>,
) -> Result<Json<RecipientsAdded>> {
    let added = state
        .drops
        .add_recipients(&user, drop_id, &req.emails, Utc::now())
        .await?;
    Ok(Json(added))
}

pub async fn remove_recipient(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((drop_id, email)): Path<(Uuid, String)>,
) -> Result<StatusCode> {
    state.drops.remove_recipient(&user, drop_id, &email).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn analytics(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(drop_id): Path<Uuid>,
) -> Result<Json<DropAnalytics>> {
    Ok(Json(state.drops.analytics(&user, drop_id, Utc::now()).await?))
}
