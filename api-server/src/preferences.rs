//! User preference endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use supra_engine::db::{NewPreference, PreferenceUpdate, UserPreference};

use crate::{ApiError, ServerState};

pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<NewPreference>,
) -> Result<(StatusCode, Json<UserPreference>), ApiError> {
    let preference = state.db.preferences().create(&payload).await?;
    Ok((StatusCode::CREATED, Json(preference)))
}

pub async fn list(
    State(state): State<ServerState>,
) -> Result<Json<Vec<UserPreference>>, ApiError> {
    Ok(Json(state.db.preferences().list().await?))
}

pub async fn find_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<UserPreference>, ApiError> {
    Ok(Json(state.db.preferences().find_by_id(id).await?))
}

pub async fn find_by_user(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<UserPreference>>, ApiError> {
    Ok(Json(state.db.preferences().find_by_user(user_id).await?))
}

pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<PreferenceUpdate>,
) -> Result<Json<UserPreference>, ApiError> {
    Ok(Json(state.db.preferences().update(id, &payload).await?))
}

pub async fn remove(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db.preferences().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_by_user(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db.preferences().delete_by_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
