//! User endpoints. No authentication; users exist so preferences have an
//! owner.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use supra_engine::db::{NewUser, User, UserUpdate};

use crate::{ApiError, ServerState};

pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.db.users().create(&payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list(State(state): State<ServerState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.db.users().list().await?))
}

pub async fn find_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.db.users().find_by_id(id).await?))
}

pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.db.users().update(id, &payload).await?))
}

pub async fn remove(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db.users().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
