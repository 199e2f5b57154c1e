//! Restaurant endpoints, including the conversational search surface.

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::{Json, RequestExt};
use futures::StreamExt;
use serde::Deserialize;
use supra_engine::db::{NewRestaurant, Restaurant, RestaurantUpdate};
use supra_engine::search::{ImageSource, SearchQuery, SearchReply, SelectionContext};

use crate::{ApiError, ServerState};

pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<NewRestaurant>,
) -> Result<(StatusCode, Json<Restaurant>), ApiError> {
    let restaurant = state.db.restaurants().create(&payload).await?;
    Ok((StatusCode::CREATED, Json(restaurant)))
}

pub async fn list(State(state): State<ServerState>) -> Result<Json<Vec<Restaurant>>, ApiError> {
    Ok(Json(state.db.restaurants().list().await?))
}

pub async fn find_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<Restaurant>, ApiError> {
    Ok(Json(state.db.restaurants().find_by_id(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

pub async fn find_by_name(
    State(state): State<ServerState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<Vec<Restaurant>>, ApiError> {
    Ok(Json(state.db.restaurants().find_by_name(&query.name).await?))
}

#[derive(Debug, Deserialize)]
pub struct PriceRangeQuery {
    pub range: i64,
}

pub async fn find_by_price_range(
    State(state): State<ServerState>,
    Query(query): Query<PriceRangeQuery>,
) -> Result<Json<Vec<Restaurant>>, ApiError> {
    Ok(Json(
        state.db.restaurants().find_by_price_range(query.range).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: Option<f64>,
}

pub async fn find_by_location(
    State(state): State<ServerState>,
    Query(query): Query<LocationQuery>,
) -> Result<Json<Vec<Restaurant>>, ApiError> {
    Ok(Json(
        state
            .db
            .restaurants()
            .find_by_location(query.latitude, query.longitude, query.radius.unwrap_or(1.0))
            .await?,
    ))
}

pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<RestaurantUpdate>,
) -> Result<Json<Restaurant>, ApiError> {
    Ok(Json(state.db.restaurants().update(id, &payload).await?))
}

pub async fn remove(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.db.restaurants().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// JSON body of the conversational search endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchBody {
    pub text: Option<String>,
    pub preferences: Option<String>,
    pub limit: Option<usize>,
    pub context: Option<SelectionContext>,
}

/// Conversational search over the catalog.
///
/// Accepts either a JSON body or multipart form data carrying an optional
/// `image` file alongside the text fields. The catalog snapshot is fetched
/// fresh per call.
pub async fn search_ai(
    State(state): State<ServerState>,
    req: Request,
) -> Result<Json<SearchReply>, ApiError> {
    let query = read_search_query(&state, req).await?;
    let catalog = state.db.restaurants().list().await?;

    let reply = state.engine.search(&query, &catalog).await;
    Ok(Json(reply))
}

/// Streaming variant: the response body is the backend's raw fragment
/// sequence; its concatenation follows the same JSON contract as the
/// blocking reply.
pub async fn search_ai_stream(
    State(state): State<ServerState>,
    req: Request,
) -> Result<Response, ApiError> {
    let query = read_search_query(&state, req).await?;
    let catalog = state.db.restaurants().list().await?;

    let stream = state
        .engine
        .search_stream(&query, &catalog)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let body = Body::from_stream(stream.map(|fragment| fragment.map(Bytes::from)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .map_err(|e| ApiError::Upstream(e.to_string()))
}

/// Decode a search request from either content type.
async fn read_search_query(
    state: &ServerState,
    req: Request,
) -> Result<SearchQuery, ApiError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("multipart/form-data"));

    let mut query = SearchQuery::text("");
    query.limit = state.default_limit;

    if !is_multipart {
        let Json(body) = req
            .extract::<Json<SearchBody>, _>()
            .await
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?;

        query.text = body.text.unwrap_or_default();
        query.preferences = body.preferences.filter(|p| !p.is_empty());
        if let Some(limit) = body.limit {
            query.limit = limit;
        }
        query.context = body.context.unwrap_or_default();
        return Ok(query);
    }

    let mut multipart = req
        .extract::<Multipart, _>()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => {
                query.text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            }
            "preferences" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if !value.is_empty() {
                    query.preferences = Some(value);
                }
            }
            "limit" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                query.limit = value
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::BadRequest("invalid limit".to_string()))?;
            }
            "context" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                query.context = serde_json::from_str(&value)
                    .map_err(|e| ApiError::BadRequest(format!("invalid context: {}", e)))?;
            }
            "image" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                query.image = Some(ImageSource::Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            other => {
                tracing::debug!("ignoring unknown multipart field '{}'", other);
            }
        }
    }

    Ok(query)
}
