//! Public read-only joke lookup API.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use blagues_core::dataset::{random_joke, random_joke_by_category};
use blagues_core::{Category, Dataset, DatasetError, Joke, JokeId};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    /// Comma separated category keys to exclude.
    pub disallow: Option<String>,
}

/// Errors surfaced by the lookup endpoints as JSON bodies.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "no matching joke".to_string()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(json!({ "error": true, "message": message }))).into_response()
    }
}

impl From<DatasetError> for ApiError {
    fn from(err: DatasetError) -> Self {
        error!(error = %err, "dataset lookup failed");
        ApiError::Internal
    }
}

fn parse_category(key: &str) -> Result<Category, ApiError> {
    key.parse::<Category>()
        .map_err(|_| ApiError::BadRequest(format!("unknown category '{}'", key.trim())))
}

/// Parse `?disallow=dark,limit`. Every listed key must be a known category.
pub fn parse_disallow(raw: Option<&str>) -> Result<Vec<Category>, ApiError> {
    raw.map(|list| {
        list.split(',')
            .filter(|key| !key.trim().is_empty())
            .map(parse_category)
            .collect()
    })
    .unwrap_or_else(|| Ok(Vec::new()))
}

async fn random_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RandomQuery>,
) -> Result<Json<Joke>, ApiError> {
    let disallow = parse_disallow(query.disallow.as_deref())?;
    let items = state.dataset.all_items().await?;
    random_joke(&items, &disallow)
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn random_by_category_handler(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<Joke>, ApiError> {
    let category = parse_category(&category)?;
    let items = state.dataset.all_items().await?;
    random_joke_by_category(&items, category)
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn by_id_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> Result<Json<Joke>, ApiError> {
    state
        .dataset
        .find_by_id(JokeId(id))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn count_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.dataset.count().await?;
    Ok(Json(json!({ "count": count })))
}

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/random", get(random_handler))
        .route("/api/type/:category/random", get(random_by_category_handler))
        .route("/api/id/:id", get(by_id_handler))
        .route("/api/count", get(count_handler))
}
