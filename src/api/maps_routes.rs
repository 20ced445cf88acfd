//! Maps proxy routes
//!
//! Thin server-side proxy in front of the places API so the key never
//! reaches clients. Responses pass through unmodified.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/places-autocomplete", get(places_autocomplete))
        .route("/place-details", get(place_details))
}

#[derive(Debug, Deserialize)]
struct AutocompleteQuery {
    input: String,
}

#[derive(Debug, Deserialize)]
struct DetailsQuery {
    place_id: String,
}

fn api_key(state: &AppState) -> AppResult<&str> {
    state
        .config
        .places_api_key
        .as_deref()
        .ok_or_else(|| AppError::Upstream("places API key not configured".to_string()))
}

/// GET /maps/places-autocomplete?input=...
async fn places_autocomplete(
    State(state): State<AppState>,
    Query(query): Query<AutocompleteQuery>,
) -> AppResult<Json<Value>> {
    if query.input.trim().is_empty() {
        return Err(AppError::Validation("input must not be empty".to_string()));
    }

    let url = format!("{}/autocomplete/json", state.config.places_base_url);

    let body = state
        .http
        .get(&url)
        .query(&[("input", query.input.as_str()), ("key", api_key(&state)?)])
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("places request failed: {e}")))?
        .error_for_status()
        .map_err(|e| AppError::Upstream(format!("places returned error status: {e}")))?
        .json::<Value>()
        .await
        .map_err(|e| AppError::Upstream(format!("places returned invalid JSON: {e}")))?;

    Ok(Json(body))
}

/// GET /maps/place-details?place_id=...
async fn place_details(
    State(state): State<AppState>,
    Query(query): Query<DetailsQuery>,
) -> AppResult<Json<Value>> {
    if query.place_id.trim().is_empty() {
        return Err(AppError::Validation("place_id must not be empty".to_string()));
    }

    let url = format!("{}/details/json", state.config.places_base_url);

    let body = state
        .http
        .get(&url)
        .query(&[
            ("place_id", query.place_id.as_str()),
            ("key", api_key(&state)?),
        ])
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("places request failed: {e}")))?
        .error_for_status()
        .map_err(|e| AppError::Upstream(format!("places returned error status: {e}")))?
        .json::<Value>()
        .await
        .map_err(|e| AppError::Upstream(format!("places returned invalid JSON: {e}")))?;

    Ok(Json(body))
}
