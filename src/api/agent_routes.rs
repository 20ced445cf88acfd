//! Agent routes
//!
//! Public nearby-agent discovery plus the agent's own profile management.
//! Discovery only ever returns verified, unbanned, available agents; the
//! distance filter runs in process over the (small) candidate set.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::geo::{haversine_km, is_valid_latitude, is_valid_longitude};
use crate::domain::{Amount, Role};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Default search radius in kilometers
const DEFAULT_RADIUS_KM: f64 = 2.0;
const MIN_RADIUS_KM: f64 = 0.1;
const MAX_RADIUS_KM: f64 = 100.0;

/// Public discovery routes, mounted at /agents
pub fn public_router() -> Router<AppState> {
    Router::new().route("/nearby", get(nearby_agents))
}

/// Authenticated self-service routes, mounted at /agent
pub fn self_router() -> Router<AppState> {
    Router::new().route("/profile", post(create_profile).patch(update_profile))
}

// =========================================================================
// Nearby discovery
// =========================================================================

#[derive(Debug, Deserialize)]
struct NearbyQuery {
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct AgentCandidateRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    email: String,
    cash_limit: Decimal,
    location_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Serialize)]
struct NearbyAgent {
    id: Uuid,
    user: AgentUserSummary,
    cash_limit: Decimal,
    location_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_km: Option<f64>,
}

#[derive(Debug, Serialize)]
struct AgentUserSummary {
    id: Uuid,
    name: String,
    email: String,
}

/// GET /agents/nearby - verified, available agents, optionally filtered by
/// distance from a coordinate pair
async fn nearby_agents(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<Json<Vec<NearbyAgent>>> {
    let origin = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => {
            if !is_valid_latitude(lat) {
                return Err(AppError::Validation(
                    "lat must be between -90 and 90".to_string(),
                ));
            }
            if !is_valid_longitude(lng) {
                return Err(AppError::Validation(
                    "lng must be between -180 and 180".to_string(),
                ));
            }
            Some((lat, lng))
        }
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "lat and lng must be provided together".to_string(),
            ))
        }
    };

    let radius = query.radius.unwrap_or(DEFAULT_RADIUS_KM);
    if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&radius) {
        return Err(AppError::Validation(format!(
            "radius must be between {MIN_RADIUS_KM} and {MAX_RADIUS_KM}"
        )));
    }

    let candidates: Vec<AgentCandidateRow> = sqlx::query_as(
        r#"
        SELECT p.id, p.user_id, u.name, u.email,
               p.cash_limit, p.location_name, p.latitude, p.longitude
        FROM agent_profiles p
        JOIN users u ON u.id = p.user_id
        WHERE p.is_verified = TRUE
          AND p.is_banned = FALSE
          AND p.available = TRUE
        ORDER BY u.name ASC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let agents = candidates
        .into_iter()
        .filter_map(|row| {
            let distance_km = match origin {
                Some((lat, lng)) => {
                    // Agents without a published location are excluded from
                    // geographic searches
                    let (agent_lat, agent_lng) = match (row.latitude, row.longitude) {
                        (Some(a), Some(b)) => (a, b),
                        _ => return None,
                    };

                    let d = haversine_km(lat, lng, agent_lat, agent_lng);
                    if d > radius {
                        return None;
                    }
                    Some((d * 100.0).round() / 100.0)
                }
                None => None,
            };

            Some(NearbyAgent {
                id: row.id,
                user: AgentUserSummary {
                    id: row.user_id,
                    name: row.name,
                    email: row.email,
                },
                cash_limit: row.cash_limit,
                location_name: row.location_name,
                latitude: row.latitude,
                longitude: row.longitude,
                distance_km,
            })
        })
        .collect();

    Ok(Json(agents))
}

// =========================================================================
// Agent self-service profile
// =========================================================================

#[derive(Debug, Deserialize)]
struct CreateProfileRequest {
    /// Maximum cash this agent handles, as a decimal string
    cash_limit: String,
    location_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UpdateProfileRequest {
    available: Option<bool>,
    cash_limit: Option<String>,
    location_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub(crate) struct AgentProfileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub is_verified: bool,
    pub is_banned: bool,
    pub available: bool,
    pub cash_limit: Decimal,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), AppError> {
    if let Some(lat) = latitude {
        if !is_valid_latitude(lat) {
            return Err(AppError::Validation(
                "latitude must be between -90 and 90".to_string(),
            ));
        }
    }
    if let Some(lng) = longitude {
        if !is_valid_longitude(lng) {
            return Err(AppError::Validation(
                "longitude must be between -180 and 180".to_string(),
            ));
        }
    }
    Ok(())
}

/// POST /agent/profile - create the caller's agent profile.
/// New profiles start unverified and unavailable.
async fn create_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateProfileRequest>,
) -> AppResult<(StatusCode, Json<AgentProfileResponse>)> {
    user.require_role(Role::Agent)?;
    validate_coordinates(req.latitude, req.longitude)?;

    let cash_limit: Amount = req
        .cash_limit
        .parse()
        .map_err(|e: crate::domain::AmountError| AppError::Validation(e.to_string()))?;

    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM agent_profiles WHERE user_id = $1")
            .bind(user.id)
            .fetch_optional(&state.pool)
            .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("agent profile already exists".to_string()));
    }

    let profile: AgentProfileResponse = sqlx::query_as(
        r#"
        INSERT INTO agent_profiles
            (id, user_id, is_verified, is_banned, available,
             cash_limit, location_name, latitude, longitude)
        VALUES ($1, $2, FALSE, FALSE, FALSE, $3, $4, $5, $6)
        RETURNING id, user_id, is_verified, is_banned, available,
                  cash_limit, location_name, latitude, longitude,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(cash_limit.value())
    .bind(&req.location_name)
    .bind(req.latitude)
    .bind(req.longitude)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(profile_id = %profile.id, user_id = %user.id, "Agent profile created");

    Ok((StatusCode::CREATED, Json(profile)))
}

/// PATCH /agent/profile - partial update of the caller's own profile.
/// Verification and ban state are admin-only and cannot be set here.
async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<AgentProfileResponse>> {
    user.require_role(Role::Agent)?;
    validate_coordinates(req.latitude, req.longitude)?;

    let cash_limit = req
        .cash_limit
        .as_deref()
        .map(str::parse::<Amount>)
        .transpose()
        .map_err(|e: crate::domain::AmountError| AppError::Validation(e.to_string()))?;

    let profile: Option<AgentProfileResponse> = sqlx::query_as(
        r#"
        UPDATE agent_profiles
        SET available = COALESCE($2, available),
            cash_limit = COALESCE($3, cash_limit),
            location_name = COALESCE($4, location_name),
            latitude = COALESCE($5, latitude),
            longitude = COALESCE($6, longitude),
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING id, user_id, is_verified, is_banned, available,
                  cash_limit, location_name, latitude, longitude,
                  created_at, updated_at
        "#,
    )
    .bind(user.id)
    .bind(req.available)
    .bind(cash_limit.map(|a| a.value()))
    .bind(&req.location_name)
    .bind(req.latitude)
    .bind(req.longitude)
    .fetch_optional(&state.pool)
    .await?;

    profile.map(Json).ok_or(AppError::NotFound("Agent profile"))
}
