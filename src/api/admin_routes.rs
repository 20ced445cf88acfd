//! Admin routes
//!
//! Agent verification, banning, and availability toggles. Every route
//! requires the admin role.

use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::Role;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/:id", patch(update_agent))
}

#[derive(Debug, sqlx::FromRow)]
struct AdminAgentRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    email: String,
    is_verified: bool,
    is_banned: bool,
    available: bool,
    cash_limit: Decimal,
    location_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct AdminAgentView {
    id: Uuid,
    user: AdminAgentUser,
    is_verified: bool,
    is_banned: bool,
    available: bool,
    cash_limit: Decimal,
    location_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct AdminAgentUser {
    id: Uuid,
    name: String,
    email: String,
}

impl From<AdminAgentRow> for AdminAgentView {
    fn from(row: AdminAgentRow) -> Self {
        AdminAgentView {
            id: row.id,
            user: AdminAgentUser {
                id: row.user_id,
                name: row.name,
                email: row.email,
            },
            is_verified: row.is_verified,
            is_banned: row.is_banned,
            available: row.available,
            cash_limit: row.cash_limit,
            location_name: row.location_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateAgentRequest {
    is_verified: Option<bool>,
    is_banned: Option<bool>,
    available: Option<bool>,
}

/// GET /admin/agents - every agent profile, regardless of state
async fn list_agents(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<AdminAgentView>>> {
    user.require_role(Role::Admin)?;

    let rows: Vec<AdminAgentRow> = sqlx::query_as(
        r#"
        SELECT p.id, p.user_id, u.name, u.email,
               p.is_verified, p.is_banned, p.available,
               p.cash_limit, p.location_name, p.created_at, p.updated_at
        FROM agent_profiles p
        JOIN users u ON u.id = p.user_id
        ORDER BY p.created_at ASC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(AdminAgentView::from).collect()))
}

/// PATCH /admin/agents/:id - toggle verification, ban, or availability
async fn update_agent(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAgentRequest>,
) -> AppResult<Json<AdminAgentView>> {
    user.require_role(Role::Admin)?;

    if req.is_verified.is_none() && req.is_banned.is_none() && req.available.is_none() {
        return Err(AppError::Validation(
            "at least one of is_verified, is_banned, available is required".to_string(),
        ));
    }

    let row: Option<AdminAgentRow> = sqlx::query_as(
        r#"
        UPDATE agent_profiles p
        SET is_verified = COALESCE($2, is_verified),
            is_banned = COALESCE($3, is_banned),
            available = COALESCE($4, available),
            updated_at = NOW()
        FROM users u
        WHERE p.id = $1 AND u.id = p.user_id
        RETURNING p.id, p.user_id, u.name, u.email,
                  p.is_verified, p.is_banned, p.available,
                  p.cash_limit, p.location_name, p.created_at, p.updated_at
        "#,
    )
    .bind(id)
    .bind(req.is_verified)
    .bind(req.is_banned)
    .bind(req.available)
    .fetch_optional(&state.pool)
    .await?;

    let row = row.ok_or(AppError::NotFound("Agent profile"))?;

    tracing::info!(profile_id = %id, admin_id = %user.id, "Agent profile updated by admin");

    Ok(Json(row.into()))
}
