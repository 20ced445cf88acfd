//! Category routes
//!
//! User-defined transaction categories. A category is either INCOME or
//! EXPENSE; transfers are never categorized. Names are unique per user and
//! type, enforced by the database.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::TransactionType;
use crate::error::{on_unique_violation, AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_categories).post(create_category))
}

#[derive(Debug, Deserialize)]
struct CreateCategoryRequest {
    name: String,
    #[serde(rename = "type")]
    category_type: TransactionType,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct CategoryResponse {
    id: Uuid,
    user_id: Uuid,
    name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    category_type: String,
    created_at: DateTime<Utc>,
}

/// GET /categories - list the caller's categories
async fn list_categories(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<CategoryResponse>>> {
    let categories: Vec<CategoryResponse> = sqlx::query_as(
        r#"
        SELECT id, user_id, name, type, created_at
        FROM categories
        WHERE user_id = $1
        ORDER BY type ASC, name ASC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(categories))
}

/// POST /categories - create a category for the caller
async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<CategoryResponse>)> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }

    if req.category_type == TransactionType::Transfer {
        return Err(AppError::Validation(
            "category type must be INCOME or EXPENSE".to_string(),
        ));
    }

    let category: CategoryResponse = sqlx::query_as(
        r#"
        INSERT INTO categories (id, user_id, name, type)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, name, type, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(req.name.trim())
    .bind(req.category_type.as_str())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        on_unique_violation(
            e,
            "categories_user_id_name_type_key",
            AppError::Conflict("category already exists".to_string()),
        )
    })?;

    tracing::info!(category_id = %category.id, user_id = %user.id, "Category created");

    Ok((StatusCode::CREATED, Json(category)))
}
