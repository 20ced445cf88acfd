//! API module
//!
//! HTTP endpoint definitions and middleware.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware as axum_middleware, Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod account_routes;
pub mod admin_routes;
pub mod agent_routes;
pub mod auth_routes;
pub mod category_routes;
pub mod maps_routes;
pub mod middleware;
pub mod transaction_routes;

/// Build the full application router.
///
/// Layers run outermost first: request ids, tracing, logging, metrics, then
/// on the API routes audit capture and rate limiting. Health and metrics sit
/// outside the rate limiter so probes and scrapes never get throttled, and
/// outside the audit layer because they never mutate anything.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", auth_routes::router())
        .nest("/accounts", account_routes::router())
        .nest("/categories", category_routes::router())
        .nest("/transactions", transaction_routes::router())
        .nest("/agents", agent_routes::public_router())
        .nest("/agent", agent_routes::self_router())
        .nest("/admin", admin_routes::router())
        .nest("/maps", maps_routes::router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::audit_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .merge(api)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// GET /health - liveness plus a database round trip
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match crate::db::verify_connection(&state.pool).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true, "db": true }))),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "db": false })),
            )
        }
    }
}

/// GET /metrics - Prometheus text exposition
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
}
