//! Common test utilities

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::util::ServiceExt;
use uuid::Uuid;

use cash_platform::api;
use cash_platform::auth::hash_password;
use cash_platform::config::Config;
use cash_platform::state::AppState;

/// Setup test database - truncate all tables for a fresh state
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query(
        "TRUNCATE TABLE audit_logs, rate_limit_buckets, refresh_tokens, \
         agent_transactions, agent_profiles, transactions, categories, \
         accounts, users CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    pool
}

/// Test configuration: permissive rate limit, log-only OTP delivery
pub fn test_config() -> Config {
    Config {
        database_url: "unused-in-tests".to_string(),
        database_max_connections: 5,
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        jwt_secret: "test-secret".to_string(),
        rate_limit_per_minute: 10_000,
        otp_webhook_url: None,
        places_api_key: None,
        places_base_url: "http://localhost:1".to_string(),
    }
}

/// Build the full application router over the given pool
pub fn test_app(pool: PgPool) -> Router {
    api::create_router(AppState::new(pool, test_config()))
}

/// Same, but with a specific per-minute rate limit
pub fn test_app_with_rate_limit(pool: PgPool, rate_limit_per_minute: i32) -> Router {
    let config = Config {
        rate_limit_per_minute,
        ..test_config()
    };
    api::create_router(AppState::new(pool, config))
}

/// Insert a user with the given role and password, returning their id
pub async fn seed_user(pool: &PgPool, name: &str, email: &str, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    let password_hash = hash_password("correct-horse").expect("hash");

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .execute(pool)
    .await
    .expect("Failed to seed user");

    id
}

/// Insert an account for a user with the given opening balance
pub async fn seed_account(pool: &PgPool, user_id: Uuid, name: &str, balance: &str) -> Uuid {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO accounts (id, user_id, name, balance) VALUES ($1, $2, $3, $4::numeric)",
    )
    .bind(id)
    .bind(user_id)
    .bind(name)
    .bind(balance)
    .execute(pool)
    .await
    .expect("Failed to seed account");

    id
}

/// Insert an agent profile for a user
pub async fn seed_agent_profile(
    pool: &PgPool,
    user_id: Uuid,
    verified: bool,
    available: bool,
    coords: Option<(f64, f64)>,
) -> Uuid {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO agent_profiles
            (id, user_id, is_verified, is_banned, available,
             cash_limit, location_name, latitude, longitude)
        VALUES ($1, $2, $3, FALSE, $4, 50000, 'Test Point', $5, $6)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(verified)
    .bind(available)
    .bind(coords.map(|c| c.0))
    .bind(coords.map(|c| c.1))
    .execute(pool)
    .await
    .expect("Failed to seed agent profile");

    id
}

/// Log in through the API and return the access token
pub async fn login(app: &Router, email: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "password": "correct-horse" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK, "login failed for {email}");

    let json = body_json(response).await;
    json["access_token"].as_str().unwrap().to_string()
}

/// Read a response body as JSON
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).expect("body is not valid JSON")
}

/// Build an unauthenticated JSON request. Content length is declared so the
/// body can be captured for auditing.
pub fn unauth_json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    let serialized = body.to_string();
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-length", serialized.len().to_string())
        .body(Body::from(serialized))
        .unwrap()
}

/// Build an authenticated JSON request
pub fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    let serialized = body.to_string();
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-length", serialized.len().to_string())
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(serialized))
        .unwrap()
}
