//! API Integration Tests
//!
//! End-to-end tests over the full router with a real PostgreSQL instance.
//! Run with `cargo test -- --ignored` after applying migrations and setting
//! DATABASE_URL.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tower::util::ServiceExt;
use uuid::Uuid;

mod common;

use common::{
    body_json, json_request, login, seed_account, seed_agent_profile, seed_user, setup_test_db,
    test_app, test_app_with_rate_limit, unauth_json_request,
};

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_signup_and_duplicate_email() {
    let pool = setup_test_db().await;
    let app = test_app(pool);

    let signup = |email: &str| {
        Request::builder()
            .method("POST")
            .uri("/auth/signup")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "name": "Alice",
                    "email": email,
                    "password": "correct-horse",
                })
                .to_string(),
            ))
            .unwrap()
    };

    let response = app.clone().oneshot(signup("alice@example.com")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["email"], "alice@example.com");
    assert_eq!(json["role"], "user");
    assert!(json.get("password_hash").is_none());

    // Same email again, case-insensitively
    let response = app.clone().oneshot(signup("Alice@Example.com")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "email_taken");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_transfer_conserves_total_balance() {
    let pool = setup_test_db().await;

    let user_id = seed_user(&pool, "Alice", "alice@example.com", "user").await;
    let checking = seed_account(&pool, user_id, "Checking", "1000.00").await;
    let savings = seed_account(&pool, user_id, "Savings", "250.00").await;

    let app = test_app(pool.clone());
    let token = login(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions/transfer",
            &token,
            json!({
                "from_account_id": checking,
                "to_account_id": savings,
                "amount": "300.00",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["debit"]["type"], "TRANSFER");
    assert_eq!(json["debit"]["status"], "APPROVED");
    assert_eq!(json["credit"]["account_id"], savings.to_string());

    let balances: Vec<(Uuid, Decimal)> =
        sqlx::query_as("SELECT id, balance FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&pool)
            .await
            .unwrap();

    let total: Decimal = balances.iter().map(|(_, b)| *b).sum();
    assert_eq!(total, dec!(1250.00));

    for (id, balance) in balances {
        if id == checking {
            assert_eq!(balance, dec!(700.00));
        } else {
            assert_eq!(balance, dec!(550.00));
        }
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_transfer_insufficient_funds_rejected() {
    let pool = setup_test_db().await;

    let user_id = seed_user(&pool, "Alice", "alice@example.com", "user").await;
    let checking = seed_account(&pool, user_id, "Checking", "100.00").await;
    let savings = seed_account(&pool, user_id, "Savings", "0.00").await;

    let app = test_app(pool.clone());
    let token = login(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions/transfer",
            &token,
            json!({
                "from_account_id": checking,
                "to_account_id": savings,
                "amount": "100.01",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "insufficient_funds");

    // Nothing moved, no ledger rows written
    let balance: Decimal = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
        .bind(checking)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(balance, dec!(100.00));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_cash_request_confirm_and_double_confirm() {
    let pool = setup_test_db().await;

    seed_user(&pool, "Alice", "alice@example.com", "user").await;
    let agent_id = seed_user(&pool, "Bob", "bob@example.com", "agent").await;
    seed_agent_profile(&pool, agent_id, true, true, None).await;

    let app = test_app(pool.clone());
    let user_token = login(&app, "alice@example.com").await;
    let agent_token = login(&app, "bob@example.com").await;

    // User requests cash from the agent
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions/request",
            &user_token,
            json!({ "agent_id": agent_id, "amount": 500 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["otp"], "SENT");
    let transaction_id: Uuid = json["id"].as_str().unwrap().parse().unwrap();

    // The passcode only exists server-side: six digits, valid for ten minutes
    let (otp, otp_expires_at): (String, DateTime<Utc>) =
        sqlx::query_as("SELECT otp, otp_expires_at FROM agent_transactions WHERE id = $1")
            .bind(transaction_id)
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(otp.len(), 6);
    assert!(otp.chars().all(|c| c.is_ascii_digit()));

    let ttl_secs = (otp_expires_at - Utc::now()).num_seconds();
    assert!(
        (540..=600).contains(&ttl_secs),
        "unexpected passcode ttl: {ttl_secs}s"
    );

    // User cannot confirm, even with the right passcode
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions/confirm",
            &user_token,
            json!({ "transaction_id": transaction_id, "otp": otp }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Wrong passcode rejected
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions/confirm",
            &agent_token,
            json!({ "transaction_id": transaction_id, "otp": "000000" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "invalid_otp");

    // Assigned agent confirms
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions/confirm",
            &agent_token,
            json!({ "transaction_id": transaction_id, "otp": otp }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "confirmed");
    assert!(json["completed_at"].is_string());

    // Second confirmation with the same passcode fails
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions/confirm",
            &agent_token,
            json!({ "transaction_id": transaction_id, "otp": otp }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "already_completed");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_expired_otp_rejected() {
    let pool = setup_test_db().await;

    let user_id = seed_user(&pool, "Alice", "alice@example.com", "user").await;
    let agent_id = seed_user(&pool, "Bob", "bob@example.com", "agent").await;
    seed_agent_profile(&pool, agent_id, true, true, None).await;

    // Pending transaction whose passcode already expired
    let transaction_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO agent_transactions
            (id, user_id, agent_id, amount, status, otp, otp_expires_at)
        VALUES ($1, $2, $3, 500, 'pending', '123456', NOW() - INTERVAL '1 minute')
        "#,
    )
    .bind(transaction_id)
    .bind(user_id)
    .bind(agent_id)
    .execute(&pool)
    .await
    .unwrap();

    let app = test_app(pool.clone());
    let agent_token = login(&app, "bob@example.com").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions/confirm",
            &agent_token,
            json!({ "transaction_id": transaction_id, "otp": "123456" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "otp_expired");

    // Row untouched
    let status: String =
        sqlx::query_scalar("SELECT status FROM agent_transactions WHERE id = $1")
            .bind(transaction_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "pending");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_refresh_token_single_use() {
    let pool = setup_test_db().await;
    seed_user(&pool, "Alice", "alice@example.com", "user").await;

    let app = test_app(pool);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login-with-refresh")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "email": "alice@example.com", "password": "correct-horse" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let refresh_token = json["refresh_token"].as_str().unwrap().to_string();

    let refresh_request = |token: &str| {
        Request::builder()
            .method("POST")
            .uri("/auth/refresh")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "refresh_token": token }).to_string()))
            .unwrap()
    };

    // First use rotates
    let response = app.clone().oneshot(refresh_request(&refresh_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let rotated = json["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(rotated, refresh_token);
    assert!(json["access_token"].as_str().is_some());

    // Replaying the consumed token fails
    let response = app.clone().oneshot(refresh_request(&refresh_token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "invalid_refresh");

    // The replacement still works
    let response = app.clone().oneshot(refresh_request(&rotated)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_nearby_agents_filters_by_state_and_distance() {
    let pool = setup_test_db().await;

    let near = seed_user(&pool, "Near Agent", "near@example.com", "agent").await;
    let far = seed_user(&pool, "Far Agent", "far@example.com", "agent").await;
    let hidden = seed_user(&pool, "Hidden Agent", "hidden@example.com", "agent").await;

    // Dhaka city center vs. a point ~300km away; hidden agent is unverified
    seed_agent_profile(&pool, near, true, true, Some((23.8103, 90.4125))).await;
    seed_agent_profile(&pool, far, true, true, Some((21.4272, 92.0058))).await;
    seed_agent_profile(&pool, hidden, false, true, Some((23.8103, 90.4125))).await;

    let app = test_app(pool);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/agents/nearby?lat=23.81&lng=90.41&radius=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let agents = json.as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["user"]["name"], "Near Agent");
    assert!(agents[0]["distance_km"].as_f64().unwrap() < 10.0);

    // Unpaired coordinates are rejected
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/agents/nearby?lat=23.81")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_admin_verifies_agent() {
    let pool = setup_test_db().await;

    let admin_id = seed_user(&pool, "Root", "admin@example.com", "admin").await;
    seed_user(&pool, "Alice", "alice@example.com", "user").await;
    let agent_id = seed_user(&pool, "Bob", "bob@example.com", "agent").await;
    let profile_id = seed_agent_profile(&pool, agent_id, false, true, None).await;

    let app = test_app(pool.clone());
    let admin_token = login(&app, "admin@example.com").await;
    let user_token = login(&app, "alice@example.com").await;

    // Non-admin is refused
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/admin/agents/{profile_id}"),
            &user_token,
            json!({ "is_verified": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin verifies
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/admin/agents/{profile_id}"),
            &admin_token,
            json!({ "is_verified": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["is_verified"], true);
    assert_eq!(json["user"]["email"], "bob@example.com");

    // The toggle was audited and attributed to the admin
    let audited: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_logs \
         WHERE method = 'PATCH' AND path = '/admin/agents/:id' \
           AND status_code = 200 AND user_id = $1",
    )
    .bind(admin_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(audited, 1);

    // The refused attempt was audited too
    let refused: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_logs \
         WHERE method = 'PATCH' AND path = '/admin/agents/:id' AND status_code = 403",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(refused, 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_mutating_requests_are_audited_with_redacted_body() {
    let pool = setup_test_db().await;
    let app = test_app(pool.clone());

    let response = app
        .clone()
        .oneshot(unauth_json_request(
            "POST",
            "/auth/signup",
            json!({
                "name": "Alice",
                "email": "alice@example.com",
                "password": "correct-horse",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let (request_id, status_code, duration_ms, body): (
        Option<Uuid>,
        i32,
        i64,
        serde_json::Value,
    ) = sqlx::query_as(
        "SELECT request_id, status_code, duration_ms, body FROM audit_logs \
         WHERE method = 'POST' AND path = '/auth/signup'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert!(request_id.is_some());
    assert_eq!(status_code, 201);
    assert!(duration_ms >= 0);
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["password"], "[redacted]");

    // Reads leave no trail
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/agents/nearby")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let reads: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE method = 'GET'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(reads, 0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_rate_limit_trips_while_health_stays_open() {
    let pool = setup_test_db().await;
    let app = test_app_with_rate_limit(pool, 2);

    let nearby = || {
        Request::builder()
            .method("GET")
            .uri("/agents/nearby")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(nearby()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Request three in the same window is refused
    let response = app.clone().oneshot(nearby()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "rate_limit_exceeded");

    // Liveness checks never count against the window
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_pending_transaction_approval_applies_balance() {
    let pool = setup_test_db().await;

    let user_id = seed_user(&pool, "Alice", "alice@example.com", "user").await;
    let agent_id = seed_user(&pool, "Bob", "bob@example.com", "agent").await;
    seed_agent_profile(&pool, agent_id, true, true, None).await;
    let account = seed_account(&pool, user_id, "Checking", "100.00").await;

    let app = test_app(pool.clone());
    let user_token = login(&app, "alice@example.com").await;
    let agent_token = login(&app, "bob@example.com").await;

    // User records a pending income entry
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/transactions",
            &user_token,
            json!({
                "account_id": account,
                "type": "INCOME",
                "amount": "40.00",
                "description": "Salary",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "PENDING");
    let tx_id: Uuid = json["id"].as_str().unwrap().parse().unwrap();

    // Balance unchanged until approval
    let balance: Decimal = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
        .bind(account)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(balance, dec!(100.00));

    // Agent approves; second approval fails
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/transactions/{tx_id}/approve"),
            &agent_token,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let balance: Decimal = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
        .bind(account)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(balance, dec!(140.00));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/transactions/{tx_id}/approve"),
            &agent_token,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "already_completed");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_accounts_are_owner_scoped() {
    let pool = setup_test_db().await;

    let alice = seed_user(&pool, "Alice", "alice@example.com", "user").await;
    seed_user(&pool, "Mallory", "mallory@example.com", "user").await;
    let account = seed_account(&pool, alice, "Checking", "100.00").await;

    let app = test_app(pool);
    let mallory_token = login(&app, "mallory@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/accounts/{account}"))
                .header("authorization", format!("Bearer {mallory_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Someone else's account is indistinguishable from a missing one
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
