//! Integration tests for the admin login and admin API.
//!
//! These tests require the `admin-api` feature to be enabled.

#![cfg(all(feature = "admin-api", feature = "sqlite"))]

mod common;

use std::sync::Arc;

use axum::{http::StatusCode, Router};
use chrono::Utc;
use common::{date, hasher, memory_db, seed_user, send, test_config, PASSWORD};
use seatgate::server::database::Database;
use seatgate::server::handlers::AppState;
use seatgate::server::routes::build_router;
use serde_json::{json, Value};

const ADMIN_EMAIL: &str = "root@example.com";
const ADMIN_PASSWORD: &str = "admin-password";

async fn setup() -> (Router, Arc<Database>) {
    let db = memory_db().await;
    let hash = hasher().hash(ADMIN_PASSWORD).unwrap();
    db.create_admin(ADMIN_EMAIL, &hash, Utc::now().naive_utc())
        .await
        .unwrap();

    let state = AppState::with_hasher(db.clone(), test_config(), hasher()).unwrap();
    (build_router(state), db)
}

async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn new_user(email: &str) -> Value {
    json!({
        "name": "Ann Example",
        "email": email,
        "password": PASSWORD,
        "expiresAt": "2099-12-31"
    })
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn login_returns_token_and_audits() {
    let (app, db) = setup().await;
    let token = login(&app).await;
    assert!(!token.is_empty());

    let events = db.list_audit_events(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "admin_login");
    assert_eq!(events[0].actor, ADMIN_EMAIL);
}

#[tokio::test]
async fn login_rejects_wrong_password_and_unknown_admin() {
    let (app, _db) = setup().await;

    for body in [
        json!({ "email": ADMIN_EMAIL, "password": "wrong-password" }),
        json!({ "email": "nobody@example.com", "password": ADMIN_PASSWORD }),
        json!({ "email": ADMIN_EMAIL }),
    ] {
        let (status, resp) = send(&app, "POST", "/api/auth/login", Some(body), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(resp["error"], "bad_credentials");
    }
}

#[tokio::test]
async fn admin_routes_require_token() {
    let (app, _db) = setup().await;

    let (status, body) = send(&app, "GET", "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_token");

    let (status, body) = send(&app, "GET", "/api/stats", None, Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn create_and_list_users() {
    let (app, _db) = setup().await;
    let token = login(&app).await;

    let (status, created) = send(
        &app,
        "POST",
        "/api/users",
        Some(new_user("ann@example.com")),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["email"], "ann@example.com");
    assert_eq!(created["status"], "active");
    assert_eq!(created["expiresAt"], "2099-12-31");
    assert_eq!(created["expired"], false);
    assert!(created["lease"].is_null());
    assert!(created.get("secretHash").is_none());

    let (status, list) = send(&app, "GET", "/api/users", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "Ann Example");
}

#[tokio::test]
async fn created_user_can_verify() {
    let (app, _db) = setup().await;
    let token = login(&app).await;

    send(
        &app,
        "POST",
        "/api/users",
        Some(new_user("ann@example.com")),
        Some(&token),
    )
    .await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/verify",
        Some(json!({ "email": "ann@example.com", "password": PASSWORD, "machineId": "m1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = send(&app, "GET", "/api/users", None, Some(&token)).await;
    assert_eq!(list[0]["lease"]["machineId"], "m1");
    assert_eq!(list[0]["lease"]["online"], true);
}

#[tokio::test]
async fn duplicate_email_is_conflict() {
    let (app, _db) = setup().await;
    let token = login(&app).await;

    send(
        &app,
        "POST",
        "/api/users",
        Some(new_user("ann@example.com")),
        Some(&token),
    )
    .await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        Some(new_user("ann@example.com")),
        Some(&token),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn create_user_validates_fields() {
    let (app, _db) = setup().await;
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        Some(json!({ "name": "Ann", "email": "ann@example.com", "password": PASSWORD })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_field");

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        Some(new_user("not-an-email")),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_field");

    let mut bad_date = new_user("ann@example.com");
    bad_date["expiresAt"] = json!("next tuesday");
    let (status, _) = send(&app, "POST", "/api/users", Some(bad_date), Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_user_keeps_password_when_omitted() {
    let (app, db) = setup().await;
    let token = login(&app).await;
    let user = seed_user(&db, "ann@example.com", date(2099, 12, 31)).await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/users/{}", user.id),
        Some(json!({
            "name": "Ann Renamed",
            "email": "ann@example.com",
            "expiresAt": "2100-01-31"
        })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ann Renamed");
    assert_eq!(body["expiresAt"], "2100-01-31");

    let stored = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.secret_hash, user.secret_hash);
}

#[tokio::test]
async fn update_unknown_user_is_404() {
    let (app, _db) = setup().await;
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        "PUT",
        "/api/users/999",
        Some(json!({ "name": "X", "email": "x@example.com", "expiresAt": "2099-01-01" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn toggle_status_flips_and_blocks_verify() {
    let (app, db) = setup().await;
    let token = login(&app).await;
    let user = seed_user(&db, "ann@example.com", date(2099, 12, 31)).await;

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/users/{}/toggle-status", user.id),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "inactive");

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/verify",
        Some(json!({ "email": "ann@example.com", "password": PASSWORD, "machineId": "m1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "inactive");

    let (_, body) = send(
        &app,
        "PATCH",
        &format!("/api/users/{}/toggle-status", user.id),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn delete_user_removes_lease() {
    let (app, db) = setup().await;
    let token = login(&app).await;
    let user = seed_user(&db, "ann@example.com", date(2099, 12, 31)).await;

    send(
        &app,
        "POST",
        "/api/auth/verify",
        Some(json!({ "email": "ann@example.com", "password": PASSWORD, "machineId": "m1" })),
        None,
    )
    .await;
    assert!(db.get_lease("ann@example.com").await.unwrap().is_some());

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/api/users/{}", user.id),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "deleted");

    assert!(db.get_user(user.id).await.unwrap().is_none());
    assert!(db.get_lease("ann@example.com").await.unwrap().is_none());

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/users/{}", user.id),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_actions_are_audited() {
    let (app, db) = setup().await;
    let token = login(&app).await;

    let (_, created) = send(
        &app,
        "POST",
        "/api/users",
        Some(new_user("ann@example.com")),
        Some(&token),
    )
    .await;
    let id = created["id"].as_i64().unwrap();
    send(
        &app,
        "PATCH",
        &format!("/api/users/{id}/toggle-status"),
        None,
        Some(&token),
    )
    .await;
    send(
        &app,
        "DELETE",
        &format!("/api/users/{id}"),
        None,
        Some(&token),
    )
    .await;

    let (status, logs) = send(&app, "GET", "/api/logs", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = logs
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["kind"].as_str())
        .collect();
    for expected in ["admin_login", "user_created", "user_status_changed", "user_deleted"] {
        assert!(kinds.contains(&expected), "missing {expected} in {kinds:?}");
    }

    let events = db.list_audit_events(100).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.kind == "user_deleted" && e.actor == "ann@example.com"));
}

// ============================================================================
// Dashboard
// ============================================================================

#[tokio::test]
async fn stats_count_users_and_online_seats() {
    let (app, db) = setup().await;
    let token = login(&app).await;
    seed_user(&db, "ann@example.com", date(2099, 12, 31)).await;
    let bob = seed_user(&db, "bob@example.com", date(2099, 12, 31)).await;
    seed_user(&db, "old@example.com", date(2000, 1, 1)).await;
    db.toggle_user_status(bob.id).await.unwrap();

    send(
        &app,
        "POST",
        "/api/auth/verify",
        Some(json!({ "email": "ann@example.com", "password": PASSWORD, "machineId": "m1" })),
        None,
    )
    .await;

    let (status, stats) = send(&app, "GET", "/api/stats", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalUsers"], 3);
    assert_eq!(stats["inactiveUsers"], 1);
    assert_eq!(stats["activeUsers"], 2);
    assert_eq!(stats["expiredLicenses"], 1);
    assert_eq!(stats["onlineUsers"], 1);
}

#[tokio::test]
async fn error_reports_can_be_listed_and_resolved() {
    let (app, db) = setup().await;
    let token = login(&app).await;
    seed_user(&db, "ann@example.com", date(2099, 12, 31)).await;

    send(
        &app,
        "POST",
        "/api/error-reports",
        Some(json!({ "email": "ann@example.com", "message": "Clicker lost focus" })),
        None,
    )
    .await;

    let (status, reports) = send(&app, "GET", "/api/error-reports", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["userName"], "Test User");
    assert_eq!(reports[0]["resolved"], false);
    let id = reports[0]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/error-reports/{id}/resolve"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "resolved");

    let (_, reports) = send(&app, "GET", "/api/error-reports", None, Some(&token)).await;
    assert_eq!(reports[0]["resolved"], true);

    let (status, _) = send(
        &app,
        "PATCH",
        "/api/error-reports/999/resolve",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
