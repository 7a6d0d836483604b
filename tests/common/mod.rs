//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use seatgate::config::{DatabaseConfig, LeaseConfig, SeatgateConfig};
use seatgate::server::database::{Database, NewUser, User};
use seatgate::server::secrets::SecretHasher;
use seatgate::server::verifier::LicenseVerifier;

pub const PASSWORD: &str = "correct-horse";
pub const JWT_SECRET: &str = "integration-test-secret-with-enough-entropy";

/// Cheap argon2 parameters so tests stay fast.
pub fn hasher() -> SecretHasher {
    SecretHasher::with_params(8, 1, 1).unwrap()
}

/// Fresh, migrated in-memory SQLite database.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn memory_db() -> Arc<Database> {
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        sqlite_url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..Default::default()
    };
    let db = Database::connect(&config).await.unwrap();
    db.migrate().await.unwrap();
    Arc::new(db)
}

/// Fresh, migrated SQLite database file under `dir`, shared by a pool of
/// `connections` connections like a deployed server.
pub async fn file_db(dir: &Path, connections: u32) -> Arc<Database> {
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        sqlite_url: format!("sqlite://{}", dir.join("seatgate.db").display()),
        max_connections: connections,
        ..Default::default()
    };
    let db = Database::connect(&config).await.unwrap();
    db.migrate().await.unwrap();
    Arc::new(db)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, s).unwrap()
}

pub async fn seed_user(db: &Database, email: &str, expires_at: NaiveDate) -> User {
    let secret_hash = hasher().hash(PASSWORD).unwrap();
    db.create_user(
        NewUser {
            name: "Test User".to_string(),
            email: email.to_string(),
            secret_hash,
            expires_at,
        },
        at(2025, 1, 1, 0, 0, 0),
    )
    .await
    .unwrap()
}

pub fn verifier(db: Arc<Database>, window_secs: u64, reap_on_verify: bool) -> LicenseVerifier {
    let lease = LeaseConfig {
        inactivity_window_secs: window_secs,
        reap_on_verify,
    };
    LicenseVerifier::new(db, hasher(), &lease)
}

/// Server config with auth on and a fixed signing secret.
pub fn test_config() -> SeatgateConfig {
    let mut config = SeatgateConfig::default();
    config.auth.enabled = true;
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.rate_limit.enabled = false;
    config
}

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

/// Send a JSON request through the router and decode the JSON response.
///
/// An empty response body decodes as `Value::Null`.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("Content-Type", "application/json");
    }
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let body = body
        .map(|v| Body::from(serde_json::to_vec(&v).unwrap()))
        .unwrap_or_else(Body::empty);
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
