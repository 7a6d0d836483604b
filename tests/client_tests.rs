//! Client library against a live server on a loopback port.

#![cfg(all(feature = "server", feature = "sqlite"))]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{date, hasher, memory_db, seed_user, test_config, PASSWORD};
use seatgate::client::{
    CheckStatus, ClientErrorCode, LicenseClient, MachineId, PeriodicCheck,
};
use seatgate::errors::LicenseError;
use seatgate::server::database::Database;
use seatgate::server::handlers::AppState;
use seatgate::server::routes::build_router;
use tokio::net::TcpListener;

async fn spawn_server() -> (String, Arc<Database>) {
    let db = memory_db().await;
    seed_user(&db, "ann@example.com", date(2099, 12, 31)).await;

    let state = AppState::with_hasher(db.clone(), test_config(), hasher()).unwrap();
    let app = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{addr}"), db)
}

fn client(base_url: &str, machine: &str) -> LicenseClient {
    LicenseClient::new(base_url, MachineId::new(machine)).unwrap()
}

fn api_error(err: LicenseError) -> seatgate::client::ClientApiError {
    match err {
        LicenseError::ClientApiError(e) => e,
        other => panic!("expected a server refusal, got {other:?}"),
    }
}

#[tokio::test]
async fn verify_and_release_round_trip() {
    let (url, db) = spawn_server().await;
    let laptop = client(&url, "laptop");
    let desktop = client(&url, "desktop");

    let license = laptop.verify("ann@example.com", PASSWORD).await.unwrap();
    assert_eq!(license.valid_until, date(2099, 12, 31));
    assert_eq!(license.status, "active");

    let err = api_error(desktop.verify("ann@example.com", PASSWORD).await.unwrap_err());
    assert_eq!(err.code, ClientErrorCode::MachineConflict);
    assert!(err.is_recoverable());
    assert!(err.last_seen_at.is_some());
    assert_eq!(err.status, Some(403));

    laptop.release("ann@example.com").await.unwrap();
    assert!(db.get_lease("ann@example.com").await.unwrap().is_none());

    desktop.verify("ann@example.com", PASSWORD).await.unwrap();
}

#[tokio::test]
async fn denials_are_typed() {
    let (url, _db) = spawn_server().await;
    let laptop = client(&url, "laptop");

    let err = api_error(laptop.verify("ann@example.com", "wrong").await.unwrap_err());
    assert_eq!(err.code, ClientErrorCode::BadCredentials);
    assert!(!err.is_recoverable());

    let err = api_error(laptop.verify("ghost@example.com", PASSWORD).await.unwrap_err());
    assert_eq!(err.code, ClientErrorCode::NotFound);
    assert!(err.is_license_invalid());
}

#[tokio::test]
async fn release_without_seat_succeeds() {
    let (url, _db) = spawn_server().await;
    client(&url, "laptop")
        .release("ann@example.com")
        .await
        .unwrap();
}

#[tokio::test]
async fn error_report_reaches_server() {
    let (url, db) = spawn_server().await;

    client(&url, "laptop")
        .report_error("ann@example.com", "Window not found")
        .await
        .unwrap();

    let reports = db.list_error_reports().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].message, "Window not found");
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"), "laptop")
        .verify("ann@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::NetworkError(_)));
}

#[tokio::test]
async fn periodic_check_stops_on_denial() {
    let (url, db) = spawn_server().await;
    let check = PeriodicCheck::start_with_interval(
        client(&url, "laptop"),
        "ann@example.com".to_string(),
        PASSWORD.to_string(),
        Duration::from_millis(50),
    );
    let mut rx = check.subscribe();

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(check.status(), CheckStatus::Valid(_)));

    let user = db.get_user_by_email("ann@example.com").await.unwrap().unwrap();
    db.toggle_user_status(user.id).await.unwrap();

    let denied = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if rx.changed().await.is_err() {
                break;
            }
            if matches!(*rx.borrow(), CheckStatus::Denied(_)) {
                break;
            }
        }
    })
    .await;
    assert!(denied.is_ok());

    match check.status() {
        CheckStatus::Denied(err) => assert_eq!(err.code, ClientErrorCode::Inactive),
        other => panic!("expected denial, got {other:?}"),
    }
    assert!(!check.status().is_valid());
    check.stop().await;
}

#[tokio::test]
async fn periodic_check_can_be_stopped() {
    let (url, _db) = spawn_server().await;
    let check = PeriodicCheck::start_with_interval(
        client(&url, "laptop"),
        "ann@example.com".to_string(),
        PASSWORD.to_string(),
        Duration::from_secs(3600),
    );

    assert!(matches!(check.status(), CheckStatus::Pending));
    tokio::time::timeout(Duration::from_secs(5), check.stop())
        .await
        .unwrap();
}

/// A verify endpoint that always fails with a server fault.
async fn spawn_failing_server() -> String {
    use axum::{http::StatusCode, routing::post, Json, Router};

    let app = Router::new().route(
        "/api/auth/verify",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                })),
            )
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn periodic_check_survives_server_faults() {
    let url = spawn_failing_server().await;
    let check = PeriodicCheck::start_with_interval(
        client(&url, "laptop"),
        "ann@example.com".to_string(),
        PASSWORD.to_string(),
        Duration::from_millis(50),
    );
    let mut rx = check.subscribe();

    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(*rx.borrow(), CheckStatus::Unreachable(_)));
    }

    assert!(check.status().is_valid());
    assert!(!check.is_finished());
    check.stop().await;
}
