//! Lease acquisition under contention on a file-backed, pooled database.

#![cfg(all(feature = "server", feature = "sqlite"))]

mod common;

use std::sync::Arc;

use common::{at, date, file_db, seed_user, verifier, PASSWORD};
use seatgate::server::verifier::{DenyReason, LicenseVerifier, VerifyOutcome};
use tempfile::TempDir;

const WINDOW: u64 = 3600;
const POOL_SIZE: u32 = 5;

fn is_conflict(outcome: &VerifyOutcome) -> bool {
    matches!(
        outcome,
        VerifyOutcome::Denied(DenyReason::MachineConflict { .. })
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_users_verify_concurrently_without_store_errors() {
    let dir = TempDir::new().unwrap();
    let db = file_db(dir.path(), POOL_SIZE).await;
    let emails: Vec<String> = (0..40).map(|i| format!("user{i}@example.com")).collect();
    for email in &emails {
        seed_user(&db, email, date(2025, 12, 31)).await;
    }
    let verifier = Arc::new(verifier(db.clone(), WINDOW, true));
    let now = at(2025, 6, 1, 12, 0, 0);

    let tasks: Vec<_> = emails
        .iter()
        .enumerate()
        .map(|(i, email)| {
            let verifier = verifier.clone();
            let email = email.clone();
            tokio::spawn(async move {
                let machine = format!("machine-{i}");
                verifier
                    .verify_at(&email, PASSWORD, Some(&machine), now)
                    .await
            })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.unwrap().expect("verify must not hit a store error");
        assert!(outcome.is_allowed());
    }
    assert_eq!(db.list_leases().await.unwrap().len(), emails.len());
}

/// Two verifiers over one database file stand in for two server processes:
/// their in-process identity locks do not see each other.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_machines_get_one_grant_and_one_conflict() {
    let dir = TempDir::new().unwrap();
    let db = file_db(dir.path(), POOL_SIZE).await;
    let first = Arc::new(verifier(db.clone(), WINDOW, true));
    let second = Arc::new(verifier(db.clone(), WINDOW, true));
    let now = at(2025, 6, 1, 12, 0, 0);

    for round in 0..20 {
        let email = format!("race{round}@example.com");
        seed_user(&db, &email, date(2025, 12, 31)).await;

        let spawn = |verifier: Arc<LicenseVerifier>, machine: &'static str| {
            let email = email.clone();
            tokio::spawn(async move {
                verifier
                    .verify_at(&email, PASSWORD, Some(machine), now)
                    .await
            })
        };
        let a = spawn(first.clone(), "m1");
        let b = spawn(second.clone(), "m2");

        let a = a.await.unwrap().expect("verify must not hit a store error");
        let b = b.await.unwrap().expect("verify must not hit a store error");

        let outcomes = [&a, &b];
        assert_eq!(
            outcomes.iter().filter(|o| o.is_allowed()).count(),
            1,
            "round {round}: exactly one machine gets the seat"
        );
        assert_eq!(
            outcomes.iter().filter(|o| is_conflict(o)).count(),
            1,
            "round {round}: the other machine sees a conflict"
        );
        assert!(db.get_lease(&email).await.unwrap().is_some());
    }
}
