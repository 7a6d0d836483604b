//! Configuration loading from environment variables.
//!
//! These tests mutate process environment, so they run serially.

use std::env;

use serial_test::serial;

use seatgate::config::SeatgateConfig;

const VARS: &[&str] = &[
    "SEATGATE_SERVER_HOST",
    "SEATGATE_SERVER_PORT",
    "SEATGATE_DATABASE_TYPE",
    "SEATGATE_DATABASE_URL",
    "SEATGATE_LOG_LEVEL",
    "SEATGATE_AUTH_ENABLED",
    "SEATGATE_JWT_SECRET",
    "SEATGATE_TOKEN_EXPIRATION_SECS",
    "SEATGATE_LEASE_INACTIVITY_SECS",
    "SEATGATE_AUDIT_VERIFICATIONS",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn defaults_without_environment() {
    clear_env();

    let config = SeatgateConfig::load().unwrap();
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.database.db_type, "sqlite");
    assert_eq!(config.lease.inactivity_window_secs, 3600);
    assert!(config.lease.reap_on_verify);
    assert_eq!(config.auth.token_expiration_secs, 86400);
    assert!(!config.audit.log_verifications);
    assert!(config.rate_limit.enabled);
    assert!(!config.jobs.lease_reaper_enabled);
}

#[test]
#[serial]
fn auth_needs_secret_by_default() {
    clear_env();

    let config = SeatgateConfig::load().unwrap();
    assert!(config.validate().is_err());

    env::set_var("SEATGATE_JWT_SECRET", "a-long-enough-secret");
    let config = SeatgateConfig::load().unwrap();
    assert!(config.validate().is_ok());

    clear_env();
}

#[test]
#[serial]
fn environment_overrides_apply() {
    clear_env();
    env::set_var("SEATGATE_SERVER_HOST", "127.0.0.1");
    env::set_var("SEATGATE_SERVER_PORT", "8088");
    env::set_var("SEATGATE_LOG_LEVEL", "debug");
    env::set_var("SEATGATE_AUTH_ENABLED", "false");
    env::set_var("SEATGATE_TOKEN_EXPIRATION_SECS", "600");
    env::set_var("SEATGATE_LEASE_INACTIVITY_SECS", "120");
    env::set_var("SEATGATE_AUDIT_VERIFICATIONS", "true");

    let config = SeatgateConfig::load().unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8088);
    assert_eq!(config.logging.level, "debug");
    assert!(!config.auth.enabled);
    assert_eq!(config.auth.token_expiration_secs, 600);
    assert_eq!(config.lease.inactivity_window_secs, 120);
    assert!(config.audit.log_verifications);
    assert!(config.validate().is_ok());

    clear_env();
}

#[test]
#[serial]
fn database_url_is_routed_by_scheme() {
    clear_env();
    env::set_var("SEATGATE_DATABASE_URL", "postgres://db.internal/licenses");
    env::set_var("SEATGATE_DATABASE_TYPE", "postgres");

    let config = SeatgateConfig::load().unwrap();
    assert_eq!(config.database.db_type, "postgres");
    assert_eq!(config.database.postgres_url, "postgres://db.internal/licenses");
    assert_eq!(config.database.sqlite_url, "sqlite://seatgate.db");

    env::set_var("SEATGATE_DATABASE_URL", "sqlite://other.db");
    env::set_var("SEATGATE_DATABASE_TYPE", "sqlite");
    let config = SeatgateConfig::load().unwrap();
    assert_eq!(config.database.sqlite_url, "sqlite://other.db");

    clear_env();
}

#[test]
#[serial]
fn unparsable_numbers_are_ignored() {
    clear_env();
    env::set_var("SEATGATE_SERVER_PORT", "not-a-port");

    let config = SeatgateConfig::load().unwrap();
    assert_eq!(config.server.port, 3000);

    clear_env();
}

#[test]
#[serial]
fn zero_window_fails_validation() {
    clear_env();
    env::set_var("SEATGATE_JWT_SECRET", "a-long-enough-secret");
    env::set_var("SEATGATE_LEASE_INACTIVITY_SECS", "0");

    let config = SeatgateConfig::load().unwrap();
    assert!(config.validate().is_err());

    clear_env();
}
