use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::config::SeatgateConfig;
use crate::errors::LicenseResult;
use crate::server::database::Database;
use crate::server::logging::{AuditKind, HealthResponse};
use crate::server::secrets::SecretHasher;
use crate::server::verifier::LicenseVerifier;

#[cfg(feature = "jwt-auth")]
use crate::server::auth::AuthState;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub verifier: Arc<LicenseVerifier>,
    pub hasher: SecretHasher,
    pub config: Arc<SeatgateConfig>,
    #[cfg(feature = "jwt-auth")]
    pub auth: AuthState,
}

impl AppState {
    /// Build state with the default argon2 cost parameters.
    pub fn new(db: Arc<Database>, config: SeatgateConfig) -> LicenseResult<Self> {
        Self::with_hasher(db, config, SecretHasher::default())
    }

    pub fn with_hasher(
        db: Arc<Database>,
        config: SeatgateConfig,
        hasher: SecretHasher,
    ) -> LicenseResult<Self> {
        let verifier = LicenseVerifier::new(db.clone(), hasher.clone(), &config.lease);

        #[cfg(feature = "jwt-auth")]
        let auth = AuthState::from_config(&config.auth)?;

        Ok(Self {
            db,
            verifier: Arc::new(verifier),
            hasher,
            config: Arc::new(config),
            #[cfg(feature = "jwt-auth")]
            auth,
        })
    }

    /// Append an audit event stamped with the current time.
    pub async fn audit(
        &self,
        kind: AuditKind,
        actor: &str,
        source_address: Option<&str>,
    ) -> LicenseResult<()> {
        self.db
            .record_audit_event(kind.as_str(), actor, source_address, Utc::now().naive_utc())
            .await
    }
}

/// Format a stored UTC timestamp as RFC 3339 with a `Z` suffix.
pub fn rfc3339(dt: NaiveDateTime) -> String {
    Utc.from_utc_datetime(&dt)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Caller address for the audit log.
///
/// The first `X-Forwarded-For` entry wins over the socket peer address.
pub fn source_address(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.db.ping().await;
    Json(HealthResponse::healthy(connected, state.db.db_type()))
}
