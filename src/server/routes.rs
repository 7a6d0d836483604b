use axum::{
    middleware,
    routing::{get, post},
    Router,
};

#[cfg(feature = "admin-api")]
use axum::routing::{patch, put};

use crate::server::client_api::{release_handler, report_error_handler, verify_handler};
use crate::server::handlers::{health_handler, AppState};
use crate::server::logging::request_logging_middleware;

#[cfg(feature = "jwt-auth")]
use crate::server::auth::login_handler;

#[cfg(feature = "admin-api")]
use crate::server::admin::{
    create_user_handler, delete_user_handler, list_error_reports_handler, list_logs_handler,
    list_users_handler, resolve_error_report_handler, stats_handler, toggle_status_handler,
    update_user_handler,
};

#[cfg(feature = "rate-limiting")]
use crate::server::rate_limit::{create_rate_limiter, RateLimitType};

/// Wrap `router` in the per-IP limiter for `kind` when rate limiting is on.
#[cfg(feature = "rate-limiting")]
fn limited(router: Router<AppState>, state: &AppState, kind: RateLimitType) -> Router<AppState> {
    let config = &state.config.rate_limit;
    if !config.enabled {
        return router;
    }
    match create_rate_limiter(config, kind) {
        Some(layer) => router.layer(layer),
        None => {
            tracing::warn!("Invalid rate limit settings for {kind:?}; serving without a limit");
            router
        }
    }
}

/// Build the main application router for the Seatgate server.
///
/// # Routes
///
/// ## Client endpoints
/// - `POST /api/auth/verify` - Verify credentials and claim the seat
/// - `POST /api/auth/release` - Release the seat
/// - `POST /api/error-reports` - Submit an automation error report
/// - `GET /health` - Liveness and database status
///
/// ## Session (requires `jwt-auth` feature)
/// - `POST /api/auth/login` - Admin login, returns a bearer token
///
/// ## Admin endpoints (requires `admin-api` feature)
/// - `GET /api/users`, `POST /api/users`
/// - `PUT /api/users/:id`, `DELETE /api/users/:id`
/// - `PATCH /api/users/:id/toggle-status`
/// - `GET /api/stats`
/// - `GET /api/logs`
/// - `GET /api/error-reports`
/// - `PATCH /api/error-reports/:id/resolve`
pub fn build_router(state: AppState) -> Router {
    let verify = Router::new().route("/api/auth/verify", post(verify_handler));
    #[cfg(feature = "rate-limiting")]
    let verify = limited(verify, &state, RateLimitType::Verify);

    let release = Router::new().route("/api/auth/release", post(release_handler));
    #[cfg(feature = "rate-limiting")]
    let release = limited(release, &state, RateLimitType::Release);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/error-reports", post(report_error_handler))
        .merge(verify)
        .merge(release);

    #[cfg(feature = "jwt-auth")]
    let router = {
        let login = Router::new().route("/api/auth/login", post(login_handler));
        #[cfg(feature = "rate-limiting")]
        let login = limited(login, &state, RateLimitType::Login);
        router.merge(login)
    };

    #[cfg(feature = "admin-api")]
    let router = router
        .route(
            "/api/users",
            get(list_users_handler).post(create_user_handler),
        )
        .route(
            "/api/users/:id",
            put(update_user_handler).delete(delete_user_handler),
        )
        .route("/api/users/:id/toggle-status", patch(toggle_status_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/logs", get(list_logs_handler))
        .route("/api/error-reports", get(list_error_reports_handler))
        .route(
            "/api/error-reports/:id/resolve",
            patch(resolve_error_report_handler),
        );

    router
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
