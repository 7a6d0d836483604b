//! Rate limiting for the public Seatgate endpoints.
//!
//! Limits are per client IP and configurable via `config.toml`:
//!
//! ```toml
//! [rate_limit]
//! enabled = true
//! verify_rpm = 60    # /api/auth/verify: 60 requests per minute
//! release_rpm = 30   # /api/auth/release: 30 requests per minute
//! login_rpm = 10     # /api/auth/login: 10 requests per minute
//! burst_size = 5     # Allow short bursts above the limit
//! ```
//!
//! Requests over the limit get `429 Too Many Requests` with a `Retry-After` header.
//!
//! `SmartIpKeyExtractor` checks X-Forwarded-For and X-Real-IP before falling
//! back to the peer address, so the server must be started with
//! `.into_make_service_with_connect_info::<SocketAddr>()`.

use governor::middleware::NoOpMiddleware;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;

pub use tower_governor::key_extractor::SmartIpKeyExtractor;
pub use tower_governor::GovernorLayer;

use crate::config::RateLimitConfig;

/// Rate limiter types for different endpoint categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitType {
    /// `/api/auth/verify`
    Verify,
    /// `/api/auth/release`
    Release,
    /// `/api/auth/login`
    Login,
}

impl RateLimitType {
    pub fn requests_per_minute(&self, config: &RateLimitConfig) -> u32 {
        match self {
            RateLimitType::Verify => config.verify_rpm,
            RateLimitType::Release => config.release_rpm,
            RateLimitType::Login => config.login_rpm,
        }
    }
}

/// Replenish interval in milliseconds for a requests-per-minute budget.
fn replenish_interval_ms(rpm: u32) -> u64 {
    if rpm > 0 {
        (60_000 / u64::from(rpm)).max(1)
    } else {
        60_000
    }
}

/// Create a rate limiting layer for the specified endpoint type.
///
/// Returns `None` when the configured values cannot form a valid quota.
pub fn create_rate_limiter(
    config: &RateLimitConfig,
    limit_type: RateLimitType,
) -> Option<GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware>> {
    let interval_ms = replenish_interval_ms(limit_type.requests_per_minute(config));

    let governor_config = GovernorConfigBuilder::default()
        .per_millisecond(interval_ms)
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()?;

    Some(GovernorLayer {
        config: Arc::new(governor_config),
    })
}
