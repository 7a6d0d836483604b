//! Configuration system for Seatgate.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `SEATGATE_SERVER_HOST` - Server bind address
//! - `SEATGATE_SERVER_PORT` - Server port
//! - `SEATGATE_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `SEATGATE_DATABASE_URL` - Database connection URL
//! - `SEATGATE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `SEATGATE_JWT_SECRET` - Secret for signing admin session tokens
//! - `SEATGATE_TOKEN_EXPIRATION_SECS` - Admin session validity in seconds
//! - `SEATGATE_LEASE_INACTIVITY_SECS` - Inactivity window before a lease is reaped
//! - `SEATGATE_AUDIT_VERIFICATIONS` - Record verify outcomes in the audit log

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<SeatgateConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeatgateConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub lease: LeaseConfig,
    pub audit: AuditConfig,
    pub rate_limit: RateLimitConfig,
    pub jobs: JobsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://seatgate.db".to_string(),
            postgres_url: "postgres://localhost/seatgate".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Admin session token configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require bearer tokens on admin routes
    pub enabled: bool,
    /// JWT secret key (use `env:VAR_NAME` to read from environment)
    pub jwt_secret: String,
    /// JWT issuer claim (iss)
    pub jwt_issuer: String,
    /// JWT audience claim (aud)
    pub jwt_audience: String,
    /// Token validity in seconds (default: 24 hours)
    pub token_expiration_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt_secret: String::new(),
            jwt_issuer: "seatgate".to_string(),
            jwt_audience: "seatgate-admin".to_string(),
            token_expiration_secs: 86_400,
        }
    }
}

/// Machine lease configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Seconds without a successful verify before a lease is considered stale
    pub inactivity_window_secs: u64,
    /// Sweep stale leases at the start of every verify call
    pub reap_on_verify: bool,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            inactivity_window_secs: 3600,
            reap_on_verify: true,
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Also record verify outcomes (admin actions are always recorded)
    pub log_verifications: bool,
    /// Number of events returned by the audit log listing
    pub list_limit: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_verifications: false,
            list_limit: 100,
        }
    }
}

/// Rate limiting configuration (used with the `rate-limiting` feature).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests per minute per IP on `/api/auth/verify`
    pub verify_rpm: u32,
    /// Requests per minute per IP on `/api/auth/release`
    pub release_rpm: u32,
    /// Requests per minute per IP on `/api/auth/login`
    pub login_rpm: u32,
    /// Burst allowance above the steady rate
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verify_rpm: 60,
            release_rpm: 30,
            login_rpm: 10,
            burst_size: 5,
        }
    }
}

/// Scheduled job configuration (used with the `background-jobs` feature).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Run the lease reaper on a schedule in addition to inline reaping
    pub lease_reaper_enabled: bool,
    /// Cron expression for the lease reaper (default: every 5 minutes)
    pub lease_reaper_cron: String,
    /// Deactivate expired users on a schedule
    pub expiry_sweep_enabled: bool,
    /// Cron expression for the expiry sweep (default: every hour at minute 15)
    pub expiry_sweep_cron: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            lease_reaper_enabled: false,
            lease_reaper_cron: "0 */5 * * * *".to_string(),
            expiry_sweep_enabled: false,
            expiry_sweep_cron: "0 15 * * * *".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl SeatgateConfig {
    /// Load configuration from file and environment without validating or caching it.
    pub fn load() -> LicenseResult<Self> {
        let defaults = SeatgateConfig::default();

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)
            .map_err(config_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_err)?
            .set_default("database.db_type", defaults.database.db_type)
            .map_err(config_err)?
            .set_default("database.sqlite_url", defaults.database.sqlite_url)
            .map_err(config_err)?
            .set_default("database.postgres_url", defaults.database.postgres_url)
            .map_err(config_err)?
            .set_default(
                "database.max_connections",
                i64::from(defaults.database.max_connections),
            )
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_err)?
            .set_default("auth.enabled", defaults.auth.enabled)
            .map_err(config_err)?
            .set_default("auth.jwt_secret", "")
            .map_err(config_err)?
            .set_default("auth.jwt_issuer", defaults.auth.jwt_issuer)
            .map_err(config_err)?
            .set_default("auth.jwt_audience", defaults.auth.jwt_audience)
            .map_err(config_err)?
            .set_default(
                "auth.token_expiration_secs",
                defaults.auth.token_expiration_secs,
            )
            .map_err(config_err)?
            .set_default(
                "lease.inactivity_window_secs",
                defaults.lease.inactivity_window_secs,
            )
            .map_err(config_err)?
            .set_default("lease.reap_on_verify", defaults.lease.reap_on_verify)
            .map_err(config_err)?
            .set_default("audit.log_verifications", defaults.audit.log_verifications)
            .map_err(config_err)?
            .set_default("audit.list_limit", i64::from(defaults.audit.list_limit))
            .map_err(config_err)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("SEATGATE_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option("server.port", env_parsed::<i64>("SEATGATE_SERVER_PORT"))
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("SEATGATE_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.sqlite_url",
                env::var("SEATGATE_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.postgres_url",
                env::var("SEATGATE_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("SEATGATE_LOG_LEVEL").ok())
            .map_err(config_err)?
            .set_override_option(
                "auth.enabled",
                env_parsed::<bool>("SEATGATE_AUTH_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("auth.jwt_secret", env::var("SEATGATE_JWT_SECRET").ok())
            .map_err(config_err)?
            .set_override_option(
                "auth.token_expiration_secs",
                env_parsed::<i64>("SEATGATE_TOKEN_EXPIRATION_SECS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "lease.inactivity_window_secs",
                env_parsed::<i64>("SEATGATE_LEASE_INACTIVITY_SECS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "audit.log_verifications",
                env_parsed::<bool>("SEATGATE_AUDIT_VERIFICATIONS"),
            )
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(LicenseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if self.auth.enabled && self.auth.jwt_secret.is_empty() {
            return Err(LicenseError::ConfigError(
                "auth.jwt_secret is required when auth.enabled is true".to_string(),
            ));
        }
        if self.auth.token_expiration_secs == 0 {
            return Err(LicenseError::ConfigError(
                "auth.token_expiration_secs must be greater than 0".to_string(),
            ));
        }

        if self.lease.inactivity_window_secs == 0 {
            return Err(LicenseError::ConfigError(
                "lease.inactivity_window_secs must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.enabled {
            let rl = &self.rate_limit;
            if rl.verify_rpm == 0 || rl.release_rpm == 0 || rl.login_rpm == 0 || rl.burst_size == 0
            {
                return Err(LicenseError::ConfigError(
                    "rate_limit values must be greater than 0 when rate limiting is enabled"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// Loads and validates the configuration on first access and caches it.
pub fn get_config() -> LicenseResult<&'static SeatgateConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = SeatgateConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    Ok(CONFIG.get_or_init(|| config))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> LicenseResult<&'static SeatgateConfig> {
    get_config()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SeatgateConfig {
        let mut config = SeatgateConfig::default();
        config.auth.jwt_secret = "secret".to_string();
        config
    }

    #[test]
    fn defaults_match_documented_constants() {
        let config = SeatgateConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.lease.inactivity_window_secs, 3600);
        assert!(config.lease.reap_on_verify);
        assert_eq!(config.auth.token_expiration_secs, 86_400);
        assert!(!config.audit.log_verifications);
        assert_eq!(config.audit.list_limit, 100);
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn auth_requires_secret() {
        let config = SeatgateConfig::default();
        assert!(matches!(
            config.validate(),
            Err(LicenseError::ConfigError(msg)) if msg.contains("jwt_secret")
        ));
    }

    #[test]
    fn disabled_auth_does_not_need_secret() {
        let mut config = SeatgateConfig::default();
        config.auth.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_db_type() {
        let mut config = valid();
        config.database.db_type = "mysql".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_inactivity_window() {
        let mut config = valid();
        config.lease.inactivity_window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut config = valid();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rate_limit_only_matters_when_enabled() {
        let mut config = valid();
        config.rate_limit.verify_rpm = 0;
        assert!(config.validate().is_err());
        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }
}
