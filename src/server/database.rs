//! Durable store: credential store, machine lease registry, audit log and
//! error reports, over SQLite or Postgres.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{query, query_as, query_scalar, FromRow};
use std::sync::Arc;
use tracing::{error, info, warn};

#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
#[cfg(feature = "sqlite")]
use sqlx::{Sqlite, SqlitePool, Transaction};
#[cfg(feature = "sqlite")]
use std::str::FromStr;
#[cfg(feature = "sqlite")]
use std::time::Duration;

/// How long a SQLite connection waits for the write lock before failing.
#[cfg(feature = "sqlite")]
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(feature = "postgres")]
use sqlx::postgres::PgPoolOptions;
#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::{get_config, DatabaseConfig};
use crate::errors::{LicenseError, LicenseResult};

/// Account status of a license holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            UserStatus::Active => UserStatus::Inactive,
            UserStatus::Inactive => UserStatus::Active,
        }
    }
}

/// A license holder, as stored in the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub secret_hash: String,
    pub status: String,
    pub expires_at: NaiveDate,
    pub created_at: NaiveDateTime,
}

impl User {
    /// Unknown status strings are treated as inactive.
    pub fn status(&self) -> UserStatus {
        UserStatus::parse(&self.status).unwrap_or(UserStatus::Inactive)
    }

    pub fn is_active(&self) -> bool {
        self.status() == UserStatus::Active
    }

    /// A license ends at 00:00 UTC on its expiry day.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.expires_at <= today
    }
}

/// The binding of one license to one machine.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Lease {
    pub email: String,
    pub machine_id: String,
    pub last_seen_at: NaiveDateTime,
}

impl Lease {
    pub fn is_stale(&self, cutoff: NaiveDateTime) -> bool {
        self.last_seen_at < cutoff
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Admin {
    pub id: i64,
    pub email: String,
    pub secret_hash: String,
    pub created_at: NaiveDateTime,
}

/// Append-only audit record.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub id: i64,
    pub kind: String,
    pub actor: String,
    pub source_address: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Automation failure reported by a client, joined with the user's name when known.
#[derive(Debug, Clone, FromRow)]
pub struct ErrorReport {
    pub id: i64,
    pub email: String,
    pub message: String,
    pub reported_at: NaiveDateTime,
    pub resolved: bool,
    pub user_name: Option<String>,
}

/// Fields for a new license holder. `secret_hash` must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub secret_hash: String,
    pub expires_at: NaiveDate,
}

/// Replacement fields for an existing license holder.
///
/// A `None` secret keeps the current hash.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub name: String,
    pub email: String,
    pub secret_hash: Option<String>,
    pub expires_at: NaiveDate,
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub expired_licenses: i64,
    pub online_users: i64,
}

/// Result of the atomic conflict-check-then-upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAcquisition {
    /// The lease now belongs to the requesting machine.
    Acquired(Lease),
    /// Another machine holds a live lease; nothing was written.
    Conflict(Lease),
    /// The user was deleted or renamed after it was looked up.
    UserMissing,
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

/// Open a SQLite transaction that holds the write lock from the start.
///
/// Read-then-write transactions must use this: upgrading a deferred
/// transaction fails with `SQLITE_BUSY` without honouring the busy timeout.
#[cfg(feature = "sqlite")]
async fn begin_write(
    pool: &SqlitePool,
    op: &str,
) -> LicenseResult<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .map_err(|e| store_err("SQLite", op, e))
}

/// Map a driver error to the crate error, logging it once here.
fn store_err(backend: &str, op: &str, e: sqlx::Error) -> LicenseError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            warn!("{backend} {op} violated a unique constraint: {db}");
            return LicenseError::Conflict(db.message().to_string());
        }
    }
    error!("{backend} {op} failed: {e}");
    LicenseError::StoreError(format!("database error: {e}"))
}

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        email       TEXT NOT NULL UNIQUE,
        secret_hash TEXT NOT NULL,
        status      TEXT NOT NULL DEFAULT 'active',
        expires_at  TEXT NOT NULL,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS leases (
        email        TEXT NOT NULL UNIQUE,
        machine_id   TEXT NOT NULL,
        last_seen_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leases_last_seen_at ON leases (last_seen_at)",
    r#"
    CREATE TABLE IF NOT EXISTS admins (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        email       TEXT NOT NULL UNIQUE,
        secret_hash TEXT NOT NULL,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_events (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        kind           TEXT NOT NULL,
        actor          TEXT NOT NULL,
        source_address TEXT,
        created_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS error_reports (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        email       TEXT NOT NULL,
        message     TEXT NOT NULL,
        reported_at TEXT NOT NULL,
        resolved    INTEGER NOT NULL DEFAULT 0
    )
    "#,
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id          BIGSERIAL PRIMARY KEY,
        name        TEXT NOT NULL,
        email       TEXT NOT NULL UNIQUE,
        secret_hash TEXT NOT NULL,
        status      TEXT NOT NULL DEFAULT 'active',
        expires_at  DATE NOT NULL,
        created_at  TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS leases (
        email        TEXT NOT NULL UNIQUE,
        machine_id   TEXT NOT NULL,
        last_seen_at TIMESTAMP NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leases_last_seen_at ON leases (last_seen_at)",
    r#"
    CREATE TABLE IF NOT EXISTS admins (
        id          BIGSERIAL PRIMARY KEY,
        email       TEXT NOT NULL UNIQUE,
        secret_hash TEXT NOT NULL,
        created_at  TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_events (
        id             BIGSERIAL PRIMARY KEY,
        kind           TEXT NOT NULL,
        actor          TEXT NOT NULL,
        source_address TEXT,
        created_at     TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS error_reports (
        id          BIGSERIAL PRIMARY KEY,
        email       TEXT NOT NULL,
        message     TEXT NOT NULL,
        reported_at TIMESTAMP NOT NULL,
        resolved    BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
];

impl Database {
    /// Initialize the database connection based on the global configuration.
    ///
    /// See `crate::config` for configuration options.
    pub async fn new() -> LicenseResult<Arc<Self>> {
        let config = get_config()?;
        Self::connect(&config.database).await.map(Arc::new)
    }

    /// Connect using an explicit database configuration.
    pub async fn connect(db_config: &DatabaseConfig) -> LicenseResult<Self> {
        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let options = SqliteConnectOptions::from_str(&db_config.sqlite_url)
                    .map_err(|e| {
                        LicenseError::ConfigError(format!("invalid SQLite URL: {e}"))
                    })?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(SQLITE_BUSY_TIMEOUT);

                let pool = SqlitePoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect_with(options)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::StoreError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Database::SQLite(pool))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::StoreError(format!("failed to connect to PostgreSQL: {e}"))
                    })?;

                Ok(Database::Postgres(pool))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Backend name reported by the health endpoint.
    pub fn db_type(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> bool {
        let result = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("SELECT 1").execute(pool).await,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query("SELECT 1").execute(pool).await,
        };
        result.is_ok()
    }

    /// Create all tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| store_err("SQLite", "migrate", e))?;
                }
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                for statement in POSTGRES_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| store_err("Postgres", "migrate", e))?;
                }
            }
        }

        info!("Database schema ready ({})", self.db_type());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn get_user_by_email(&self, email: &str) -> LicenseResult<Option<User>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, User>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(pool)
                .await
                .map_err(|e| store_err("SQLite", "get_user_by_email", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, User>("SELECT * FROM users WHERE email = $1")
                    .bind(email)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_err("Postgres", "get_user_by_email", e))
            }
        }
    }

    pub async fn get_user(&self, id: i64) -> LicenseResult<Option<User>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, User>("SELECT * FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .map_err(|e| store_err("SQLite", "get_user", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await
                .map_err(|e| store_err("Postgres", "get_user", e)),
        }
    }

    /// All users, newest first.
    pub async fn list_users(&self) -> LicenseResult<Vec<User>> {
        let sql = "SELECT * FROM users ORDER BY created_at DESC, id DESC";
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, User>(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| store_err("SQLite", "list_users", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, User>(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| store_err("Postgres", "list_users", e)),
        }
    }

    /// Insert a new license holder with `active` status.
    ///
    /// A duplicate email yields `LicenseError::Conflict`.
    pub async fn create_user(&self, user: NewUser, now: NaiveDateTime) -> LicenseResult<User> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, User>(
                r#"
                INSERT INTO users (name, email, secret_hash, status, expires_at, created_at)
                VALUES (?, ?, ?, 'active', ?, ?)
                RETURNING *
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.secret_hash)
            .bind(user.expires_at)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| store_err("SQLite", "create_user", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, User>(
                r#"
                INSERT INTO users (name, email, secret_hash, status, expires_at, created_at)
                VALUES ($1, $2, $3, 'active', $4, $5)
                RETURNING *
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.secret_hash)
            .bind(user.expires_at)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| store_err("Postgres", "create_user", e)),
        }
    }

    /// Replace a user's editable fields.
    ///
    /// When the email changes, the user's lease (if any) follows it inside the
    /// same transaction. Returns `Ok(None)` for an unknown id.
    pub async fn update_user(&self, id: i64, update: UserUpdate) -> LicenseResult<Option<User>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = begin_write(pool, "update_user").await?;

                let Some(existing) = query_as::<_, User>("SELECT * FROM users WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| store_err("SQLite", "update_user", e))?
                else {
                    return Ok(None);
                };

                let secret_hash = update.secret_hash.unwrap_or(existing.secret_hash);
                let updated = query_as::<_, User>(
                    r#"
                    UPDATE users
                       SET name = ?, email = ?, secret_hash = ?, expires_at = ?
                     WHERE id = ?
                    RETURNING *
                    "#,
                )
                .bind(&update.name)
                .bind(&update.email)
                .bind(&secret_hash)
                .bind(update.expires_at)
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| store_err("SQLite", "update_user", e))?;

                if existing.email != updated.email {
                    query("UPDATE leases SET email = ? WHERE email = ?")
                        .bind(&updated.email)
                        .bind(&existing.email)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| store_err("SQLite", "update_user", e))?;
                }

                tx.commit()
                    .await
                    .map_err(|e| store_err("SQLite", "update_user", e))?;
                Ok(Some(updated))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| store_err("Postgres", "update_user", e))?;

                let Some(existing) =
                    query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| store_err("Postgres", "update_user", e))?
                else {
                    return Ok(None);
                };

                let secret_hash = update.secret_hash.unwrap_or(existing.secret_hash);
                let updated = query_as::<_, User>(
                    r#"
                    UPDATE users
                       SET name = $1, email = $2, secret_hash = $3, expires_at = $4
                     WHERE id = $5
                    RETURNING *
                    "#,
                )
                .bind(&update.name)
                .bind(&update.email)
                .bind(&secret_hash)
                .bind(update.expires_at)
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| store_err("Postgres", "update_user", e))?;

                if existing.email != updated.email {
                    query("UPDATE leases SET email = $1 WHERE email = $2")
                        .bind(&updated.email)
                        .bind(&existing.email)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| store_err("Postgres", "update_user", e))?;
                }

                tx.commit()
                    .await
                    .map_err(|e| store_err("Postgres", "update_user", e))?;
                Ok(Some(updated))
            }
        }
    }

    /// Flip `active` and `inactive`. Returns `Ok(None)` for an unknown id.
    pub async fn toggle_user_status(&self, id: i64) -> LicenseResult<Option<User>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, User>(
                r#"
                UPDATE users
                   SET status = CASE WHEN status = 'active' THEN 'inactive' ELSE 'active' END
                 WHERE id = ?
                RETURNING *
                "#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| store_err("SQLite", "toggle_user_status", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, User>(
                r#"
                UPDATE users
                   SET status = CASE WHEN status = 'active' THEN 'inactive' ELSE 'active' END
                 WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| store_err("Postgres", "toggle_user_status", e)),
        }
    }

    /// Set `inactive` only if the user is currently `active`.
    ///
    /// Returns `true` when this call performed the transition.
    pub async fn deactivate_user_if_active(&self, email: &str) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE users SET status = 'inactive' WHERE email = ? AND status = 'active'",
            )
            .bind(email)
            .execute(pool)
            .await
            .map_err(|e| store_err("SQLite", "deactivate_user_if_active", e))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE users SET status = 'inactive' WHERE email = $1 AND status = 'active'",
            )
            .bind(email)
            .execute(pool)
            .await
            .map_err(|e| store_err("Postgres", "deactivate_user_if_active", e))?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Deactivate every active user whose expiry day is on or before `today`.
    pub async fn deactivate_expired_users(&self, today: NaiveDate) -> LicenseResult<u64> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE users SET status = 'inactive' WHERE status = 'active' AND expires_at <= ?",
            )
            .bind(today)
            .execute(pool)
            .await
            .map_err(|e| store_err("SQLite", "deactivate_expired_users", e))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE users SET status = 'inactive' WHERE status = 'active' AND expires_at <= $1",
            )
            .bind(today)
            .execute(pool)
            .await
            .map_err(|e| store_err("Postgres", "deactivate_expired_users", e))?
            .rows_affected(),
        };

        Ok(rows_affected)
    }

    /// Delete a user and its lease in one transaction.
    ///
    /// Returns the deleted row, or `Ok(None)` for an unknown id.
    pub async fn delete_user(&self, id: i64) -> LicenseResult<Option<User>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = begin_write(pool, "delete_user").await?;

                let Some(user) = query_as::<_, User>("SELECT * FROM users WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| store_err("SQLite", "delete_user", e))?
                else {
                    return Ok(None);
                };

                query("DELETE FROM leases WHERE email = ?")
                    .bind(&user.email)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_err("SQLite", "delete_user", e))?;
                query("DELETE FROM users WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_err("SQLite", "delete_user", e))?;

                tx.commit()
                    .await
                    .map_err(|e| store_err("SQLite", "delete_user", e))?;
                Ok(Some(user))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| store_err("Postgres", "delete_user", e))?;

                let Some(user) =
                    query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| store_err("Postgres", "delete_user", e))?
                else {
                    return Ok(None);
                };

                query("DELETE FROM leases WHERE email = $1")
                    .bind(&user.email)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_err("Postgres", "delete_user", e))?;
                query("DELETE FROM users WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_err("Postgres", "delete_user", e))?;

                tx.commit()
                    .await
                    .map_err(|e| store_err("Postgres", "delete_user", e))?;
                Ok(Some(user))
            }
        }
    }

    /// Dashboard counters. A lease counts as online when seen at or after `cutoff`.
    pub async fn stats(&self, today: NaiveDate, cutoff: NaiveDateTime) -> LicenseResult<Stats> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let err = |e: sqlx::Error| store_err("SQLite", "stats", e);
                let total_users = query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                    .fetch_one(pool)
                    .await
                    .map_err(err)?;
                let active_users =
                    query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE status = 'active'")
                        .fetch_one(pool)
                        .await
                        .map_err(err)?;
                let expired_licenses =
                    query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE expires_at <= ?")
                        .bind(today)
                        .fetch_one(pool)
                        .await
                        .map_err(err)?;
                let online_users =
                    query_scalar::<_, i64>("SELECT COUNT(*) FROM leases WHERE last_seen_at >= ?")
                        .bind(cutoff)
                        .fetch_one(pool)
                        .await
                        .map_err(err)?;

                Ok(Stats {
                    total_users,
                    active_users,
                    inactive_users: total_users - active_users,
                    expired_licenses,
                    online_users,
                })
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let err = |e: sqlx::Error| store_err("Postgres", "stats", e);
                let total_users = query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                    .fetch_one(pool)
                    .await
                    .map_err(err)?;
                let active_users =
                    query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE status = 'active'")
                        .fetch_one(pool)
                        .await
                        .map_err(err)?;
                let expired_licenses =
                    query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE expires_at <= $1")
                        .bind(today)
                        .fetch_one(pool)
                        .await
                        .map_err(err)?;
                let online_users =
                    query_scalar::<_, i64>("SELECT COUNT(*) FROM leases WHERE last_seen_at >= $1")
                        .bind(cutoff)
                        .fetch_one(pool)
                        .await
                        .map_err(err)?;

                Ok(Stats {
                    total_users,
                    active_users,
                    inactive_users: total_users - active_users,
                    expired_licenses,
                    online_users,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Leases
    // ------------------------------------------------------------------

    pub async fn get_lease(&self, email: &str) -> LicenseResult<Option<Lease>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Lease>(
                "SELECT email, machine_id, last_seen_at FROM leases WHERE email = ?",
            )
            .bind(email)
            .fetch_optional(pool)
            .await
            .map_err(|e| store_err("SQLite", "get_lease", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Lease>(
                "SELECT email, machine_id, last_seen_at FROM leases WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(pool)
            .await
            .map_err(|e| store_err("Postgres", "get_lease", e)),
        }
    }

    pub async fn list_leases(&self) -> LicenseResult<Vec<Lease>> {
        let sql = "SELECT email, machine_id, last_seen_at FROM leases ORDER BY last_seen_at DESC";
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Lease>(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| store_err("SQLite", "list_leases", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Lease>(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| store_err("Postgres", "list_leases", e)),
        }
    }

    /// Delete every lease last seen before `cutoff`. Returns the number removed.
    pub async fn sweep_stale_leases(&self, cutoff: NaiveDateTime) -> LicenseResult<u64> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("DELETE FROM leases WHERE last_seen_at < ?")
                .bind(cutoff)
                .execute(pool)
                .await
                .map_err(|e| store_err("SQLite", "sweep_stale_leases", e))?
                .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query("DELETE FROM leases WHERE last_seen_at < $1")
                .bind(cutoff)
                .execute(pool)
                .await
                .map_err(|e| store_err("Postgres", "sweep_stale_leases", e))?
                .rows_affected(),
        };

        Ok(rows_affected)
    }

    /// Conflict check followed by upsert, inside one transaction.
    ///
    /// A lease held by another machine and seen at or after `cutoff` blocks the
    /// acquisition. Otherwise the row keyed by `email` is replaced with
    /// `(machine_id, now)`. Nothing is written once the user row is gone.
    /// Callers serialize per identity before calling.
    pub async fn acquire_lease(
        &self,
        email: &str,
        machine_id: &str,
        now: NaiveDateTime,
        cutoff: NaiveDateTime,
    ) -> LicenseResult<LeaseAcquisition> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = begin_write(pool, "acquire_lease").await?;

                let user_exists =
                    query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
                        .bind(email)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| store_err("SQLite", "acquire_lease", e))?;
                if user_exists == 0 {
                    return Ok(LeaseAcquisition::UserMissing);
                }

                let current = query_as::<_, Lease>(
                    "SELECT email, machine_id, last_seen_at FROM leases WHERE email = ?",
                )
                .bind(email)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| store_err("SQLite", "acquire_lease", e))?;

                if let Some(lease) = current {
                    if lease.machine_id != machine_id && !lease.is_stale(cutoff) {
                        return Ok(LeaseAcquisition::Conflict(lease));
                    }
                }

                let lease = query_as::<_, Lease>(
                    r#"
                    INSERT INTO leases (email, machine_id, last_seen_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(email) DO UPDATE SET
                        machine_id   = excluded.machine_id,
                        last_seen_at = excluded.last_seen_at
                    RETURNING email, machine_id, last_seen_at
                    "#,
                )
                .bind(email)
                .bind(machine_id)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| store_err("SQLite", "acquire_lease", e))?;

                tx.commit()
                    .await
                    .map_err(|e| store_err("SQLite", "acquire_lease", e))?;
                Ok(LeaseAcquisition::Acquired(lease))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| store_err("Postgres", "acquire_lease", e))?;

                // Serializes acquisitions for this identity across server processes.
                query("SELECT pg_advisory_xact_lock(hashtext($1))")
                    .bind(email)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_err("Postgres", "acquire_lease", e))?;

                // Blocks against a concurrent delete_user/update_user on the row.
                let user_row = query_scalar::<_, i64>(
                    "SELECT id FROM users WHERE email = $1 FOR SHARE",
                )
                .bind(email)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| store_err("Postgres", "acquire_lease", e))?;
                if user_row.is_none() {
                    return Ok(LeaseAcquisition::UserMissing);
                }

                let current = query_as::<_, Lease>(
                    "SELECT email, machine_id, last_seen_at FROM leases WHERE email = $1",
                )
                .bind(email)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| store_err("Postgres", "acquire_lease", e))?;

                if let Some(lease) = current {
                    if lease.machine_id != machine_id && !lease.is_stale(cutoff) {
                        return Ok(LeaseAcquisition::Conflict(lease));
                    }
                }

                let lease = query_as::<_, Lease>(
                    r#"
                    INSERT INTO leases (email, machine_id, last_seen_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (email) DO UPDATE SET
                        machine_id   = EXCLUDED.machine_id,
                        last_seen_at = EXCLUDED.last_seen_at
                    RETURNING email, machine_id, last_seen_at
                    "#,
                )
                .bind(email)
                .bind(machine_id)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| store_err("Postgres", "acquire_lease", e))?;

                tx.commit()
                    .await
                    .map_err(|e| store_err("Postgres", "acquire_lease", e))?;
                Ok(LeaseAcquisition::Acquired(lease))
            }
        }
    }

    /// Delete the lease matching both fields exactly. Returns rows removed.
    pub async fn release_lease(&self, email: &str, machine_id: &str) -> LicenseResult<u64> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("DELETE FROM leases WHERE email = ? AND machine_id = ?")
                    .bind(email)
                    .bind(machine_id)
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("SQLite", "release_lease", e))?
                    .rows_affected()
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("DELETE FROM leases WHERE email = $1 AND machine_id = $2")
                    .bind(email)
                    .bind(machine_id)
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("Postgres", "release_lease", e))?
                    .rows_affected()
            }
        };

        Ok(rows_affected)
    }

    // ------------------------------------------------------------------
    // Admins
    // ------------------------------------------------------------------

    pub async fn get_admin_by_email(&self, email: &str) -> LicenseResult<Option<Admin>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Admin>("SELECT * FROM admins WHERE email = ?")
                .bind(email)
                .fetch_optional(pool)
                .await
                .map_err(|e| store_err("SQLite", "get_admin_by_email", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, Admin>("SELECT * FROM admins WHERE email = $1")
                    .bind(email)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_err("Postgres", "get_admin_by_email", e))
            }
        }
    }

    pub async fn create_admin(
        &self,
        email: &str,
        secret_hash: &str,
        now: NaiveDateTime,
    ) -> LicenseResult<Admin> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Admin>(
                "INSERT INTO admins (email, secret_hash, created_at) VALUES (?, ?, ?) RETURNING *",
            )
            .bind(email)
            .bind(secret_hash)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| store_err("SQLite", "create_admin", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Admin>(
                "INSERT INTO admins (email, secret_hash, created_at) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(email)
            .bind(secret_hash)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| store_err("Postgres", "create_admin", e)),
        }
    }

    pub async fn list_admins(&self) -> LicenseResult<Vec<Admin>> {
        let sql = "SELECT * FROM admins ORDER BY id";
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Admin>(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| store_err("SQLite", "list_admins", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Admin>(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| store_err("Postgres", "list_admins", e)),
        }
    }

    // ------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------

    pub async fn record_audit_event(
        &self,
        kind: &str,
        actor: &str,
        source_address: Option<&str>,
        now: NaiveDateTime,
    ) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    "INSERT INTO audit_events (kind, actor, source_address, created_at) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(kind)
                .bind(actor)
                .bind(source_address)
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| store_err("SQLite", "record_audit_event", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    "INSERT INTO audit_events (kind, actor, source_address, created_at) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(kind)
                .bind(actor)
                .bind(source_address)
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| store_err("Postgres", "record_audit_event", e))?;
            }
        }

        Ok(())
    }

    /// Most recent events first.
    pub async fn list_audit_events(&self, limit: u32) -> LicenseResult<Vec<AuditEvent>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, AuditEvent>(
                "SELECT * FROM audit_events ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(pool)
            .await
            .map_err(|e| store_err("SQLite", "list_audit_events", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, AuditEvent>(
                "SELECT * FROM audit_events ORDER BY created_at DESC, id DESC LIMIT $1",
            )
            .bind(i64::from(limit))
            .fetch_all(pool)
            .await
            .map_err(|e| store_err("Postgres", "list_audit_events", e)),
        }
    }

    // ------------------------------------------------------------------
    // Error reports
    // ------------------------------------------------------------------

    pub async fn create_error_report(
        &self,
        email: &str,
        message: &str,
        now: NaiveDateTime,
    ) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("INSERT INTO error_reports (email, message, reported_at) VALUES (?, ?, ?)")
                    .bind(email)
                    .bind(message)
                    .bind(now)
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("SQLite", "create_error_report", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    "INSERT INTO error_reports (email, message, reported_at) VALUES ($1, $2, $3)",
                )
                .bind(email)
                .bind(message)
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| store_err("Postgres", "create_error_report", e))?;
            }
        }

        Ok(())
    }

    pub async fn list_error_reports(&self) -> LicenseResult<Vec<ErrorReport>> {
        let sql = r#"
            SELECT r.id, r.email, r.message, r.reported_at, r.resolved, u.name AS user_name
              FROM error_reports r
              LEFT JOIN users u ON u.email = r.email
             ORDER BY r.reported_at DESC, r.id DESC
        "#;
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, ErrorReport>(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| store_err("SQLite", "list_error_reports", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, ErrorReport>(sql)
                .fetch_all(pool)
                .await
                .map_err(|e| store_err("Postgres", "list_error_reports", e)),
        }
    }

    /// Returns `false` for an unknown id.
    pub async fn resolve_error_report(&self, id: i64) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("UPDATE error_reports SET resolved = 1 WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map_err(|e| store_err("SQLite", "resolve_error_report", e))?
                .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("UPDATE error_reports SET resolved = TRUE WHERE id = $1")
                    .bind(id)
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("Postgres", "resolve_error_report", e))?
                    .rows_affected()
            }
        };

        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn user_expiring(expires_at: NaiveDate, status: &str) -> User {
        User {
            id: 1,
            name: "Ada".into(),
            email: "ada@example.com".into(),
            secret_hash: String::new(),
            status: status.into(),
            expires_at,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
        }
    }

    #[test]
    fn license_ends_on_expiry_day() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let user = user_expiring(day, "active");
        assert!(!user.is_expired_on(day.pred_opt().unwrap()));
        assert!(user.is_expired_on(day));
        assert!(user.is_expired_on(day.succ_opt().unwrap()));
    }

    #[test]
    fn unknown_status_is_inactive() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert!(user_expiring(day, "active").is_active());
        assert!(!user_expiring(day, "suspended").is_active());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [UserStatus::Active, UserStatus::Inactive] {
            assert_eq!(UserStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UserStatus::Active.toggled(), UserStatus::Inactive);
    }

    #[test]
    fn lease_staleness_uses_strict_cutoff() {
        let cutoff = NaiveDate::from_ymd_opt(2024, 6, 30)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let lease = Lease {
            email: "ada@example.com".into(),
            machine_id: "m1".into(),
            last_seen_at: cutoff,
        };
        assert!(!lease.is_stale(cutoff));
        assert!(lease.is_stale(cutoff + chrono::Duration::seconds(1)));
    }
}
