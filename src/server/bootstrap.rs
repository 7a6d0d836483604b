//! Bootstrap flow for initial Seatgate server setup.
//!
//! Admins are not managed through the license flow. There are two ways to
//! create one:
//!
//! 1. **Environment Variables**: Set `SEATGATE_BOOTSTRAP_ADMIN_EMAIL` and
//!    `SEATGATE_BOOTSTRAP_ADMIN_PASSWORD`. On a startup where no admin exists
//!    yet, Seatgate creates one with these credentials.
//!
//! 2. **CLI Command**: Run `seatgate_server admin create --email E --password P`.
//!
//! # Security
//!
//! Unset the bootstrap password after the first start.

use std::env;

use chrono::Utc;
use tracing::{info, warn};

use crate::errors::{LicenseError, LicenseResult};
use crate::server::database::Database;
use crate::server::secrets::SecretHasher;
use crate::server::validation::{validate_email, validate_length, MIN_SECRET_LEN};

/// Environment variable name for the bootstrap admin email.
pub const BOOTSTRAP_EMAIL_ENV: &str = "SEATGATE_BOOTSTRAP_ADMIN_EMAIL";
/// Environment variable name for the bootstrap admin password.
pub const BOOTSTRAP_PASSWORD_ENV: &str = "SEATGATE_BOOTSTRAP_ADMIN_PASSWORD";

fn checked_admin_credentials(email: &str, password: &str) -> LicenseResult<()> {
    validate_email(email, "email")
        .and_then(|_| validate_length(password, "password", MIN_SECRET_LEN, 1024))
        .map_err(|e| LicenseError::InvalidRequest(e.to_string()))
}

/// Create the first admin from the environment if none exists yet.
///
/// # Returns
/// - `Ok(Some(email))` - An admin was created
/// - `Ok(None)` - No bootstrap needed (admins exist or env vars unset)
/// - `Err(e)` - Invalid credentials or store failure
pub async fn bootstrap_admin_from_env(
    db: &Database,
    hasher: &SecretHasher,
) -> LicenseResult<Option<String>> {
    let (email, password) = match (env::var(BOOTSTRAP_EMAIL_ENV), env::var(BOOTSTRAP_PASSWORD_ENV))
    {
        (Ok(email), Ok(password)) if !email.trim().is_empty() && !password.is_empty() => {
            (email.trim().to_string(), password)
        }
        _ => return Ok(None),
    };

    if !db.list_admins().await?.is_empty() {
        info!(
            "Bootstrap skipped: an admin already exists. Unset {} to suppress this message.",
            BOOTSTRAP_PASSWORD_ENV
        );
        return Ok(None);
    }

    checked_admin_credentials(&email, &password)?;
    let hash = hasher.hash_async(password).await?;
    db.create_admin(&email, &hash, Utc::now().naive_utc())
        .await?;

    warn!("Bootstrap admin {email} created. Unset {BOOTSTRAP_PASSWORD_ENV} now.");
    Ok(Some(email))
}

/// CLI command for admin operations.
#[derive(Debug, PartialEq, Eq)]
pub enum AdminCommand {
    /// Create an admin
    Create { email: String, password: String },
    /// List all admins
    List,
    /// Recognized `admin` command with bad arguments
    Invalid(String),
    /// No command (run server normally)
    None,
}

/// Parse CLI arguments for admin commands.
///
/// # Supported Commands
///
/// ```text
/// seatgate_server admin create --email admin@example.com --password secret
/// seatgate_server admin list
/// ```
pub fn parse_admin_command(args: &[String]) -> AdminCommand {
    if args.len() < 2 || args[1] != "admin" {
        return AdminCommand::None;
    }

    match args.get(2).map(String::as_str) {
        Some("create") => {
            let mut email = None;
            let mut password = None;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--email" | "-e" => {
                        email = args.get(i + 1).cloned();
                        i += 2;
                    }
                    "--password" | "-p" => {
                        password = args.get(i + 1).cloned();
                        i += 2;
                    }
                    _ => i += 1,
                }
            }

            match (email, password) {
                (Some(email), Some(password)) => AdminCommand::Create { email, password },
                _ => AdminCommand::Invalid(
                    "admin create requires --email and --password".to_string(),
                ),
            }
        }
        Some("list") => AdminCommand::List,
        Some(other) => AdminCommand::Invalid(format!("unknown admin command '{other}'")),
        None => AdminCommand::Invalid("usage: admin <create|list>".to_string()),
    }
}

/// Execute an admin command.
///
/// Returns `Ok(true)` when the process should exit instead of serving.
pub async fn execute_admin_command(
    db: &Database,
    hasher: &SecretHasher,
    cmd: AdminCommand,
) -> LicenseResult<bool> {
    match cmd {
        AdminCommand::Create { email, password } => {
            checked_admin_credentials(&email, &password)?;
            let hash = hasher.hash_async(password).await?;
            let admin = db
                .create_admin(email.trim(), &hash, Utc::now().naive_utc())
                .await?;

            println!("Admin created successfully!");
            println!("───────────────────────────────────────────");
            println!("ID:      {}", admin.id);
            println!("Email:   {}", admin.email);
            println!("Created: {}", admin.created_at);
            println!("───────────────────────────────────────────");

            Ok(true)
        }
        AdminCommand::List => {
            let admins = db.list_admins().await?;

            if admins.is_empty() {
                println!("No admins found.");
            } else {
                println!("Admins:");
                println!("───────────────────────────────────────────");
                for admin in admins {
                    println!("{} - {} (created {})", admin.id, admin.email, admin.created_at);
                }
            }

            Ok(true)
        }
        AdminCommand::Invalid(message) => {
            eprintln!("Error: {message}");
            Ok(true)
        }
        AdminCommand::None => Ok(false),
    }
}
