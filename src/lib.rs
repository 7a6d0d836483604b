//! Seatgate - per-seat licensing for desktop automation tools
//!
//! A user account may be active on one machine at a time. The server records
//! which machine holds each account's seat and frees the seat on release or
//! after a period of inactivity. The client library verifies the seat at
//! startup and keeps re-verifying while the tool runs.
//!
//! # Features
//!
//! - `server` - Server components (verifier, handlers, database). Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//! - `jwt-auth` - Admin login with JWT sessions.
//! - `admin-api` - Admin endpoints. Enabled by default.
//! - `rate-limiting` - Per-IP limits on the public endpoints.
//! - `background-jobs` - Scheduled lease reaping and expiry sweeps.
//!
//! # Example
//!
//! ```toml
//! # Client-only (no server components)
//! seatgate = { version = "0.1", default-features = false }
//!
//! # Server with PostgreSQL
//! seatgate = { version = "0.1", features = ["server", "postgres"] }
//! ```

// Core modules (always available)
pub mod config;
pub mod errors;

// Client-related modules (always available)
pub mod client {
    pub mod errors;
    pub mod heartbeat;
    pub mod license;
    pub mod machine;

    pub use errors::{ClientApiError, ClientErrorCode};
    pub use heartbeat::{CheckStatus, PeriodicCheck};
    pub use license::{LicenseClient, VerifiedLicense};
    pub use machine::MachineId;
}

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

#[cfg(feature = "background-jobs")]
pub mod jobs;
