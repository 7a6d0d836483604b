//! Stable machine identifier for seat binding.
//!
//! The identifier is derived once and then persisted, so it survives host
//! renames and stays the same across runs on the same machine.
//!
//! Storage locations:
//! - Windows: `%APPDATA%\seatgate\machine_id`
//! - macOS: `~/Library/Application Support/seatgate/machine_id`
//! - Linux: `~/.local/share/seatgate/machine_id`

use std::env;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{LicenseError, LicenseResult};

const MACHINE_ID_FILE: &str = "machine_id";

/// Opaque identifier sent as `machineId` on verify and release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineId(String);

impl MachineId {
    /// Wrap an identifier obtained elsewhere.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The platform data directory for Seatgate.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("seatgate"))
    }

    /// Load the identifier from the default data directory, creating it if needed.
    pub async fn load_or_create_default() -> LicenseResult<Self> {
        let dir = Self::default_dir().ok_or_else(|| {
            LicenseError::StorageError(std::io::Error::new(
                ErrorKind::NotFound,
                "Could not determine app data directory",
            ))
        })?;
        Self::load_or_create(&dir).await
    }

    /// Read `machine_id` from `dir`, or derive and persist a new one.
    pub async fn load_or_create(dir: &Path) -> LicenseResult<Self> {
        let path = dir.join(MACHINE_ID_FILE);

        match fs::read_to_string(&path).await {
            Ok(stored) if !stored.trim().is_empty() => {
                debug!("Loaded machine id from {}", path.display());
                return Ok(Self(stored.trim().to_string()));
            }
            Ok(_) => warn!("Empty machine id file at {}, regenerating", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(LicenseError::StorageError(e)),
        }

        let id = derive_machine_id();
        fs::create_dir_all(dir).await?;
        fs::write(&path, &id).await?;
        debug!("Stored new machine id at {}", path.display());

        Ok(Self(id))
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn host_name() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .chain(std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
}

/// OS-assigned installation id, where the platform has one.
fn os_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        ["/etc/machine-id", "/var/lib/dbus/machine-id"]
            .iter()
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .map(|id| id.trim().to_string())
            .find(|id| !id.is_empty())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// SHA-256 over host facts, or a random UUID when the host reveals nothing.
fn derive_machine_id() -> String {
    let host = host_name();
    let os_id = os_machine_id();

    if host.is_none() && os_id.is_none() {
        warn!("No host identity available, using a random machine id");
        return Uuid::new_v4().to_string();
    }

    fingerprint(&[
        host.as_deref().unwrap_or(""),
        os_id.as_deref().unwrap_or(""),
        env::consts::OS,
        env::consts::ARCH,
    ])
}
