//! License verification and single-active-machine enforcement.
//!
//! `LicenseVerifier` is the only place that decides whether a machine may run.
//! A verification walks these steps in order and stops at the first failure:
//!
//! 1. reject a missing or oversized machine identifier (before any store access)
//! 2. reap stale leases
//! 3. look up the user by identity
//! 4. refuse non-active users
//! 5. refuse expired users, deactivating them once
//! 6. check the secret
//! 7. under the identity lock, refuse if another machine holds a live lease,
//!    otherwise upsert the lease for this machine
//!
//! Denials are values (`VerifyOutcome::Denied`), not errors. `Err` is reserved
//! for precondition failures and store faults.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::config::LeaseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::server::database::{Database, Lease, LeaseAcquisition, UserStatus};
use crate::server::reaper::LeaseReaper;
use crate::server::secrets::SecretHasher;

/// Longest accepted machine identifier, in characters.
pub const MAX_MACHINE_ID_LEN: usize = 256;

/// Why a verification was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    NotFound,
    Inactive,
    Expired,
    BadCredentials,
    /// Another machine holds the seat; `last_seen_at` is when it last verified.
    MachineConflict { last_seen_at: NaiveDateTime },
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotFound => "not_found",
            DenyReason::Inactive => "inactive",
            DenyReason::Expired => "expired",
            DenyReason::BadCredentials => "bad_credentials",
            DenyReason::MachineConflict { .. } => "machine_conflict",
        }
    }
}

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub valid_until: NaiveDate,
    pub status: UserStatus,
    pub lease: Lease,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Allowed(Grant),
    Denied(DenyReason),
}

impl VerifyOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, VerifyOutcome::Allowed(_))
    }
}

/// One async mutex per identity, created on demand.
///
/// Entries are weak so the map only holds identities with a request in flight.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    inner: StdMutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn lock_for(&self, identity: &str) -> Arc<Mutex<()>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = map.get(identity).and_then(Weak::upgrade) {
            return existing;
        }

        map.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        map.insert(identity.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Number of identities currently tracked.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|map| map.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check the machine identifier before anything touches the store.
pub fn check_machine_id(machine_id: Option<&str>) -> LicenseResult<&str> {
    let machine_id = machine_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(LicenseError::MissingMachineId)?;

    if machine_id.chars().count() > MAX_MACHINE_ID_LEN {
        return Err(LicenseError::InvalidRequest(format!(
            "machineId must be at most {MAX_MACHINE_ID_LEN} characters"
        )));
    }

    Ok(machine_id)
}

pub struct LicenseVerifier {
    db: Arc<Database>,
    hasher: SecretHasher,
    reaper: LeaseReaper,
    locks: IdentityLocks,
    reap_on_verify: bool,
}

impl LicenseVerifier {
    pub fn new(db: Arc<Database>, hasher: SecretHasher, lease: &LeaseConfig) -> Self {
        Self {
            reaper: LeaseReaper::new(db.clone(), lease.inactivity_window_secs),
            db,
            hasher,
            locks: IdentityLocks::default(),
            reap_on_verify: lease.reap_on_verify,
        }
    }

    pub fn reaper(&self) -> &LeaseReaper {
        &self.reaper
    }

    /// Hold the seat lock for `identity`, e.g. while an admin edits or
    /// deletes the account.
    pub async fn lock_identity(&self, identity: &str) -> OwnedMutexGuard<()> {
        self.locks.lock_for(identity).lock_owned().await
    }

    /// Verify credentials and acquire (or refresh) the seat for `machine_id`.
    pub async fn verify(
        &self,
        identity: &str,
        secret: &str,
        machine_id: Option<&str>,
    ) -> LicenseResult<VerifyOutcome> {
        self.verify_at(identity, secret, machine_id, Utc::now().naive_utc())
            .await
    }

    /// `verify` with an explicit clock, used by tests and the jobs.
    pub async fn verify_at(
        &self,
        identity: &str,
        secret: &str,
        machine_id: Option<&str>,
        now: NaiveDateTime,
    ) -> LicenseResult<VerifyOutcome> {
        let machine_id = check_machine_id(machine_id)?;
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(LicenseError::InvalidRequest(
                "identity is required".to_string(),
            ));
        }

        if self.reap_on_verify {
            self.reaper.sweep_at(now).await?;
        }

        let Some(user) = self.db.get_user_by_email(identity).await? else {
            return Ok(VerifyOutcome::Denied(DenyReason::NotFound));
        };

        if !user.is_active() {
            return Ok(VerifyOutcome::Denied(DenyReason::Inactive));
        }

        if user.is_expired_on(now.date()) {
            if self.db.deactivate_user_if_active(&user.email).await? {
                info!("License for {} expired on {}; deactivated", user.email, user.expires_at);
            }
            return Ok(VerifyOutcome::Denied(DenyReason::Expired));
        }

        let secret_ok = self
            .hasher
            .verify_async(secret.to_string(), user.secret_hash.clone())
            .await?;
        if !secret_ok {
            return Ok(VerifyOutcome::Denied(DenyReason::BadCredentials));
        }

        let cutoff = self.reaper.cutoff(now);
        let lock = self.locks.lock_for(&user.email);
        let acquisition = {
            let _guard = lock.lock().await;
            self.db
                .acquire_lease(&user.email, machine_id, now, cutoff)
                .await?
        };

        match acquisition {
            LeaseAcquisition::Conflict(held) => {
                debug!(
                    "Seat for {} held by another machine (last seen {})",
                    user.email, held.last_seen_at
                );
                Ok(VerifyOutcome::Denied(DenyReason::MachineConflict {
                    last_seen_at: held.last_seen_at,
                }))
            }
            LeaseAcquisition::UserMissing => {
                debug!("User {} removed during verification", user.email);
                Ok(VerifyOutcome::Denied(DenyReason::NotFound))
            }
            LeaseAcquisition::Acquired(lease) => Ok(VerifyOutcome::Allowed(Grant {
                valid_until: user.expires_at,
                status: user.status(),
                lease,
            })),
        }
    }

    /// Free the seat held by `(identity, machine_id)`.
    ///
    /// Missing fields and unknown leases are no-ops. A lease on the same
    /// identity but another machine is left untouched. Returns whether a lease
    /// was removed.
    pub async fn release(
        &self,
        identity: Option<&str>,
        machine_id: Option<&str>,
    ) -> LicenseResult<bool> {
        let identity = identity.map(str::trim).filter(|s| !s.is_empty());
        let machine_id = machine_id.map(str::trim).filter(|s| !s.is_empty());
        let (Some(identity), Some(machine_id)) = (identity, machine_id) else {
            debug!("Release with missing identity or machine id ignored");
            return Ok(false);
        };

        let lock = self.locks.lock_for(identity);
        let _guard = lock.lock().await;
        let removed = self.db.release_lease(identity, machine_id).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_id_must_be_present() {
        assert!(matches!(
            check_machine_id(None),
            Err(LicenseError::MissingMachineId)
        ));
        assert!(matches!(
            check_machine_id(Some("")),
            Err(LicenseError::MissingMachineId)
        ));
        assert!(matches!(
            check_machine_id(Some("   ")),
            Err(LicenseError::MissingMachineId)
        ));
    }

    #[test]
    fn machine_id_length_is_bounded() {
        let max = "m".repeat(MAX_MACHINE_ID_LEN);
        assert_eq!(check_machine_id(Some(&max)).unwrap(), max);

        let too_long = "m".repeat(MAX_MACHINE_ID_LEN + 1);
        assert!(matches!(
            check_machine_id(Some(&too_long)),
            Err(LicenseError::InvalidRequest(_))
        ));
    }

    #[test]
    fn machine_id_is_trimmed() {
        assert_eq!(check_machine_id(Some(" abc ")).unwrap(), "abc");
    }

    #[test]
    fn deny_reason_codes() {
        assert_eq!(DenyReason::NotFound.as_str(), "not_found");
        assert_eq!(DenyReason::BadCredentials.as_str(), "bad_credentials");
        let conflict = DenyReason::MachineConflict {
            last_seen_at: Utc::now().naive_utc(),
        };
        assert_eq!(conflict.as_str(), "machine_conflict");
    }

    #[tokio::test]
    async fn identity_locks_are_shared_while_held() {
        let locks = IdentityLocks::default();
        let a = locks.lock_for("ada@example.com");
        let b = locks.lock_for("ada@example.com");
        assert!(Arc::ptr_eq(&a, &b));

        let other = locks.lock_for("bob@example.com");
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(locks.len(), 2);

        drop(a);
        drop(b);
        drop(other);
        assert!(locks.is_empty());
    }
}
