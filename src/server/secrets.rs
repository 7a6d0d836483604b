//! Argon2id hashing for user and admin secrets.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$m=...`). Verification
//! reads the parameters back from the stored string, so changing the cost
//! parameters only affects newly hashed secrets.

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;

use crate::errors::{LicenseError, LicenseResult};

#[derive(Debug, Clone)]
pub struct SecretHasher {
    params: Params,
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl SecretHasher {
    /// Custom cost parameters (memory in KiB, iterations, parallelism).
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> LicenseResult<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| LicenseError::HashError(format!("invalid argon2 params: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a secret with a fresh random salt.
    pub fn hash(&self, secret: &str) -> LicenseResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| LicenseError::HashError(format!("argon2 error: {e}")))
    }

    /// Check a secret against a stored PHC string.
    ///
    /// A mismatch is `Ok(false)`; only a malformed hash is an error.
    pub fn verify(&self, secret: &str, phc: &str) -> LicenseResult<bool> {
        let parsed = PasswordHash::new(phc)
            .map_err(|e| LicenseError::HashError(format!("malformed stored hash: {e}")))?;

        match self.argon2().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(LicenseError::HashError(format!("argon2 error: {e}"))),
        }
    }

    /// `hash` on the blocking thread pool.
    pub async fn hash_async(&self, secret: String) -> LicenseResult<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| LicenseError::ServerError(format!("hashing task failed: {e}")))?
    }

    /// `verify` on the blocking thread pool.
    pub async fn verify_async(&self, secret: String, phc: String) -> LicenseResult<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &phc))
            .await
            .map_err(|e| LicenseError::ServerError(format!("hashing task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> SecretHasher {
        SecretHasher::with_params(8, 1, 1).unwrap()
    }

    #[test]
    fn hash_is_argon2id_phc() {
        let hash = fast().hash("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$"));
    }

    #[test]
    fn verify_accepts_right_secret_and_rejects_wrong_one() {
        let hasher = fast();
        let hash = hasher.hash("hunter2").unwrap();
        assert!(hasher.verify("hunter2", &hash).unwrap());
        assert!(!hasher.verify("hunter3", &hash).unwrap());
    }

    #[test]
    fn same_secret_gets_different_salts() {
        let hasher = fast();
        assert_ne!(hasher.hash("s").unwrap(), hasher.hash("s").unwrap());
    }

    #[test]
    fn verify_uses_params_from_stored_hash() {
        let hash = fast().hash("hunter2").unwrap();
        assert!(SecretHasher::default().verify("hunter2", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(matches!(
            fast().verify("x", "not-a-phc-string"),
            Err(LicenseError::HashError(_))
        ));
    }

    #[test]
    fn rejects_invalid_params() {
        assert!(SecretHasher::with_params(1, 0, 1).is_err());
    }

    #[tokio::test]
    async fn async_variants_match_sync() {
        let hasher = fast();
        let hash = hasher.hash_async("pw".to_string()).await.unwrap();
        assert!(hasher.verify_async("pw".to_string(), hash).await.unwrap());
    }
}
