use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::{debug, error};

lazy_static! {
    // Verified against when the account does not exist, so the unknown-user
    // path costs the same as a wrong password.
    static ref DUMMY_HASH: String = hash_password("contacthub-dummy-password")
        .unwrap_or_default();
}

/// Computes the dummy hash up front so the first unknown-email login is not
/// slower than the ones after it.
pub fn warm_up() {
    lazy_static::initialize(&DUMMY_HASH);
    if DUMMY_HASH.is_empty() {
        error!("dummy password hash unavailable; unknown-email logins skip argon2");
    } else {
        debug!("dummy password hash ready");
    }
}

/// Argon2id PHC string with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!(error = %e, "argon2 hashing failed");
            anyhow::anyhow!("password hashing failed: {e}")
        })
}

/// `Ok(false)` on a mismatch; `Err` only when the stored hash is unusable.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "stored password hash does not parse");
        anyhow::anyhow!("invalid password hash: {e}")
    })?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, "argon2 verification failed");
            Err(anyhow::anyhow!("password verification failed: {e}"))
        }
    }
}

/// Verifies `plain` against `hash`, or against a dummy hash when there is no
/// account. Always `false` in the dummy case.
pub fn verify_password_or_dummy(plain: &str, hash: Option<&str>) -> anyhow::Result<bool> {
    match hash {
        Some(h) => verify_password(plain, h),
        None => {
            if !DUMMY_HASH.is_empty() {
                let _ = verify_password(plain, &DUMMY_HASH);
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_hash_accepts_only_the_signup_password() {
        let hash = hash_password("secret123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret123", &hash).unwrap());
        assert!(!verify_password("secret124", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn unparseable_stored_hash_is_an_error() {
        assert!(verify_password("secret123", "plaintext-secret123").is_err());
        assert!(verify_password_or_dummy("secret123", Some("argon2id:broken")).is_err());
    }

    #[test]
    fn missing_account_never_verifies() {
        warm_up();
        assert!(!DUMMY_HASH.is_empty());
        assert!(!verify_password_or_dummy("contacthub-dummy-password", None).unwrap());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("hunter22").unwrap();
        let b = hash_password("hunter22").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("hunter22", &a).unwrap() && verify_password("hunter22", &b).unwrap());
    }
}
