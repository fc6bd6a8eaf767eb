use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, foreign issuer, malformed token or subject.
    #[error("invalid token")]
    Invalid,
    /// Signature checks out but the token is past its expiry.
    #[error("token expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Symmetric signing material plus the issuer and lifetime of session tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            ttl_minutes: _,
        } = state.config.jwt.clone();
        JwtKeys::new(&secret, issuer, state.config.session_ttl())
    }
}

impl JwtKeys {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, account_id: Uuid) -> Result<String, TokenError> {
        self.issue_with_ttl(account_id, self.ttl)
    }

    pub fn issue_with_ttl(&self, account_id: Uuid, ttl: Duration) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: account_id,
            iat: now,
            exp: now.saturating_add(usize::try_from(ttl.as_secs()).unwrap_or(usize::MAX)),
            iss: self.issuer.clone(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(account_id = %claims.sub, "jwt signed");
        Ok(token)
    }

    /// Returns the account ID carried by a valid, unexpired token from this issuer.
    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        // The library accepts exp == now; a zero-lifetime token is already expired.
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        if data.claims.exp <= now {
            return Err(TokenError::Expired);
        }
        debug!(account_id = %data.claims.sub, "jwt verified");
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "dev-secret";

    fn keys() -> JwtKeys {
        JwtKeys::new(SECRET, "contacthub", Duration::from_secs(3600))
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = keys();
        for _ in 0..5 {
            let id = Uuid::new_v4();
            let token = keys.issue(id).expect("issue");
            assert_eq!(keys.verify(&token), Ok(id));
        }
    }

    #[test]
    fn zero_ttl_is_expired() {
        let keys = keys();
        let token = keys.issue_with_ttl(Uuid::new_v4(), Duration::ZERO).unwrap();
        assert_eq!(keys.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let keys = keys();
        let id = Uuid::new_v4();
        let token = keys.issue_with_ttl(id, Duration::MAX).unwrap();
        assert_eq!(keys.verify(&token), Ok(id));
    }

    #[test]
    fn past_expiry_is_expired() {
        let keys = keys();
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let token = keys
            .sign(&Claims {
                sub: Uuid::new_v4(),
                iat: now - 7200,
                exp: now - 3600,
                iss: "contacthub".into(),
            })
            .unwrap();
        assert_eq!(keys.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn foreign_issuer_is_rejected_with_same_secret() {
        let other = JwtKeys::new(SECRET, "other", Duration::from_secs(3600));
        let token = other.issue(Uuid::new_v4()).unwrap();
        assert_eq!(keys().verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let other = JwtKeys::new("another-secret", "contacthub", Duration::from_secs(3600));
        let token = other.issue(Uuid::new_v4()).unwrap();
        assert_eq!(keys().verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(keys().verify("not.a.jwt"), Err(TokenError::Invalid));
        assert_eq!(keys().verify(""), Err(TokenError::Invalid));
    }

    #[test]
    fn from_state_uses_configured_ttl() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        assert_eq!(keys.ttl(), Duration::from_secs(3600));
    }
}
