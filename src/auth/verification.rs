use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};

/// Verification links older than this are rejected.
pub const VERIFICATION_TOKEN_MAX_AGE: Duration = Duration::days(30);

/// 256 random bits, hex-encoded (64 chars).
pub fn generate_verification_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn is_token_stale(issued_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    match issued_at {
        Some(at) => now - at > VERIFICATION_TOKEN_MAX_AGE,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_64_hex_chars() {
        let token = generate_verification_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_differ() {
        assert_ne!(generate_verification_token(), generate_verification_token());
    }

    #[test]
    fn staleness_window() {
        let now = OffsetDateTime::now_utc();
        assert!(!is_token_stale(Some(now - Duration::days(29)), now));
        assert!(is_token_stale(Some(now - Duration::days(31)), now));
        assert!(is_token_stale(None, now));
    }
}
