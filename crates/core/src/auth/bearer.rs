//! Bearer issuance and verification (C1/C2): a self-describing HMAC-SHA256
//! signed token binding `(user_id, device_id)` with expiry. Verification is
//! pure and side-effect-free — no store lookup on the happy path.

use im_protocol::BearerClaims;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Result of a successful verification: the identity the bearer proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub device_id: i64,
}

/// Issue a bearer for `(user_id, device_id)` using the configured secret,
/// issuer, audience, and TTL. Returns the signed token and its absolute
/// expiry (unix seconds).
///
/// # Errors
/// Returns [`AppError::Internal`] if signing fails.
pub fn issue(config: &Config, user_id: i64, device_id: i64) -> AppResult<(String, i64)> {
    let now = now_unix();
    let exp = now + config.bearer_ttl_seconds;
    let claims = BearerClaims {
        iss: config.bearer_issuer.clone(),
        aud: config.bearer_audience.clone(),
        uid: user_id,
        did: device_id,
        iat: now,
        nbf: now,
        exp,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.bearer_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((token, exp))
}

/// Verify a bearer and extract the identity it proves.
///
/// The accepted algorithm set is fixed to `HS256` regardless of the
/// token's own header, closing the classic algorithm-confusion hole.
/// `iss`/`aud` are checked exactly; `nbf`/`exp` tolerate a 30-second
/// clock-skew leeway.
///
/// # Errors
/// Returns [`AppError::Unauthenticated`] if the token is malformed,
/// unsigned by the configured secret, expired beyond the leeway, or
/// carries a mismatched issuer/audience.
pub fn verify(config: &Config, token: &str) -> AppResult<Identity> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 30;
    validation.set_issuer(&[config.bearer_issuer.as_str()]);
    validation.set_audience(&[config.bearer_audience.as_str()]);

    let data = decode::<BearerClaims>(
        token,
        &DecodingKey::from_secret(config.bearer_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::Unauthenticated)?;

    Ok(Identity {
        user_id: data.claims.uid,
        device_id: data.claims.did,
    })
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Extract the raw token from an `Authorization: Bearer <token>` header
/// value, or `None` if the value is malformed.
#[must_use]
pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            bind_addr: "127.0.0.1:0".into(),
            database_url: String::new(),
            mongo_url: String::new(),
            mongo_database: String::new(),
            redis_url: String::new(),
            kafka_brokers: String::new(),
            kafka_topic_prefix: String::new(),
            bearer_secret: "test-secret-do-not-use-in-prod".into(),
            bearer_issuer: "im-core".into(),
            bearer_audience: "im-clients".into(),
            bearer_ttl_seconds: 3600,
            log_level: "info".into(),
            sync_sender_devices: false,
        }
    }

    #[test]
    fn issue_then_verify_round_trips() {
        let config = test_config();
        let (token, exp) = issue(&config, 1, 10).unwrap();
        assert!(exp > now_unix());
        let identity = verify(&config, &token).unwrap();
        assert_eq!(identity.user_id, 1);
        assert_eq!(identity.device_id, 10);
    }

    #[test]
    fn verify_rejects_wrong_audience() {
        let config = test_config();
        let (token, _) = issue(&config, 1, 10).unwrap();
        let mut other = test_config();
        other.bearer_audience = "other-clients".into();
        assert!(verify(&other, &token).is_err());
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let config = test_config();
        let (mut token, _) = issue(&config, 1, 10).unwrap();
        token.push('x');
        assert!(verify(&config, &token).is_err());
    }

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("abc"), None);
    }
}
