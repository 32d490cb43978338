//! Bearer token issuing and verification.
//!
//! Tokens are HS256-signed JWTs carrying the subject's id and roles,
//! bound to the configured issuer. Participant tokens are valid for
//! 24 hours; service-to-service tokens carry the SYSTEM role.

use crate::errors::SmError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role granted to session participants.
pub const ROLE_USER: &str = "USER";

/// Role carried on service-to-service tokens.
pub const ROLE_SYSTEM: &str = "SYSTEM";

/// Validity period of participant tokens.
pub const USER_TOKEN_TTL_HOURS: i64 = 24;

/// Validity period of service-to-service tokens.
pub const SYSTEM_TOKEN_TTL_MINUTES: i64 = 10;

/// Claims carried on session manager tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Issuer.
    pub iss: String,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Roles granted to the subject.
    pub roles: Vec<String>,
}

impl Claims {
    /// Check if the token grants a specific role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("roles", &self.roles)
            .finish()
    }
}

/// Mints bearer tokens for participants and outbound service calls.
#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    encoding_key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(issuer: String, secret: &str) -> Self {
        Self {
            issuer,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for the given subject with the given roles and TTL.
    pub fn issue(&self, user_id: &str, roles: &[&str], ttl: Duration) -> Result<String, SmError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SmError::Internal(format!("failed to sign token: {}", e)))
    }

    /// Issue a participant token with the USER role, valid 24 hours.
    pub fn issue_user_token(&self, user_id: &str) -> Result<String, SmError> {
        self.issue(user_id, &[ROLE_USER], Duration::hours(USER_TOKEN_TTL_HOURS))
    }

    /// Issue a short-lived token for outbound service calls.
    pub fn issue_system_token(&self) -> Result<String, SmError> {
        self.issue(
            "session-manager",
            &[ROLE_SYSTEM],
            Duration::minutes(SYSTEM_TOKEN_TTL_MINUTES),
        )
    }
}

/// Verifies inbound bearer tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(issuer: &str, secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate a token's signature, issuer and expiry.
    ///
    /// Returns generic Unauthorized errors; the underlying cause is
    /// logged at debug level.
    pub fn verify(&self, token: &str) -> Result<Claims, SmError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(target: "sm.auth", error = %e, "Token validation failed");
                SmError::Unauthorized("The access token is invalid or expired".to_string())
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn issuer_and_verifier() -> (TokenIssuer, TokenVerifier) {
        let issuer = TokenIssuer::new("session-manager-test".to_string(), "very-secret-secret");
        let verifier = TokenVerifier::new("session-manager-test", "very-secret-secret");
        (issuer, verifier)
    }

    #[test]
    fn test_user_token_round_trip() {
        let (issuer, verifier) = issuer_and_verifier();

        let token = issuer.issue_user_token("user-1").unwrap();
        let claims = verifier.verify(&token).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.roles, vec![ROLE_USER.to_string()]);
        assert!(claims.has_role(ROLE_USER));
        assert!(!claims.has_role(ROLE_SYSTEM));
        assert_eq!(claims.iss, "session-manager-test");

        // 24 hour validity window
        let lifetime = claims.exp - claims.iat;
        assert_eq!(lifetime, USER_TOKEN_TTL_HOURS * 3600);
    }

    #[test]
    fn test_system_token_has_system_role() {
        let (issuer, verifier) = issuer_and_verifier();

        let token = issuer.issue_system_token().unwrap();
        let claims = verifier.verify(&token).unwrap();

        assert!(claims.has_role(ROLE_SYSTEM));
        assert_eq!(claims.sub, "session-manager");
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let issuer = TokenIssuer::new("session-manager-test".to_string(), "secret-a");
        let verifier = TokenVerifier::new("session-manager-test", "secret-b");

        let token = issuer.issue_user_token("user-1").unwrap();
        let result = verifier.verify(&token);

        assert!(matches!(result, Err(SmError::Unauthorized(_))));
    }

    #[test]
    fn test_verify_rejects_wrong_issuer() {
        let issuer = TokenIssuer::new("another-service".to_string(), "very-secret-secret");
        let verifier = TokenVerifier::new("session-manager-test", "very-secret-secret");

        let token = issuer.issue_user_token("user-1").unwrap();
        let result = verifier.verify(&token);

        assert!(matches!(result, Err(SmError::Unauthorized(_))));
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let (issuer, verifier) = issuer_and_verifier();

        let token = issuer
            .issue("user-1", &[ROLE_USER], Duration::minutes(-10))
            .unwrap();
        let result = verifier.verify(&token);

        assert!(matches!(result, Err(SmError::Unauthorized(_))));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let (_, verifier) = issuer_and_verifier();
        assert!(matches!(
            verifier.verify("not-a-jwt"),
            Err(SmError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_claims_debug_redacts_subject() {
        let claims = Claims {
            sub: "user-1".to_string(),
            iss: "session-manager-test".to_string(),
            iat: 0,
            exp: 0,
            roles: vec![ROLE_USER.to_string()],
        };

        let debug = format!("{:?}", claims);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("user-1"));
    }
}
