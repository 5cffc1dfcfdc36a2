//! JWT issue and verification

use std::time::Duration;

use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::util::time::unix_secs;

use super::AuthError;

/// Lifetime of the token handed out between the password and 2FA steps
pub const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Grants access to protected routes and the game socket
    Access,
    /// Proves the password step of a 2FA login; only accepted by `/auth/2fa/verify`
    Challenge,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    pub iss: String,
    pub kind: TokenKind,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: Duration,
}

impl TokenKeys {
    pub fn from_config(config: &Config) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            access_ttl: Duration::from_secs(config.jwt_ttl_minutes * 60),
        }
    }

    fn sign(&self, user_id: Uuid, kind: TokenKind, ttl: Duration) -> Result<String, AuthError> {
        let now = unix_secs();
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: now + ttl.as_secs(),
            iss: self.issuer.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.sign(user_id, TokenKind::Access, self.access_ttl)
    }

    pub fn sign_challenge(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.sign(user_id, TokenKind::Challenge, CHALLENGE_TTL)
    }

    /// Verify signature, issuer and expiry, and require the given kind
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        if data.claims.kind != kind {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::from_config(&Config::for_tests())
    }

    #[test]
    fn access_token_roundtrip() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id).unwrap();
        let claims = keys.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "pong-arena-test");
    }

    #[test]
    fn challenge_token_is_not_an_access_token() {
        let keys = keys();
        let token = keys.sign_challenge(Uuid::new_v4()).unwrap();
        assert!(matches!(
            keys.verify(&token, TokenKind::Access),
            Err(AuthError::InvalidToken)
        ));
        assert!(keys.verify(&token, TokenKind::Challenge).is_ok());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let mut other = Config::for_tests();
        other.jwt_secret = "another-secret".to_string();
        let token = TokenKeys::from_config(&other)
            .sign_access(Uuid::new_v4())
            .unwrap();
        assert!(keys().verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let keys = keys();
        let now = unix_secs();
        // Past the default 60s validation leeway
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: now - 600,
            exp: now - 300,
            iss: "pong-arena-test".to_string(),
            kind: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(matches!(
            keys.verify(&token, TokenKind::Access),
            Err(AuthError::TokenExpired)
        ));
    }
}
