//! Auth service: the account flows behind `/auth/*`

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::social::profiles::validate_username;
use crate::store::{Database, ProfileRecord, TwoFactorUpdate, UserRecord};
use crate::util::rate_limit::{
    check_keyed, create_keyed_limiter, KeyedLimiter, CREDENTIAL_ATTEMPTS_PER_MINUTE,
};
use crate::util::time::unix_secs;

use super::password::{hash_password, is_valid_email, verify_password, MIN_PASSWORD_LEN};
use super::token::{Claims, TokenKeys, TokenKind};
use super::totp;
use super::AuthError;

/// Issued access token
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub token: String,
}

/// Result of the password step
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(AuthSession),
    /// Password accepted; a TOTP or backup code must follow
    TwoFactorRequired { challenge_token: String },
}

/// Material shown to the user when starting 2FA enrolment
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_uri: String,
}

/// Retries when a concurrent login changed the backup codes first
const BACKUP_SWAP_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct AuthService {
    db: Arc<dyn Database>,
    keys: TokenKeys,
    totp_issuer: String,
    /// Keyed by login email or by the user behind a challenge token
    credential_limiter: Arc<KeyedLimiter<String>>,
}

impl AuthService {
    pub fn new(config: &Config, db: Arc<dyn Database>) -> Self {
        Self {
            db,
            keys: TokenKeys::from_config(config),
            totp_issuer: config.totp_issuer.clone(),
            credential_limiter: create_keyed_limiter(CREDENTIAL_ATTEMPTS_PER_MINUTE),
        }
    }

    /// Verify an access token (HTTP bearer or socket query)
    pub fn authenticate(&self, token: &str) -> Result<Claims, AuthError> {
        self.keys.verify(token, TokenKind::Access)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<AuthSession, AuthError> {
        let email = email.trim().to_lowercase();
        let username = username.trim();

        if !is_valid_email(&email) {
            return Err(AuthError::Validation("Invalid email".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        validate_username(username).map_err(AuthError::Validation)?;

        if self.db.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("email already registered"));
        }
        if self.db.find_profile_by_username(username).await?.is_some() {
            return Err(AuthError::Conflict("username already taken"));
        }

        let user = UserRecord {
            id: Uuid::new_v4(),
            email,
            password_hash: hash_password(password)?,
            two_factor_enabled: false,
            two_factor_secret: None,
            backup_codes: Vec::new(),
            created_at: Utc::now(),
        };
        self.db.insert_user(&user).await?;

        let profile = ProfileRecord {
            user_id: user.id,
            username: username.to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.db.insert_profile(&profile).await {
            // Lost a race for the username; don't leave a user without a profile
            if let Err(cleanup) = self.db.delete_user(user.id).await {
                warn!(user_id = %user.id, error = %cleanup, "Failed to roll back user");
            }
            return Err(e.into());
        }

        info!(user_id = %user.id, username = %profile.username, "User registered");
        Ok(AuthSession {
            user_id: user.id,
            token: self.keys.sign_access(user.id)?,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = email.trim().to_lowercase();
        self.check_attempt_budget(format!("email:{email}"))?;

        let Some(user) = self.db.find_user_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        if user.two_factor_enabled {
            info!(user_id = %user.id, "Password accepted, second factor required");
            return Ok(LoginOutcome::TwoFactorRequired {
                challenge_token: self.keys.sign_challenge(user.id)?,
            });
        }

        info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome::Authenticated(AuthSession {
            user_id: user.id,
            token: self.keys.sign_access(user.id)?,
        }))
    }

    /// Second login step: exchange a challenge token and code for an access token
    pub async fn verify_two_factor(
        &self,
        challenge_token: &str,
        code: &str,
    ) -> Result<AuthSession, AuthError> {
        let claims = self.keys.verify(challenge_token, TokenKind::Challenge)?;
        self.check_attempt_budget(format!("user:{}", claims.sub))?;
        let user = self.load_user(claims.sub).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        self.consume_second_factor(&user, code).await?;

        info!(user_id = %user.id, "User logged in with second factor");
        Ok(AuthSession {
            user_id: user.id,
            token: self.keys.sign_access(user.id)?,
        })
    }

    /// Start enrolment: store a fresh secret, still disabled until confirmed
    pub async fn setup_two_factor(&self, user_id: Uuid) -> Result<TwoFactorSetup, AuthError> {
        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let secret = totp::generate_secret();
        self.db
            .update_two_factor(
                user_id,
                &TwoFactorUpdate {
                    two_factor_enabled: false,
                    two_factor_secret: Some(secret.clone()),
                    backup_codes: Vec::new(),
                },
            )
            .await?;

        Ok(TwoFactorSetup {
            otpauth_uri: totp::provisioning_uri(&self.totp_issuer, &user.email, &secret),
            secret,
        })
    }

    /// Confirm enrolment with a code; returns the plain backup codes (shown once)
    pub async fn enable_two_factor(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Vec<String>, AuthError> {
        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }
        let secret = user.two_factor_secret.ok_or(AuthError::TwoFactorNotPending)?;
        if !totp::verify_code(&secret, code, unix_secs()) {
            return Err(AuthError::InvalidCode);
        }

        let backup_codes = totp::generate_backup_codes();
        self.db
            .update_two_factor(
                user_id,
                &TwoFactorUpdate {
                    two_factor_enabled: true,
                    two_factor_secret: Some(secret),
                    backup_codes: backup_codes
                        .iter()
                        .map(|c| totp::backup_code_digest(c))
                        .collect(),
                },
            )
            .await?;

        info!(user_id = %user_id, "Two-factor authentication enabled");
        Ok(backup_codes)
    }

    pub async fn disable_two_factor(&self, user_id: Uuid, code: &str) -> Result<(), AuthError> {
        let user = self.load_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        self.consume_second_factor(&user, code).await?;
        self.db
            .update_two_factor(user_id, &TwoFactorUpdate::disabled())
            .await?;

        info!(user_id = %user_id, "Two-factor authentication disabled");
        Ok(())
    }

    async fn load_user(&self, user_id: Uuid) -> Result<UserRecord, AuthError> {
        self.db
            .find_user(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// Accept a TOTP code, or burn a matching backup code
    async fn consume_second_factor(&self, user: &UserRecord, code: &str) -> Result<(), AuthError> {
        if let Some(secret) = &user.two_factor_secret {
            if totp::verify_code(secret, code, unix_secs()) {
                return Ok(());
            }
        }

        let digest = totp::backup_code_digest(code);
        let mut codes = user.backup_codes.clone();
        for _ in 0..BACKUP_SWAP_ATTEMPTS {
            let Some(pos) = codes.iter().position(|c| *c == digest) else {
                break;
            };
            let mut remaining = codes.clone();
            remaining.remove(pos);
            if self.db.replace_backup_codes(user.id, &codes, &remaining).await? {
                info!(
                    user_id = %user.id,
                    remaining = remaining.len(),
                    "Backup code consumed"
                );
                return Ok(());
            }
            // Codes changed underneath us; retry against the stored list
            codes = self.load_user(user.id).await?.backup_codes;
        }

        warn!(user_id = %user.id, "Rejected second factor");
        Err(AuthError::InvalidCode)
    }

    fn check_attempt_budget(&self, key: String) -> Result<(), AuthError> {
        if check_keyed(&self.credential_limiter, &key) {
            Ok(())
        } else {
            warn!(key = %key, "Credential attempts throttled");
            Err(AuthError::RateLimited)
        }
    }
}
