//! Display identity: usernames, lookup and search

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::store::{Database, ProfileRecord};

use super::SocialError;

/// Maximum search results returned
pub const SEARCH_LIMIT: usize = 20;

/// 3-20 characters of letters, digits and underscore
pub fn validate_username(username: &str) -> Result<(), String> {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{3,20}$").unwrap();
    }
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err("Username must be 3-20 letters, digits or underscores".to_string())
    }
}

/// Name shown for users without a profile row
pub fn fallback_display_name(user_id: Uuid) -> String {
    format!("Player_{}", &user_id.to_string()[..8])
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub user_id: Uuid,
    pub username: String,
}

impl From<ProfileRecord> for ProfileView {
    fn from(p: ProfileRecord) -> Self {
        Self {
            user_id: p.user_id,
            username: p.username,
        }
    }
}

/// The caller's own account summary
#[derive(Debug, Clone, Serialize)]
pub struct MeView {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub two_factor_enabled: bool,
}

#[derive(Clone)]
pub struct ProfileService {
    db: Arc<dyn Database>,
}

impl ProfileService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn me(&self, user_id: Uuid) -> Result<MeView, SocialError> {
        let user = self
            .db
            .find_user(user_id)
            .await?
            .ok_or(SocialError::NotFound("user"))?;
        let username = match self.db.find_profile(user_id).await? {
            Some(profile) => profile.username,
            None => fallback_display_name(user_id),
        };

        Ok(MeView {
            user_id,
            email: user.email,
            username,
            two_factor_enabled: user.two_factor_enabled,
        })
    }

    pub async fn get(&self, user_id: Uuid) -> Result<ProfileView, SocialError> {
        self.db
            .find_profile(user_id)
            .await?
            .map(ProfileView::from)
            .ok_or(SocialError::NotFound("profile"))
    }

    pub async fn rename(&self, user_id: Uuid, username: &str) -> Result<ProfileView, SocialError> {
        let username = username.trim();
        validate_username(username).map_err(SocialError::Validation)?;

        if self.db.find_profile(user_id).await?.is_none() {
            return Err(SocialError::NotFound("profile"));
        }
        self.db.update_username(user_id, username).await?;

        info!(user_id = %user_id, username = %username, "Username changed");
        Ok(ProfileView {
            user_id,
            username: username.to_string(),
        })
    }

    /// Prefix search on usernames, excluding the caller
    pub async fn search(&self, caller: Uuid, query: &str) -> Result<Vec<ProfileView>, SocialError> {
        let prefix: String = query
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }

        // One extra row in case the caller matches
        let found = self.db.search_profiles(&prefix, SEARCH_LIMIT + 1).await?;
        Ok(found
            .into_iter()
            .filter(|p| p.user_id != caller)
            .take(SEARCH_LIMIT)
            .map(ProfileView::from)
            .collect())
    }

    /// Display name for room listings; never fails
    pub async fn display_name(&self, user_id: Uuid) -> String {
        match self.db.find_profile(user_id).await {
            Ok(Some(profile)) => profile.username,
            Ok(None) => fallback_display_name(user_id),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to fetch profile");
                fallback_display_name(user_id)
            }
        }
    }
}
