//! Persistence for users, profiles and friendships
//!
//! Two backends implement [`Database`]: PostgREST (Supabase) for deployments
//! and an in-process map store used when no Supabase project is configured.

pub mod memory;
pub mod supabase;

use axum::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryDatabase;
pub use supabase::{SupabaseClient, SupabaseDatabase, SupabaseError};

/// Account credentials and 2FA state (`users` table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub two_factor_enabled: bool,
    /// Base32 TOTP secret; present while 2FA is pending or enabled
    pub two_factor_secret: Option<String>,
    /// SHA-256 hex digests of the unused backup codes
    #[serde(default)]
    pub backup_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Display identity, 1:1 with a user (`profiles` table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendshipStatus::Pending => "PENDING",
            FriendshipStatus::Accepted => "ACCEPTED",
        }
    }
}

/// Directed friend request (`friendships` table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendshipRecord {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub addressee_id: Uuid,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
}

impl FriendshipRecord {
    pub fn new(requester_id: Uuid, addressee_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id,
            addressee_id,
            status: FriendshipStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// The participant that is not `user_id`
    pub fn other_party(&self, user_id: Uuid) -> Uuid {
        if self.requester_id == user_id {
            self.addressee_id
        } else {
            self.requester_id
        }
    }
}

/// Replacement 2FA columns written as one unit
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorUpdate {
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub backup_codes: Vec<String>,
}

impl TwoFactorUpdate {
    pub fn disabled() -> Self {
        Self {
            two_factor_enabled: false,
            two_factor_secret: None,
            backup_codes: Vec::new(),
        }
    }
}

/// Storage operations used by the services
#[async_trait]
pub trait Database: Send + Sync {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn update_two_factor(&self, id: Uuid, update: &TwoFactorUpdate) -> Result<(), StoreError>;
    /// Swap the backup code list only if it still equals `expected`.
    /// Returns false when another writer got there first.
    async fn replace_backup_codes(
        &self,
        id: Uuid,
        expected: &[String],
        remaining: &[String],
    ) -> Result<bool, StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError>;

    async fn insert_profile(&self, profile: &ProfileRecord) -> Result<(), StoreError>;
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<ProfileRecord>, StoreError>;
    async fn find_profile_by_username(&self, username: &str)
        -> Result<Option<ProfileRecord>, StoreError>;
    async fn list_profiles(&self, user_ids: &[Uuid]) -> Result<Vec<ProfileRecord>, StoreError>;
    async fn search_profiles(&self, prefix: &str, limit: usize)
        -> Result<Vec<ProfileRecord>, StoreError>;
    async fn update_username(&self, user_id: Uuid, username: &str) -> Result<(), StoreError>;

    async fn insert_friendship(&self, friendship: &FriendshipRecord) -> Result<(), StoreError>;
    async fn find_friendship(&self, id: Uuid) -> Result<Option<FriendshipRecord>, StoreError>;
    async fn find_friendship_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<FriendshipRecord>, StoreError>;
    async fn update_friendship_status(
        &self,
        id: Uuid,
        status: FriendshipStatus,
    ) -> Result<(), StoreError>;
    async fn delete_friendship(&self, id: Uuid) -> Result<(), StoreError>;
    async fn list_friendships(
        &self,
        user_id: Uuid,
        status: FriendshipStatus,
    ) -> Result<Vec<FriendshipRecord>, StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint (email, username, friendship pair) was violated
    #[error("Conflict: {0}")]
    Conflict(&'static str),

    #[error(transparent)]
    Supabase(#[from] SupabaseError),
}
