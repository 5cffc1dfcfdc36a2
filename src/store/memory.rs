//! In-process store backed by concurrent maps

use axum::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use super::{
    Database, FriendshipRecord, FriendshipStatus, ProfileRecord, StoreError, TwoFactorUpdate,
    UserRecord,
};

/// Unordered key for a pair of users
fn pair_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Map-backed [`Database`]. Unique indexes are claimed through the entry API
/// so concurrent inserts of the same email or username cannot both succeed.
#[derive(Default)]
pub struct MemoryDatabase {
    users: DashMap<Uuid, UserRecord>,
    emails: DashMap<String, Uuid>,
    profiles: DashMap<Uuid, ProfileRecord>,
    /// Lowercased username -> user id
    usernames: DashMap<String, Uuid>,
    friendships: DashMap<Uuid, FriendshipRecord>,
    pairs: DashMap<(Uuid, Uuid), Uuid>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Conflict("email already registered")),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some(id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        self.find_user(id).await
    }

    async fn update_two_factor(&self, id: Uuid, update: &TwoFactorUpdate) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.two_factor_enabled = update.two_factor_enabled;
            user.two_factor_secret = update.two_factor_secret.clone();
            user.backup_codes = update.backup_codes.clone();
        }
        Ok(())
    }

    async fn replace_backup_codes(
        &self,
        id: Uuid,
        expected: &[String],
        remaining: &[String],
    ) -> Result<bool, StoreError> {
        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(false);
        };
        if user.backup_codes != expected {
            return Ok(false);
        }
        user.backup_codes = remaining.to_vec();
        Ok(true)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some((_, user)) = self.users.remove(&id) {
            self.emails.remove(&user.email);
        }
        Ok(())
    }

    async fn insert_profile(&self, profile: &ProfileRecord) -> Result<(), StoreError> {
        match self.usernames.entry(profile.username.to_lowercase()) {
            Entry::Occupied(_) => return Err(StoreError::Conflict("username already taken")),
            Entry::Vacant(slot) => {
                slot.insert(profile.user_id);
            }
        }
        self.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<ProfileRecord>, StoreError> {
        Ok(self.profiles.get(&user_id).map(|p| p.value().clone()))
    }

    async fn find_profile_by_username(
        &self,
        username: &str,
    ) -> Result<Option<ProfileRecord>, StoreError> {
        let Some(id) = self.usernames.get(&username.to_lowercase()).map(|id| *id) else {
            return Ok(None);
        };
        self.find_profile(id).await
    }

    async fn list_profiles(&self, user_ids: &[Uuid]) -> Result<Vec<ProfileRecord>, StoreError> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|p| p.value().clone()))
            .collect())
    }

    async fn search_profiles(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ProfileRecord>, StoreError> {
        let prefix = prefix.to_lowercase();
        let mut found: Vec<ProfileRecord> = self
            .profiles
            .iter()
            .filter(|p| p.username.to_lowercase().starts_with(&prefix))
            .map(|p| p.value().clone())
            .collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        found.truncate(limit);
        Ok(found)
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> Result<(), StoreError> {
        let new_key = username.to_lowercase();
        let Some(old) = self.profiles.get(&user_id).map(|p| p.username.to_lowercase()) else {
            return Ok(());
        };

        if old != new_key {
            match self.usernames.entry(new_key) {
                Entry::Occupied(_) => return Err(StoreError::Conflict("username already taken")),
                Entry::Vacant(slot) => {
                    slot.insert(user_id);
                }
            }
            self.usernames.remove(&old);
        }

        if let Some(mut profile) = self.profiles.get_mut(&user_id) {
            profile.username = username.to_string();
        }
        Ok(())
    }

    async fn insert_friendship(&self, friendship: &FriendshipRecord) -> Result<(), StoreError> {
        let key = pair_key(friendship.requester_id, friendship.addressee_id);
        match self.pairs.entry(key) {
            Entry::Occupied(_) => return Err(StoreError::Conflict("friendship already exists")),
            Entry::Vacant(slot) => {
                slot.insert(friendship.id);
            }
        }
        self.friendships.insert(friendship.id, friendship.clone());
        Ok(())
    }

    async fn find_friendship(&self, id: Uuid) -> Result<Option<FriendshipRecord>, StoreError> {
        Ok(self.friendships.get(&id).map(|f| f.value().clone()))
    }

    async fn find_friendship_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<FriendshipRecord>, StoreError> {
        let Some(id) = self.pairs.get(&pair_key(a, b)).map(|id| *id) else {
            return Ok(None);
        };
        self.find_friendship(id).await
    }

    async fn update_friendship_status(
        &self,
        id: Uuid,
        status: FriendshipStatus,
    ) -> Result<(), StoreError> {
        if let Some(mut friendship) = self.friendships.get_mut(&id) {
            friendship.status = status;
        }
        Ok(())
    }

    async fn delete_friendship(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some((_, friendship)) = self.friendships.remove(&id) {
            self.pairs
                .remove(&pair_key(friendship.requester_id, friendship.addressee_id));
        }
        Ok(())
    }

    async fn list_friendships(
        &self,
        user_id: Uuid,
        status: FriendshipStatus,
    ) -> Result<Vec<FriendshipRecord>, StoreError> {
        let mut rows: Vec<FriendshipRecord> = self
            .friendships
            .iter()
            .filter(|f| {
                f.status == status && (f.requester_id == user_id || f.addressee_id == user_id)
            })
            .map(|f| f.value().clone())
            .collect();
        rows.sort_by_key(|f| f.created_at);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            two_factor_enabled: false,
            two_factor_secret: None,
            backup_codes: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn profile(user_id: Uuid, username: &str) -> ProfileRecord {
        ProfileRecord {
            user_id,
            username: username.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = MemoryDatabase::new();
        db.insert_user(&user("a@example.com")).await.unwrap();
        let err = db.insert_user(&user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn usernames_are_unique_ignoring_case() {
        let db = MemoryDatabase::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        db.insert_profile(&profile(a, "Alice")).await.unwrap();
        let err = db.insert_profile(&profile(b, "alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let found = db.find_profile_by_username("ALICE").await.unwrap().unwrap();
        assert_eq!(found.user_id, a);
    }

    #[tokio::test]
    async fn rename_releases_old_username() {
        let db = MemoryDatabase::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        db.insert_profile(&profile(a, "alice")).await.unwrap();
        db.update_username(a, "alicia").await.unwrap();

        db.insert_profile(&profile(b, "alice")).await.unwrap();
        assert!(db.update_username(b, "Alicia").await.is_err());
        assert_eq!(db.find_profile(a).await.unwrap().unwrap().username, "alicia");
    }

    #[tokio::test]
    async fn one_friendship_per_pair_in_either_direction() {
        let db = MemoryDatabase::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = FriendshipRecord::new(a, b);
        db.insert_friendship(&first).await.unwrap();
        assert!(db.insert_friendship(&FriendshipRecord::new(b, a)).await.is_err());

        let found = db.find_friendship_between(b, a).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);

        db.delete_friendship(first.id).await.unwrap();
        assert!(db.find_friendship_between(a, b).await.unwrap().is_none());
        db.insert_friendship(&FriendshipRecord::new(b, a)).await.unwrap();
    }

    #[tokio::test]
    async fn search_is_prefix_and_limited() {
        let db = MemoryDatabase::new();
        for name in ["bob", "bobby", "bobcat", "alice"] {
            db.insert_profile(&profile(Uuid::new_v4(), name)).await.unwrap();
        }
        let hits = db.search_profiles("Bob", 2).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "bobby"]);
    }
}
