//! Friend requests and friend lists

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::store::{Database, FriendshipRecord, FriendshipStatus};

use super::profiles::{fallback_display_name, validate_username};
use super::SocialError;

/// A friendship row as seen by one of its participants
#[derive(Debug, Clone, Serialize)]
pub struct FriendshipView {
    pub id: Uuid,
    /// The other participant
    pub user_id: Uuid,
    pub username: String,
    pub status: FriendshipStatus,
    /// True when the viewer sent the request
    pub outgoing: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRequests {
    pub incoming: Vec<FriendshipView>,
    pub outgoing: Vec<FriendshipView>,
}

#[derive(Clone)]
pub struct FriendService {
    db: Arc<dyn Database>,
}

impl FriendService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Send a request to `to_username`. A pending request in the opposite
    /// direction is accepted instead of creating a second row.
    pub async fn request(
        &self,
        from: Uuid,
        to_username: &str,
    ) -> Result<FriendshipView, SocialError> {
        let to_username = to_username.trim();
        // No profile can carry a malformed name
        if validate_username(to_username).is_err() {
            return Err(SocialError::NotFound("user"));
        }
        let target = self
            .db
            .find_profile_by_username(to_username)
            .await?
            .ok_or(SocialError::NotFound("user"))?;
        if target.user_id == from {
            return Err(SocialError::Validation(
                "You cannot send a friend request to yourself".to_string(),
            ));
        }

        if let Some(existing) = self.db.find_friendship_between(from, target.user_id).await? {
            return match existing.status {
                FriendshipStatus::Accepted => Err(SocialError::Conflict("already friends")),
                FriendshipStatus::Pending if existing.requester_id == from => {
                    Err(SocialError::Conflict("friend request already sent"))
                }
                FriendshipStatus::Pending => {
                    self.db
                        .update_friendship_status(existing.id, FriendshipStatus::Accepted)
                        .await?;
                    info!(
                        friendship_id = %existing.id,
                        user_id = %from,
                        "Crossed friend requests, accepted"
                    );
                    let accepted = FriendshipRecord {
                        status: FriendshipStatus::Accepted,
                        ..existing
                    };
                    Ok(view(&accepted, from, target.username))
                }
            };
        }

        let friendship = FriendshipRecord::new(from, target.user_id);
        self.db.insert_friendship(&friendship).await?;

        info!(
            friendship_id = %friendship.id,
            requester_id = %from,
            addressee_id = %target.user_id,
            "Friend request sent"
        );
        Ok(view(&friendship, from, target.username))
    }

    /// Accept a pending request; only its addressee may do so
    pub async fn accept(&self, user_id: Uuid, request_id: Uuid) -> Result<FriendshipView, SocialError> {
        let friendship = self.addressed_request(user_id, request_id).await?;

        self.db
            .update_friendship_status(friendship.id, FriendshipStatus::Accepted)
            .await?;
        info!(friendship_id = %friendship.id, user_id = %user_id, "Friend request accepted");

        let accepted = FriendshipRecord {
            status: FriendshipStatus::Accepted,
            ..friendship
        };
        let username = self.username_of(accepted.requester_id).await?;
        Ok(view(&accepted, user_id, username))
    }

    /// Decline (delete) a pending request; only its addressee may do so
    pub async fn decline(&self, user_id: Uuid, request_id: Uuid) -> Result<(), SocialError> {
        let friendship = self.addressed_request(user_id, request_id).await?;
        self.db.delete_friendship(friendship.id).await?;
        info!(friendship_id = %friendship.id, user_id = %user_id, "Friend request declined");
        Ok(())
    }

    /// Remove an accepted friend, or withdraw one's own pending request
    pub async fn remove(&self, user_id: Uuid, other_id: Uuid) -> Result<(), SocialError> {
        let friendship = self
            .db
            .find_friendship_between(user_id, other_id)
            .await?
            .ok_or(SocialError::NotFound("friendship"))?;

        if friendship.status == FriendshipStatus::Pending && friendship.requester_id != user_id {
            return Err(SocialError::Forbidden("decline the request instead"));
        }

        self.db.delete_friendship(friendship.id).await?;
        info!(friendship_id = %friendship.id, user_id = %user_id, "Friendship removed");
        Ok(())
    }

    pub async fn friends(&self, user_id: Uuid) -> Result<Vec<FriendshipView>, SocialError> {
        let rows = self
            .db
            .list_friendships(user_id, FriendshipStatus::Accepted)
            .await?;
        self.views(user_id, rows).await
    }

    pub async fn pending(&self, user_id: Uuid) -> Result<PendingRequests, SocialError> {
        let rows = self
            .db
            .list_friendships(user_id, FriendshipStatus::Pending)
            .await?;
        let (outgoing, incoming): (Vec<_>, Vec<_>) = self
            .views(user_id, rows)
            .await?
            .into_iter()
            .partition(|v| v.outgoing);
        Ok(PendingRequests { incoming, outgoing })
    }

    async fn addressed_request(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<FriendshipRecord, SocialError> {
        let friendship = self
            .db
            .find_friendship(request_id)
            .await?
            .ok_or(SocialError::NotFound("friend request"))?;

        if friendship.addressee_id != user_id {
            return Err(SocialError::Forbidden("request is not addressed to you"));
        }
        if friendship.status != FriendshipStatus::Pending {
            return Err(SocialError::Conflict("request already accepted"));
        }
        Ok(friendship)
    }

    async fn username_of(&self, user_id: Uuid) -> Result<String, SocialError> {
        Ok(self
            .db
            .find_profile(user_id)
            .await?
            .map(|p| p.username)
            .unwrap_or_else(|| fallback_display_name(user_id)))
    }

    /// Attach the other party's username to each row, one profile query
    async fn views(
        &self,
        viewer: Uuid,
        rows: Vec<FriendshipRecord>,
    ) -> Result<Vec<FriendshipView>, SocialError> {
        let others: Vec<Uuid> = rows.iter().map(|f| f.other_party(viewer)).collect();
        let names: HashMap<Uuid, String> = self
            .db
            .list_profiles(&others)
            .await?
            .into_iter()
            .map(|p| (p.user_id, p.username))
            .collect();

        Ok(rows
            .iter()
            .map(|f| {
                let other = f.other_party(viewer);
                let username = names
                    .get(&other)
                    .cloned()
                    .unwrap_or_else(|| fallback_display_name(other));
                view(f, viewer, username)
            })
            .collect())
    }
}

fn view(f: &FriendshipRecord, viewer: Uuid, username: String) -> FriendshipView {
    FriendshipView {
        id: f.id,
        user_id: f.other_party(viewer),
        username,
        status: f.status,
        outgoing: f.requester_id == viewer,
        created_at: f.created_at,
    }
}
