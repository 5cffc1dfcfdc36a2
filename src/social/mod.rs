//! Profiles and friend relationships

pub mod friends;
pub mod profiles;

pub use friends::FriendService;
pub use profiles::ProfileService;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SocialError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(what) => SocialError::Conflict(what),
            other => SocialError::Store(other),
        }
    }
}
