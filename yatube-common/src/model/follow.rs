use crate::model::{Id, user::UserMarker};
use thiserror::Error;

/// A subscription of `user` to the posts of `author`.
///
/// Both ids always differ.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Follow {
    user: Id<UserMarker>,
    author: Id<UserMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Users cannot follow themselves")]
pub struct SelfFollowError;

impl Follow {
    pub fn new(user: Id<UserMarker>, author: Id<UserMarker>) -> Result<Self, SelfFollowError> {
        if user == author {
            Err(SelfFollowError)
        } else {
            Ok(Self { user, author })
        }
    }

    #[must_use]
    pub fn user(self) -> Id<UserMarker> {
        self.user
    }

    #[must_use]
    pub fn author(self) -> Id<UserMarker> {
        self.author
    }
}
