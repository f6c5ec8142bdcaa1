use crate::model::{
    Id,
    form::RequiredText,
    group::{Group, GroupMarker},
    user::{User, UserMarker},
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use time::OffsetDateTime;

/// Number of characters of the text a post is displayed as.
pub const POST_EXCERPT_LEN: usize = 15;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: String,
    pub author: User,
    pub group: Option<Group>,
    /// Path of the uploaded image relative to the media root, e.g. `posts/cat.gif`.
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub pub_date: OffsetDateTime,
}

impl Display for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let excerpt: String = self.text.chars().take(POST_EXCERPT_LEN).collect();
        f.write_str(&excerpt)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub author: Id<UserMarker>,
    pub text: RequiredText,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}

/// Replacement values for the editable fields of a post.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostUpdate {
    pub text: RequiredText,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}
