//! Documents the page handlers respond with.

use serde::Serialize;
use yatube_common::{
    model::{
        Id,
        comment::Comment,
        form::{CommentForm, field},
        group::{Group, GroupMarker},
        post::Post,
        user::User,
    },
    pagination::Page,
};

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct IndexPage {
    pub page: Page<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct GroupPage {
    pub group: Group,
    pub page: Page<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct ProfilePage {
    pub author: User,
    pub full_name: String,
    pub posts_count: u64,
    /// Whether the viewer follows the author. Always false for anonymous viewers.
    pub following: bool,
    pub page: Page<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct FollowPage {
    pub page: Page<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct PostDetailPage {
    pub post: Post,
    pub author_posts_count: u64,
    pub comments: Vec<Comment>,
    pub form: CommentForm,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct PostFormValues {
    pub text: String,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}

impl From<Post> for PostFormValues {
    fn from(post: Post) -> Self {
        Self {
            text: post.text,
            group: post.group.map(|group| group.id),
            image: post.image,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct PostFormPage {
    pub is_edit: bool,
    pub form: PostFormValues,
    /// Choices for the group field.
    pub groups: Vec<Group>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct LoginPage {
    pub next: Option<String>,
    pub fields: [&'static str; 2],
}

impl LoginPage {
    #[must_use]
    pub fn new(next: Option<String>) -> Self {
        Self {
            next,
            fields: [field::USERNAME, field::PASSWORD],
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub next: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize)]
pub struct AboutPage {
    pub title: &'static str,
    pub text: &'static str,
}
