//! Drives the real router against an in-memory database.

use crate::server::{
    self, ServerState,
    auth::{AuthSettings, issue_token},
    cache::IndexCache,
};
use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use serde_json::{Value, json};
use std::{path::Path, sync::Arc, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt;
use yatube_common::model::{
    Id,
    auth::Password,
    form::RequiredText,
    group::{CreateGroup, Group, GroupSlug},
    post::{NewPost, PostMarker},
    user::{CreateUser, User, Username},
};
use yatube_db::{client::DbClient, media::MediaStorage};

pub const TEST_PASSWORD: &str = "correct horse battery";

pub const SMALL_GIF: &[u8] = b"\x47\x49\x46\x38\x39\x61\x02\x00\
    \x01\x00\x80\x00\x00\x00\x00\x00\
    \xFF\xFF\xFF\x21\xF9\x04\x00\x00\
    \x00\x00\x00\x2C\x00\x00\x00\x00\
    \x02\x00\x01\x00\x00\x02\x02\x0C\
    \x0A\x00\x3B";

/// The JSON shape of an uploaded image.
pub fn image_upload(filename: &str, content: &[u8]) -> Value {
    json!({ "filename": filename, "content": BASE64_STANDARD.encode(content) })
}

pub struct TestApp {
    pub state: ServerState,
    router: Router,
    media_root: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_index_cache(Duration::from_secs(20)).await
    }

    pub async fn with_index_cache(time_to_live: Duration) -> Self {
        let db = DbClient::connect("sqlite::memory:", 1).await.unwrap();
        let media_root = tempfile::tempdir().unwrap();

        let state = ServerState {
            db_client: Arc::new(db),
            media: Arc::new(MediaStorage::new(media_root.path())),
            index_cache: IndexCache::new(time_to_live),
            auth_settings: AuthSettings::default(),
        };

        Self {
            router: server::app(state.clone()),
            state,
            media_root,
        }
    }

    pub fn media_root(&self) -> &Path {
        self.media_root.path()
    }

    pub fn db(&self) -> &DbClient {
        &self.state.db_client
    }

    pub async fn create_user(&self, username: &str) -> User {
        let password = Password::unchecked(TEST_PASSWORD.to_owned()).digest().unwrap();
        let user = CreateUser {
            username: Username::new(username.to_owned()).unwrap(),
            password,
            first_name: String::new(),
            last_name: String::new(),
        };

        self.db().create_user(&user).await.unwrap().unwrap()
    }

    pub async fn login(&self, user: &User) -> String {
        issue_token(self.db(), user.id, self.state.auth_settings)
            .await
            .unwrap()
    }

    pub async fn create_group(&self, slug: &str, title: &str) -> Group {
        let group = CreateGroup {
            title: title.to_owned(),
            slug: GroupSlug::new(slug.to_owned()).unwrap(),
            description: format!("All about {title}"),
        };

        self.db().create_group(&group).await.unwrap().unwrap()
    }

    pub async fn create_post(
        &self,
        author: &User,
        text: &str,
        group: Option<&Group>,
    ) -> Id<PostMarker> {
        let post = NewPost {
            author: author.id,
            text: RequiredText::new(text.to_owned()).unwrap(),
            group: group.map(|group| group.id),
            image: None,
        };

        self.db().create_post(&post).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: &Value) -> TestResponse {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();

        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .map(|location| location.to_str().unwrap())
    }

    /// Texts of the posts on a listing page, in order.
    pub fn post_texts(&self) -> Vec<String> {
        self.json()["page"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|post| post["text"].as_str().unwrap().to_owned())
            .collect()
    }
}
