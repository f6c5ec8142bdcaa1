use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::Json,
    pages::FollowPage,
    query::{PageQuery, Query},
    routes::profiles::ProfilePath,
};
use axum::{extract::State, response::Redirect};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use yatube_common::model::{follow::Follow, user::Username};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(follow_index)
        .typed_get(profile_follow)
        .typed_get(profile_unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/follow/", rejection(ServerError))]
pub struct FollowIndexPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow/", rejection(ServerError))]
pub struct ProfileFollowPath {
    pub username: Username,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow/", rejection(ServerError))]
pub struct ProfileUnfollowPath {
    pub username: Username,
}

/// Posts of every author the user follows, newest first.
async fn follow_index(
    FollowIndexPath(): FollowIndexPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<FollowPage>> {
    let page = db
        .fetch_posts_page(PostFilter::FollowedBy(user.user_id()), query.page())
        .await?;

    Ok(Json(FollowPage { page }))
}

async fn profile_follow(
    ProfileFollowPath { username }: ProfileFollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Redirect> {
    let author = db
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))?;

    match Follow::new(user.user_id(), author.id) {
        Ok(follow) => {
            if db.create_follow(follow).await? {
                info!(user = %user.user().username, author = %author.username, "Followed author");
            }
        }
        Err(err) => debug!(%err, user = %user.user().username, "Ignoring follow request"),
    }

    Ok(Redirect::to(&ProfilePath { username: author.username }.to_string()))
}

async fn profile_unfollow(
    ProfileUnfollowPath { username }: ProfileUnfollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Redirect> {
    let author = db
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))?;

    if db.delete_follow(user.user_id(), author.id).await? {
        info!(user = %user.user().username, author = %author.username, "Unfollowed author");
    }

    Ok(Redirect::to(&ProfilePath { username: author.username }.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::server::testing::TestApp;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn feed_contains_only_followed_authors() {
        let app = TestApp::new().await;
        let a = app.create_user("a").await;
        let b = app.create_user("b").await;
        let c = app.create_user("c").await;
        let a_token = app.login(&a).await;
        let c_token = app.login(&c).await;

        let response = app.get("/profile/b/follow/", Some(&a_token)).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some("/profile/b/"));

        app.create_post(&b, "hello", None).await;
        app.create_post(&c, "unrelated", None).await;

        let feed = app.get("/follow/", Some(&a_token)).await;
        assert_eq!(feed.status, StatusCode::OK);
        assert_eq!(feed.post_texts(), ["hello"]);
        assert_eq!(feed.json()["page"]["items"][0]["author"]["username"], "b");

        let empty = app.get("/follow/", Some(&c_token)).await;
        assert!(empty.post_texts().is_empty());
    }

    #[tokio::test]
    async fn following_twice_stores_one_record() {
        let app = TestApp::new().await;
        let follower = app.create_user("follower").await;
        let author = app.create_user("author").await;
        let token = app.login(&follower).await;

        app.get("/profile/author/follow/", Some(&token)).await;
        let again = app.get("/profile/author/follow/", Some(&token)).await;
        assert_eq!(again.status, StatusCode::SEE_OTHER);

        assert!(app.db().is_following(follower.id, author.id).await.unwrap());
        assert!(app.db().delete_follow(follower.id, author.id).await.unwrap());
        assert!(!app.db().is_following(follower.id, author.id).await.unwrap());
    }

    #[tokio::test]
    async fn self_follow_is_ignored() {
        let app = TestApp::new().await;
        let user = app.create_user("narcissus").await;
        let token = app.login(&user).await;

        let response = app.get("/profile/narcissus/follow/", Some(&token)).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some("/profile/narcissus/"));
        assert!(!app.db().is_following(user.id, user.id).await.unwrap());
    }

    #[tokio::test]
    async fn unfollow_removes_author_from_feed() {
        let app = TestApp::new().await;
        let follower = app.create_user("follower").await;
        let author = app.create_user("author").await;
        let token = app.login(&follower).await;
        app.create_post(&author, "Gone soon", None).await;

        app.get("/profile/author/follow/", Some(&token)).await;
        assert_eq!(app.get("/follow/", Some(&token)).await.post_texts(), ["Gone soon"]);

        let response = app.get("/profile/author/unfollow/", Some(&token)).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some("/profile/author/"));
        assert!(app.get("/follow/", Some(&token)).await.post_texts().is_empty());
    }

    #[tokio::test]
    async fn follow_routes_require_login() {
        let app = TestApp::new().await;
        app.create_user("author").await;

        let feed = app.get("/follow/?page=2", None).await;
        assert_eq!(feed.status, StatusCode::SEE_OTHER);
        assert_eq!(feed.location(), Some("/auth/login/?next=/follow/%3Fpage%3D2"));

        let follow = app.get("/profile/author/follow/", None).await;
        assert_eq!(follow.location(), Some("/auth/login/?next=/profile/author/follow/"));
    }

    #[tokio::test]
    async fn following_unknown_user_is_not_found() {
        let app = TestApp::new().await;
        let user = app.create_user("user").await;
        let token = app.login(&user).await;

        let response = app.get("/profile/ghost/follow/", Some(&token)).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}
