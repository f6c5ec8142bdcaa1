use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::Json,
    pages::ProfilePage,
    query::{PageQuery, Query},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use yatube_common::model::user::Username;
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(profile)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
pub struct ProfilePath {
    pub username: Username,
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    State(db): State<Arc<DbClient>>,
    viewer: Option<AuthenticatedUser>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ProfilePage>> {
    let author = db
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))?;
    let page = db
        .fetch_posts_page(PostFilter::Author(author.id), query.page())
        .await?;

    let following = match viewer {
        Some(viewer) => db.is_following(viewer.user_id(), author.id).await?,
        None => false,
    };

    Ok(Json(ProfilePage {
        full_name: author.full_name(),
        posts_count: page.count,
        following,
        author,
        page,
    }))
}
