use crate::server::{
    Result, ServerError, ServerRouter,
    json::Json,
    pages::GroupPage,
    query::{PageQuery, Query},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use yatube_common::model::group::GroupSlug;
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(group_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
pub struct GroupPostsPath {
    pub slug: GroupSlug,
}

async fn group_posts(
    GroupPostsPath { slug }: GroupPostsPath,
    State(db): State<Arc<DbClient>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<GroupPage>> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;
    let page = db
        .fetch_posts_page(PostFilter::Group(group.id), query.page())
        .await?;

    Ok(Json(GroupPage { group, page }))
}
