use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    cache::IndexCache,
    json::{Json, RenderedJson},
    pages::{IndexPage, PostDetailPage, PostFormPage, PostFormValues},
    query::{PageQuery, Query},
    routes::profiles::ProfilePath,
};
use axum::{
    body::Bytes,
    extract::State,
    http::Uri,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info};
use yatube_common::model::{
    Id,
    comment::NewComment,
    form::{
        CleanedImage, CleanedPostForm, CommentForm, FormErrors, INVALID_CHOICE_MESSAGE, PostForm,
        field,
    },
    post::{NewPost, PostMarker, PostUpdate},
};
use yatube_db::{
    client::{DbClient, PostFilter},
    media::MediaStorage,
};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(post_detail)
        .typed_get(post_create_form)
        .typed_post(post_create)
        .typed_get(post_edit_form)
        .typed_post(post_edit)
        .typed_post(add_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
pub struct IndexPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{post_id}/", rejection(ServerError))]
pub struct PostDetailPath {
    pub post_id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/create/", rejection(ServerError))]
pub struct PostCreatePath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{post_id}/edit/", rejection(ServerError))]
pub struct PostEditPath {
    pub post_id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{post_id}/comment/", rejection(ServerError))]
pub struct AddCommentPath {
    pub post_id: Id<PostMarker>,
}

async fn index(
    IndexPath(): IndexPath,
    uri: Uri,
    State(db): State<Arc<DbClient>>,
    State(cache): State<IndexCache>,
    Query(query): Query<PageQuery>,
) -> Result<RenderedJson> {
    let key = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_owned(), ToString::to_string);

    let page = cache
        .get_or_render(key, async {
            let page = db.fetch_posts_page(PostFilter::All, query.page()).await?;
            Json(IndexPage { page }).into_bytes()
        })
        .await?;

    Ok(RenderedJson(page))
}

async fn post_detail(
    PostDetailPath { post_id }: PostDetailPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostDetailPage>> {
    let post = db
        .fetch_post(post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;
    let author_posts_count = db.count_posts(PostFilter::Author(post.author.id)).await?;
    let comments = db.fetch_post_comments(post_id).await?;

    Ok(Json(PostDetailPage {
        post,
        author_posts_count,
        comments,
        form: CommentForm::default(),
    }))
}

async fn post_create_form(
    PostCreatePath(): PostCreatePath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<PostFormPage>> {
    let groups = db.fetch_groups().await?;

    Ok(Json(PostFormPage {
        is_edit: false,
        form: PostFormValues::default(),
        groups,
    }))
}

async fn post_create(
    PostCreatePath(): PostCreatePath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStorage>>,
    user: AuthenticatedUser,
    Json(form): Json<PostForm>,
) -> Result<Redirect> {
    let form = clean_post_form(&db, form).await?;
    let image = save_image(&media, form.image).await?;

    let post = NewPost {
        author: user.user_id(),
        text: form.text,
        group: form.group,
        image,
    };
    let post_id = match db.create_post(&post).await {
        Ok(post_id) => post_id,
        Err(err) => {
            discard_image(&media, post.image.as_deref()).await;
            return Err(err.into());
        }
    };
    info!(%post_id, author = %user.user().username, "Created post");

    let profile = ProfilePath {
        username: user.user().username.clone(),
    };
    Ok(Redirect::to(&profile.to_string()))
}

async fn post_edit_form(
    PostEditPath { post_id }: PostEditPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let post = db
        .fetch_post(post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    if post.author.id != user.user_id() {
        return Ok(Redirect::to(&PostDetailPath { post_id }.to_string()).into_response());
    }

    let groups = db.fetch_groups().await?;
    Ok(Json(PostFormPage {
        is_edit: true,
        form: post.into(),
        groups,
    })
    .into_response())
}

/// The body is only parsed once the user turned out to be the author.
async fn post_edit(
    PostEditPath { post_id }: PostEditPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStorage>>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Redirect> {
    let detail = Redirect::to(&PostDetailPath { post_id }.to_string());

    let post = db
        .fetch_post(post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    if post.author.id != user.user_id() {
        debug!(%post_id, user = %user.user().username, "Refusing edit by non-author");
        return Ok(detail);
    }

    let Json(form) = Json::<PostForm>::from_bytes(&body)?;
    let form = clean_post_form(&db, form).await?;
    let uploaded = save_image(&media, form.image).await?;

    let update = PostUpdate {
        text: form.text,
        group: form.group,
        image: uploaded.clone().or(post.image),
    };
    match db.update_post(post_id, &update).await {
        Ok(true) => {}
        Ok(false) => {
            discard_image(&media, uploaded.as_deref()).await;
            return Err(ServerError::PostByIdNotFound(post_id));
        }
        Err(err) => {
            discard_image(&media, uploaded.as_deref()).await;
            return Err(err.into());
        }
    }
    info!(%post_id, "Edited post");

    Ok(detail)
}

async fn add_comment(
    AddCommentPath { post_id }: AddCommentPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(form): Json<CommentForm>,
) -> Result<Redirect> {
    if db.fetch_post(post_id).await?.is_none() {
        return Err(ServerError::PostByIdNotFound(post_id));
    }

    let comment = NewComment {
        post: post_id,
        author: user.user_id(),
        text: form.clean()?,
    };
    // The post may have been deleted since it was fetched.
    let comment_id = db
        .create_comment(&comment)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;
    info!(%comment_id, %post_id, author = %user.user().username, "Added comment");

    Ok(Redirect::to(&PostDetailPath { post_id }.to_string()))
}

/// Runs the form's own checks and verifies that the chosen group exists.
async fn clean_post_form(db: &DbClient, form: PostForm) -> Result<CleanedPostForm> {
    let mut errors = FormErrors::new();
    if let Some(group) = form.group
        && db.fetch_group(group).await?.is_none()
    {
        errors.add(field::GROUP, INVALID_CHOICE_MESSAGE);
    }

    match form.clean() {
        Ok(form) => Ok(errors.into_result(form)?),
        Err(form_errors) => {
            errors.extend(form_errors);
            Err(errors.into())
        }
    }
}

async fn save_image(
    media: &MediaStorage,
    image: Option<CleanedImage>,
) -> Result<Option<String>> {
    let Some(image) = image else {
        return Ok(None);
    };

    let path = media.save_post_image(&image.filename, &image.content).await?;
    Ok(Some(path))
}

/// Removes an image whose post was never stored.
async fn discard_image(media: &MediaStorage, image: Option<&str>) {
    if let Some(image) = image
        && let Err(err) = media.remove(image).await
    {
        error!(%err, image, "Could not remove unused image");
    }
}
