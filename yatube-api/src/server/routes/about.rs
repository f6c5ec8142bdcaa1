use crate::server::{ServerError, ServerRouter, json::Json, pages::AboutPage};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(about_author)
        .typed_get(about_tech)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/about/author/", rejection(ServerError))]
pub struct AboutAuthorPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/about/tech/", rejection(ServerError))]
pub struct AboutTechPath();

const AUTHOR_PAGE: AboutPage = AboutPage {
    title: "About the author",
    text: "Yatube is written and maintained by a small team of developers \
           who like to share what they read and write.",
};

const TECH_PAGE: AboutPage = AboutPage {
    title: "Technologies",
    text: "Yatube is an axum service on tokio, storing its data in SQLite through sqlx.",
};

async fn about_author(AboutAuthorPath(): AboutAuthorPath) -> Json<AboutPage> {
    Json(AUTHOR_PAGE)
}

async fn about_tech(AboutTechPath(): AboutTechPath) -> Json<AboutPage> {
    Json(TECH_PAGE)
}
