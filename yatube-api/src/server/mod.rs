use crate::server::{auth::AuthSettings, cache::IndexCache, json::Json};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::{extract::QueryRejection, typed_header::TypedHeaderRejection};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error};
use yatube_common::model::{
    Id,
    auth::{AuthTokenDecodeError, AuthTokenHashError, PasswordHashError},
    form::FormErrors,
    group::GroupSlug,
    post::PostMarker,
    user::Username,
};
use yatube_db::{
    client::{DbClient, DbError},
    media::{MediaError, MediaStorage},
};

pub mod auth;
pub mod cache;
mod json;
mod pages;
mod query;
mod routes;
#[cfg(test)]
mod testing;

pub const MEDIA_URL: &str = "/media";
pub const LOGIN_PATH: &str = "/auth/login/";

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub media: Arc<MediaStorage>,
    pub index_cache: IndexCache,
    pub auth_settings: AuthSettings,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// The complete application: routes, uploaded media and request tracing.
pub fn app(state: ServerState) -> Router {
    let media = ServeDir::new(state.media.root());

    routes()
        .nest_service(MEDIA_URL, media)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

/// Where anonymous users are sent, remembering the page they asked for.
#[must_use]
pub fn login_url(next: &Uri) -> String {
    let target = next
        .path_and_query()
        .map_or_else(|| next.path(), |path_and_query| path_and_query.as_str());

    // `/` stays readable in the next parameter.
    let next = urlencoding::encode(target).replace("%2F", "/");
    format!("{LOGIN_PATH}?next={next}")
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Login required to access {0}")]
    LoginRequired(Uri),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error(transparent)]
    Form(#[from] FormErrors),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Shared(Arc<ServerError>),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User with username {0} was not found.")]
    UserByUsernameNotFound(Username),
    #[error("Group with slug {0} was not found.")]
    GroupBySlugNotFound(GroupSlug),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Shared(error) => error.status(),
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByUsernameNotFound(_)
            | ServerError::GroupBySlugNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::LoginRequired(_) => StatusCode::SEE_OTHER,
            ServerError::InvalidAuthorizationHeader(rejection) if rejection.is_missing() => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::InvalidToken => StatusCode::UNAUTHORIZED,
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_) => StatusCode::BAD_REQUEST,
            ServerError::Form(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::Media(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FormErrors>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let errors = match self {
            ServerError::LoginRequired(next) => {
                debug!(%next, "Redirecting anonymous request to login");
                return Redirect::to(&login_url(&next)).into_response();
            }
            ServerError::Form(errors) => {
                debug!(?errors, %status, "Rejecting invalid form");
                Some(errors)
            }
            error => {
                error!(%error, %status, "Replying with error");
                None
            }
        };

        let error_response = ErrorResponse {
            status: status.as_u16(),
            errors,
        };
        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::{login_url, testing::TestApp};
    use axum::http::{StatusCode, Uri};
    use serde_json::json;
    use time::{Duration, UtcDateTime};
    use yatube_common::{
        model::auth::{AuthToken, Authentication},
        util::PositiveDuration,
    };

    #[test]
    fn login_url_keeps_path_and_query() {
        let uri: Uri = "/create/".parse().unwrap();
        assert_eq!(login_url(&uri), "/auth/login/?next=/create/");

        let uri: Uri = "/follow/?page=2".parse().unwrap();
        assert_eq!(login_url(&uri), "/auth/login/?next=/follow/%3Fpage%3D2");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = TestApp::new().await;

        let response = app.get("/definitely/not/here/", None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json(), json!({ "status": 404 }));
    }

    #[tokio::test]
    async fn malformed_tokens_are_rejected() {
        let app = TestApp::new().await;

        let response = app.get("/follow/", Some("not-a-token")).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json(), json!({ "status": 400 }));
    }

    #[tokio::test]
    async fn unknown_tokens_are_unauthorized() {
        let app = TestApp::new().await;
        let user = app.create_user("user").await;

        let token = AuthToken::generate_random(user.id).as_token_str();
        let response = app.get("/follow/", Some(&token)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_tokens_are_unauthorized() {
        let app = TestApp::new().await;
        let user = app.create_user("user").await;

        let token = AuthToken::generate_random(user.id);
        let authentication = Authentication {
            user: user.id,
            token_hash: token.hash().unwrap(),
            created_at: UtcDateTime::now() - Duration::hours(2),
            expires_after: PositiveDuration::from_seconds(3600),
        };
        app.db().create_authentication(&authentication).await.unwrap();

        let response = app.get("/follow/", Some(&token.as_token_str())).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_json_is_a_bad_request() {
        let app = TestApp::new().await;
        let user = app.create_user("user").await;
        let token = app.login(&user).await;

        let response = app.post_json("/create/", Some(&token), &json!([1, 2, 3])).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }
}
