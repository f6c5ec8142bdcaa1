use crate::server::{
    Result, ServerError, ServerRouter,
    auth::{AuthSettings, AuthenticatedUser, issue_token},
    json::Json,
    pages::{LoginPage, TokenResponse},
    query::{NextQuery, Query},
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use yatube_common::model::{
    auth::Password,
    form::{
        FormErrors, INVALID_LOGIN_MESSAGE, LoginForm, REQUIRED_MESSAGE, SignupForm,
        USERNAME_TAKEN_MESSAGE, field,
    },
    user::{CreateUser, User, Username},
};
use yatube_db::client::DbClient;

const DEFAULT_NEXT: &str = "/";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(signup)
        .typed_get(login_form)
        .typed_post(login)
        .typed_post(logout)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup/", rejection(ServerError))]
pub struct SignupPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login/", rejection(ServerError))]
pub struct LoginPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/logout/", rejection(ServerError))]
pub struct LogoutPath();

async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    Json(form): Json<SignupForm>,
) -> Result<(StatusCode, Json<User>)> {
    let form = form.clean()?;

    let user = CreateUser {
        username: form.username,
        password: form.password.digest()?,
        first_name: form.first_name,
        last_name: form.last_name,
    };
    let user = db
        .create_user(&user)
        .await?
        .ok_or_else(|| FormErrors::single(field::USERNAME, USERNAME_TAKEN_MESSAGE))?;
    info!(user = %user.username, "Signed up");

    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_form(LoginPath(): LoginPath, Query(query): Query<NextQuery>) -> Json<LoginPage> {
    Json(LoginPage::new(query.into_next()))
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<AuthSettings>,
    Query(query): Query<NextQuery>,
    Json(form): Json<LoginForm>,
) -> Result<Json<TokenResponse>> {
    let mut errors = FormErrors::new();
    if form.username.is_empty() {
        errors.add(field::USERNAME, REQUIRED_MESSAGE);
    }
    if form.password.is_empty() {
        errors.add(field::PASSWORD, REQUIRED_MESSAGE);
    }
    errors.into_result(())?;

    let invalid_login = || FormErrors::single(field::NON_FIELD, INVALID_LOGIN_MESSAGE);

    let username = Username::new(form.username).map_err(|_| invalid_login())?;
    let credentials = db
        .fetch_credentials(&username)
        .await?
        .ok_or_else(invalid_login)?;
    if !Password::unchecked(form.password).matches(&credentials.password) {
        return Err(invalid_login().into());
    }

    let token = issue_token(&db, credentials.user.id, settings).await?;
    info!(user = %credentials.user.username, "Logged in");

    Ok(Json(TokenResponse {
        token,
        next: safe_next(query.into_next()),
    }))
}

async fn logout(
    LogoutPath(): LogoutPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    db.delete_authentication(user.token_hash()).await?;
    info!(user = %user.user().username, "Logged out");

    Ok(StatusCode::NO_CONTENT)
}

/// Only local paths are followed after login.
fn safe_next(next: Option<String>) -> String {
    match next {
        Some(next) if next.starts_with('/') && !next.starts_with("//") => next,
        _ => DEFAULT_NEXT.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use crate::server::{
        routes::auth::safe_next,
        testing::{TEST_PASSWORD, TestApp},
    };
    use axum::http::StatusCode;
    use serde_json::json;
    use yatube_common::model::form::{
        INVALID_LOGIN_MESSAGE, PASSWORD_TOO_SHORT_MESSAGE, REQUIRED_MESSAGE,
        USERNAME_TAKEN_MESSAGE,
    };

    #[tokio::test]
    async fn signup_then_login_then_logout() {
        let app = TestApp::new().await;

        let signup = app
            .post_json(
                "/auth/signup/",
                None,
                &json!({
                    "username": "leo",
                    "password": "war and peace",
                    "first_name": "Leo",
                    "last_name": "Tolstoy",
                }),
            )
            .await;
        assert_eq!(signup.status, StatusCode::CREATED);
        assert_eq!(signup.json()["username"], "leo");

        let login = app
            .post_json(
                "/auth/login/?next=/create/",
                None,
                &json!({ "username": "leo", "password": "war and peace" }),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK);
        assert_eq!(login.json()["next"], "/create/");
        let token = login.json()["token"].as_str().unwrap().to_owned();

        let profile = app.get("/profile/leo/", None).await;
        assert_eq!(profile.json()["full_name"], "Leo Tolstoy");

        let create = app.get("/create/", Some(&token)).await;
        assert_eq!(create.status, StatusCode::OK);

        let logout = app.post_json("/auth/logout/", Some(&token), &json!({})).await;
        assert_eq!(logout.status, StatusCode::NO_CONTENT);

        let revoked = app.get("/create/", Some(&token)).await;
        assert_eq!(revoked.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_rejects_invalid_and_duplicate_users() {
        let app = TestApp::new().await;
        app.create_user("taken").await;

        let duplicate = app
            .post_json(
                "/auth/signup/",
                None,
                &json!({ "username": "taken", "password": "long enough" }),
            )
            .await;
        assert_eq!(duplicate.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(duplicate.json()["errors"]["username"], json!([USERNAME_TAKEN_MESSAGE]));

        let invalid = app
            .post_json("/auth/signup/", None, &json!({ "username": "", "password": "short" }))
            .await;
        assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);
        let errors = &invalid.json()["errors"];
        assert_eq!(errors["username"], json!([REQUIRED_MESSAGE]));
        assert_eq!(errors["password"], json!([PASSWORD_TOO_SHORT_MESSAGE]));
    }

    #[tokio::test]
    async fn login_rejects_wrong_credentials() {
        let app = TestApp::new().await;
        app.create_user("user").await;

        for body in [
            json!({ "username": "user", "password": "wrong password" }),
            json!({ "username": "nobody", "password": TEST_PASSWORD }),
            json!({ "username": "not valid!", "password": TEST_PASSWORD }),
        ] {
            let response = app.post_json("/auth/login/", None, &body).await;
            assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(response.json()["errors"]["__all__"], json!([INVALID_LOGIN_MESSAGE]));
        }

        let empty = app.post_json("/auth/login/", None, &json!({})).await;
        assert_eq!(empty.json()["errors"]["username"], json!([REQUIRED_MESSAGE]));
        assert_eq!(empty.json()["errors"]["password"], json!([REQUIRED_MESSAGE]));
    }

    #[tokio::test]
    async fn login_form_echoes_next() {
        let app = TestApp::new().await;

        let response = app.get("/auth/login/?next=/create/", None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["next"], "/create/");
        assert_eq!(response.json()["fields"], json!(["username", "password"]));

        let repeated = app.get("/auth/login/?next=/follow/&next=/create/", None).await;
        assert_eq!(repeated.status, StatusCode::OK);
        assert_eq!(repeated.json()["next"], "/create/");
    }

    #[tokio::test]
    async fn logout_requires_login() {
        let app = TestApp::new().await;

        let response = app.post_json("/auth/logout/", None, &json!({})).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some("/auth/login/?next=/auth/logout/"));
    }

    #[test]
    fn next_stays_local() {
        assert_eq!(safe_next(Some("/follow/".to_owned())), "/follow/");
        assert_eq!(safe_next(Some("//evil.example".to_owned())), "/");
        assert_eq!(safe_next(Some("https://evil.example".to_owned())), "/");
        assert_eq!(safe_next(None), "/");
    }
}
