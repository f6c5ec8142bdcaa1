use crate::server::{Result, ServerError};
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::debug;
use yatube_common::{
    model::{
        Id,
        auth::{AuthToken, AuthTokenHash, Authentication},
        user::{User, UserMarker},
    },
    util::PositiveDuration,
};
use yatube_db::client::DbClient;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct AuthSettings {
    /// Tokens without a lifetime stay valid until logout.
    pub token_lifetime: Option<PositiveDuration>,
}

/// Issues a new bearer token for `user` and stores its hash.
pub async fn issue_token(
    db: &DbClient,
    user: Id<UserMarker>,
    settings: AuthSettings,
) -> Result<String> {
    let token = AuthToken::generate_random(user);

    let authentication = Authentication {
        user,
        token_hash: token.hash()?,
        created_at: UtcDateTime::now(),
        expires_after: settings.token_lifetime,
    };
    db.create_authentication(&authentication).await?;

    Ok(token.as_token_str())
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    user: User,
    token_hash: AuthTokenHash,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.user.id
    }

    #[must_use]
    pub fn token_hash(&self) -> &AuthTokenHash {
        &self.token_hash
    }
}

/// `Ok(None)` for anonymous requests, an error for any credentials that do not check out.
async fn authenticate<S>(parts: &mut Parts, state: &S) -> Result<Option<AuthenticatedUser>>
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    let header =
        match <AuthorizationHeader as FromRequestParts<S>>::from_request_parts(parts, state).await
        {
            Ok(header) => header,
            Err(rejection) if rejection.is_missing() => return Ok(None),
            Err(rejection) => return Err(ServerError::InvalidAuthorizationHeader(rejection)),
        };

    let request_token: AuthToken = header.token().parse()?;
    let token_hash = request_token.hash()?;

    let db = Arc::<DbClient>::from_ref(state);
    let authentication = db
        .fetch_auth(&token_hash)
        .await?
        .ok_or(ServerError::InvalidToken)?;

    if authentication.user != request_token.user_id {
        debug!(user = %request_token.user_id, "Token presented for the wrong user");
        return Err(ServerError::InvalidToken);
    }
    if authentication.is_expired_at(UtcDateTime::now()) {
        debug!(user = %authentication.user, "Token expired");
        return Err(ServerError::InvalidToken);
    }

    let user = db
        .fetch_user(authentication.user)
        .await?
        .ok_or(ServerError::InvalidToken)?;

    Ok(Some(AuthenticatedUser { user, token_hash }))
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .await?
            .ok_or_else(|| ServerError::LoginRequired(parts.uri.clone()))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        authenticate(parts, state).await
    }
}
