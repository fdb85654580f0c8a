//! Session handling.
//!
//! A session is an [`AuthToken`] handed out at login, carried back in the
//! session cookie or an `Authorization: Bearer` header. Only its hash is
//! stored.

use crate::server::{Result, ServerError};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    extract::cookie::{Cookie, CookieJar, SameSite},
};
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::debug;
use yatube_common::{
    model::{
        auth::{AuthToken, Authentication},
        user::User,
    },
    util::PositiveDuration,
};
use yatube_db::{
    Store,
    store::{AuthRepository, UserRepository},
};

pub const SESSION_COOKIE: &str = "yatube_session";
pub const LOGIN_PATH: &str = "/auth/login/";

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SessionSettings {
    pub lifetime: PositiveDuration,
}

#[must_use]
pub fn login_url(next: &str) -> String {
    format!("{LOGIN_PATH}?next={}", urlencoding::encode(next))
}

/// The logged-in user, if any. Missing, malformed and expired sessions all
/// count as anonymous.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

/// A viewer that must be logged in. Anonymous requests are redirected to
/// the login page with the current path as `next`.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser(pub User);

/// Looks up the session a raw token refers to. Expired sessions are deleted
/// on sight.
async fn resolve_session(store: &dyn Store, raw_token: &str) -> Result<Option<User>> {
    let request_token: AuthToken = match raw_token.parse() {
        Ok(token) => token,
        Err(err) => {
            debug!(error = %err, "Ignoring malformed session token");
            return Ok(None);
        }
    };
    let token_hash = request_token.hash()?;

    let Some(authentication) = store.fetch_auth(&token_hash).await? else {
        debug!(user = %request_token.user_id, "Session token is unknown");
        return Ok(None);
    };

    if authentication.user != request_token.user_id {
        debug!(user = %authentication.user, "Session token is mismatched");
        return Ok(None);
    }

    if authentication.is_expired_at(UtcDateTime::now()) {
        store.delete_auth(&token_hash).await?;
        debug!(user = %authentication.user, "Deleted expired session");
        return Ok(None);
    }

    Ok(store.fetch_user(authentication.user).await?)
}

impl<S> FromRequestParts<S> for Viewer
where
    Arc<dyn Store>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let store = Arc::<dyn Store>::from_ref(state);

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE)
            && let Some(user) = resolve_session(store.as_ref(), cookie.value()).await?
        {
            return Ok(Viewer(Some(user)));
        }

        match AuthorizationHeader::from_request_parts(parts, state).await {
            Ok(TypedHeader(authorization)) => Ok(Viewer(
                resolve_session(store.as_ref(), authorization.token()).await?,
            )),
            Err(_) => Ok(Viewer(None)),
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Store>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Viewer::from_request_parts(parts, state).await? {
            Viewer(Some(user)) => Ok(Self(user)),
            Viewer(None) => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map_or_else(|| parts.uri.path().to_owned(), ToString::to_string);

                Err(ServerError::Unauthenticated { next })
            }
        }
    }
}

/// Stores a fresh session for `user` and returns the cookie carrying it.
pub async fn start_session(
    store: &dyn Store,
    settings: SessionSettings,
    user: &User,
) -> Result<Cookie<'static>> {
    let token = AuthToken::generate_random(user.id);
    let authentication = Authentication {
        user: user.id,
        token_hash: token.hash()?,
        created_at: UtcDateTime::now(),
        expires_after: Some(settings.lifetime),
    };
    store.create_auth(&authentication).await?;

    Ok(Cookie::build((SESSION_COOKIE, token.as_token_str()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(settings.lifetime.get())
        .build())
}

/// Deletes the session the request carries, if any, and clears the cookie.
pub async fn end_session(store: &dyn Store, jar: CookieJar) -> Result<CookieJar> {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && let Ok(token) = cookie.value().parse::<AuthToken>()
    {
        let removed = store.delete_auth(&token.hash()?).await?;
        debug!(user = %token.user_id, removed, "Ended session");
    }

    Ok(jar.remove(Cookie::build(SESSION_COOKIE).path("/")))
}

#[cfg(test)]
mod tests {
    use crate::server::auth::{LOGIN_PATH, login_url};

    #[test]
    fn login_url_encodes_next() {
        assert_eq!(
            login_url("/posts/1/comment/"),
            format!("{LOGIN_PATH}?next=%2Fposts%2F1%2Fcomment%2F")
        );
        assert_eq!(
            login_url("/?page=2"),
            format!("{LOGIN_PATH}?next=%2F%3Fpage%3D2")
        );
    }
}
