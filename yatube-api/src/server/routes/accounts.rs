use crate::server::{
    Result, ServerRouter,
    auth::{SessionSettings, end_session, start_session},
    form::{Form, Query},
    view,
};
use axum::{
    Router,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::{
    extract::cookie::CookieJar,
    routing::{RouterExt, TypedPath},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use yatube_common::{
    form::{FormErrors, InvalidForm, LoginForm, SignupForm},
    model::{
        auth::{hash_password, verify_password},
        user::{CreateUser, Username},
    },
};
use yatube_db::{DbError, Store, store::UserRepository};

const INVALID_LOGIN: &str = "Please enter a correct username and password.";

pub fn routes() -> ServerRouter {
    Router::new()
        .typed_get(signup_page)
        .typed_post(signup)
        .typed_get(login_page)
        .typed_post(login)
        .typed_get(logout)
}

#[derive(TypedPath)]
#[typed_path("/auth/signup/")]
struct SignupPath;

#[derive(TypedPath)]
#[typed_path("/auth/login/")]
struct LoginPath;

#[derive(TypedPath)]
#[typed_path("/auth/logout/")]
struct LogoutPath;

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

/// Only same-site absolute paths are followed after login.
fn redirect_target(next: &str) -> &str {
    if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') {
        next
    } else {
        "/"
    }
}

async fn signup_page(_: SignupPath) -> Html<String> {
    Html(view::signup_page(
        &SignupForm::default(),
        &FormErrors::default(),
    ))
}

async fn signup(
    _: SignupPath,
    jar: CookieJar,
    State(store): State<Arc<dyn Store>>,
    State(sessions): State<SessionSettings>,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    let cleaned = match form.clean() {
        Ok(cleaned) => cleaned,
        Err(InvalidForm { form, errors }) => {
            return Ok(Html(view::signup_page(&form, &errors)).into_response());
        }
    };

    let password_hash = hash_password(&cleaned.password)?;
    let create = CreateUser {
        username: cleaned.username,
        password_hash,
    };
    let user = match store.create_user(&create).await {
        Ok(user) => user,
        Err(DbError::UsernameTaken(username)) => {
            let form = SignupForm {
                username: username.into_inner(),
                password: String::new(),
            };
            let mut errors = FormErrors::default();
            errors.add("username", "A user with that username already exists.");
            return Ok(Html(view::signup_page(&form, &errors)).into_response());
        }
        Err(err) => return Err(err.into()),
    };
    info!(user = %user.id, username = %user.username, "Signed up");

    let cookie = start_session(store.as_ref(), sessions, &user).await?;
    Ok((jar.add(cookie), Redirect::to("/")).into_response())
}

async fn login_page(_: LoginPath, Query(query): Query<LoginQuery>) -> Html<String> {
    let form = LoginForm {
        next: query.next.unwrap_or_default(),
        ..LoginForm::default()
    };

    Html(view::login_page(&form, None))
}

async fn login(
    _: LoginPath,
    jar: CookieJar,
    State(store): State<Arc<dyn Store>>,
    State(sessions): State<SessionSettings>,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let credentials = match Username::new(form.username.clone()) {
        Ok(username) => store.fetch_credentials(&username).await?,
        Err(_) => None,
    };

    let user = match credentials {
        Some((user, password_hash)) if verify_password(&form.password, &password_hash)? => user,
        _ => {
            debug!(username = %form.username, "Rejected login");
            let form = LoginForm {
                password: String::new(),
                ..form
            };
            return Ok(Html(view::login_page(&form, Some(INVALID_LOGIN))).into_response());
        }
    };
    info!(user = %user.id, "Logged in");

    let cookie = start_session(store.as_ref(), sessions, &user).await?;
    let target = redirect_target(&form.next);
    Ok((jar.add(cookie), Redirect::to(target)).into_response())
}

async fn logout(
    _: LogoutPath,
    jar: CookieJar,
    State(store): State<Arc<dyn Store>>,
) -> Result<(CookieJar, Redirect)> {
    let jar = end_session(store.as_ref(), jar).await?;
    Ok((jar, Redirect::to("/")))
}

#[cfg(test)]
mod tests {
    use crate::server::routes::accounts::redirect_target;

    #[test]
    fn only_local_redirects_are_followed() {
        assert_eq!(redirect_target("/create/"), "/create/");
        assert_eq!(redirect_target("/?page=2"), "/?page=2");
        assert_eq!(redirect_target("https://example.com/"), "/");
        assert_eq!(redirect_target("//example.com/"), "/");
        assert_eq!(redirect_target(""), "/");
    }
}
