use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, routes::PageQuery, view,
};
use axum::{
    Router,
    extract::State,
    response::{Html, Redirect},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use yatube_common::model::{
    follow::FollowOutcome,
    user::{User, Username},
};
use yatube_db::{
    PostScope, Store,
    store::{FollowRepository, PostRepository, UserRepository},
};

pub fn routes() -> ServerRouter {
    Router::new()
        .typed_get(follow_index)
        .typed_get(profile_follow)
        .typed_get(profile_unfollow)
}

#[derive(TypedPath)]
#[typed_path("/follow/")]
struct FollowIndexPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow/", rejection(ServerError))]
struct FollowPath {
    username: Username,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow/", rejection(ServerError))]
struct UnfollowPath {
    username: Username,
}

async fn follow_index(
    _: FollowIndexPath,
    AuthenticatedUser(user): AuthenticatedUser,
    query: PageQuery,
    State(store): State<Arc<dyn Store>>,
) -> Result<Html<String>> {
    let posts = store
        .fetch_post_page(PostScope::FollowedBy(user.id), query.page.as_deref())
        .await?;

    Ok(Html(view::follow_page(Some(&user), &posts)))
}

async fn fetch_author(store: &dyn Store, username: Username) -> Result<User> {
    store
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))
}

fn profile_redirect(author: &User) -> Redirect {
    Redirect::to(&format!("/profile/{}/", author.username))
}

async fn profile_follow(
    FollowPath { username }: FollowPath,
    AuthenticatedUser(user): AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
) -> Result<Redirect> {
    let author = fetch_author(store.as_ref(), username).await?;

    if author.id == user.id {
        debug!(user = %user.id, "Ignoring request to follow oneself");
        return Ok(profile_redirect(&author));
    }

    match store.follow(user.id, author.id).await? {
        FollowOutcome::Created => info!(user = %user.id, author = %author.id, "Followed author"),
        FollowOutcome::Existing => {
            debug!(user = %user.id, author = %author.id, "Already following author");
        }
    }

    Ok(profile_redirect(&author))
}

async fn profile_unfollow(
    UnfollowPath { username }: UnfollowPath,
    AuthenticatedUser(user): AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
) -> Result<Redirect> {
    let author = fetch_author(store.as_ref(), username).await?;

    if !store.unfollow(user.id, author.id).await? {
        return Err(ServerError::FollowNotFound(author.username));
    }
    info!(user = %user.id, author = %author.id, "Unfollowed author");

    Ok(profile_redirect(&author))
}
