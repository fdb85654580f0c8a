use crate::server::{
    Result, ServerError, ServerRouter, auth::Viewer, routes::PageQuery, view,
};
use axum::{Router, extract::State, response::Html};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use yatube_common::model::user::Username;
use yatube_db::{
    PostScope, Store,
    store::{FollowRepository, PostRepository, UserRepository},
};

pub fn routes() -> ServerRouter {
    Router::new().typed_get(profile)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
struct ProfilePath {
    username: Username,
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    viewer: Viewer,
    query: PageQuery,
    State(store): State<Arc<dyn Store>>,
) -> Result<Html<String>> {
    let author = store
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))?;
    let posts = store
        .fetch_post_page(PostScope::Author(author.id), query.page.as_deref())
        .await?;

    let following = match viewer.user() {
        Some(user) if user.id != author.id => store.is_following(user.id, author.id).await?,
        _ => false,
    };

    Ok(Html(view::profile_page(
        viewer.user(),
        &author,
        &posts,
        following,
    )))
}
