use crate::server::{
    Result, ServerError, ServerRouter, auth::Viewer, routes::PageQuery, view,
};
use axum::{Router, extract::State, response::Html};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use yatube_common::model::group::GroupSlug;
use yatube_db::{
    PostScope, Store,
    store::{GroupRepository, PostRepository},
};

pub fn routes() -> ServerRouter {
    Router::new().typed_get(group_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
struct GroupPath {
    slug: GroupSlug,
}

async fn group_posts(
    GroupPath { slug }: GroupPath,
    viewer: Viewer,
    query: PageQuery,
    State(store): State<Arc<dyn Store>>,
) -> Result<Html<String>> {
    let group = store
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;
    let posts = store
        .fetch_post_page(PostScope::Group(group.id), query.page.as_deref())
        .await?;

    Ok(Html(view::group_page(viewer.user(), &group, &posts)))
}
