use crate::server::{ServerError, ServerRouter, form::Query};
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::request::Parts,
};
use yatube_common::form::IMAGE_MAX_BYTES;

mod accounts;
mod follows;
mod groups;
mod posts;
mod profiles;

/// Room for the non-file fields of a multipart post form.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(posts::routes())
        .merge(groups::routes())
        .merge(profiles::routes())
        .merge(follows::routes())
        .merge(accounts::routes())
        .layer(DefaultBodyLimit::max(IMAGE_MAX_BYTES + FORM_OVERHEAD_BYTES))
}

/// `?page=` of a listing, kept raw so malformed numbers fall back to page 1.
/// A repeated parameter resolves to its last value.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
struct PageQuery {
    page: Option<String>,
}

impl<S> FromRequestParts<S> for PageQuery
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) =
            Query::<Vec<(String, String)>>::from_request_parts(parts, state).await?;
        let page = pairs
            .into_iter()
            .rev()
            .find(|(name, _)| name == "page")
            .map(|(_, value)| value);

        Ok(Self { page })
    }
}
