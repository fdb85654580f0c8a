use crate::server::{auth::SessionSettings, cache::PageCache, media::MediaStorage};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;
use yatube_common::model::{
    Id,
    auth::{AuthTokenHashError, PasswordHashError},
    group::GroupSlug,
    post::PostMarker,
    user::Username,
};
use yatube_db::DbError;

pub mod auth;
pub mod cache;
mod form;
pub mod media;
mod routes;
mod view;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn yatube_db::Store>,
    pub page_cache: Arc<dyn PageCache>,
    pub media: MediaStorage,
    pub sessions: SessionSettings,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
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
    #[error("Submitted form rejected: {0}")]
    FormRejection(#[from] FormRejection),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Multipart body could not be read: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Login required to access {next}")]
    Unauthenticated { next: String },
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("Storing uploaded media failed: {0}")]
    Media(std::io::Error),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Group with slug {0} was not found.")]
    GroupBySlugNotFound(GroupSlug),
    #[error("User {0} was not found.")]
    UserByUsernameNotFound(Username),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User is not following {0}.")]
    FollowNotFound(Username),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::GroupBySlugNotFound(_)
            | ServerError::UserByUsernameNotFound(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::FollowNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Unauthenticated { .. } => StatusCode::SEE_OTHER,
            ServerError::QueryRejection(_)
            | ServerError::FormRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::AuthTokenHash(_)
            | ServerError::PasswordHash(_)
            | ServerError::Media(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        match self {
            ServerError::Unauthenticated { next } => {
                Redirect::to(&auth::login_url(&next)).into_response()
            }
            _ if status == StatusCode::NOT_FOUND => {
                (status, Html(view::not_found_page())).into_response()
            }
            _ => (status, Html(view::error_page(status))).into_response(),
        }
    }
}
