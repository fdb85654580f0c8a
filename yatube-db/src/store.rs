//! Data-access interface, one repository trait per entity.
//!
//! Both [`crate::DbClient`] (PostgreSQL) and [`crate::MemoryStore`] implement
//! every trait with the same semantics, including the constraint errors.

use async_trait::async_trait;
use thiserror::Error;
use yatube_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication},
        comment::{Comment, CreateComment},
        follow::FollowOutcome,
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    pagination::{POSTS_PER_PAGE, Page, PageWindow, Paginator},
};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("The username {0} is already taken")]
    UsernameTaken(Username),
    #[error("The group slug {0} is already taken")]
    SlugTaken(GroupSlug),
    #[error("User {0} cannot follow themselves")]
    SelfFollow(Id<UserMarker>),
    #[error("Referenced {0} does not exist")]
    MissingReference(&'static str),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Applying migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Which posts a listing covers.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostScope {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    /// Posts by every author the given user follows.
    FollowedBy(Id<UserMarker>),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>>;

    /// The user together with their stored password hash.
    async fn fetch_credentials(&self, username: &Username) -> Result<Option<(User, String)>>;

    async fn create_user(&self, user: &CreateUser) -> Result<User>;
}

#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn create_auth(&self, authentication: &Authentication) -> Result<()>;

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>>;

    async fn delete_auth(&self, token_hash: &AuthTokenHash) -> Result<bool>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create_group(&self, group: &CreateGroup) -> Result<Group>;

    async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>>;

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>>;

    /// All groups ordered by title.
    async fn fetch_groups(&self) -> Result<Vec<Group>>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create_post(&self, post: &CreatePost) -> Result<Post>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    /// Replaces the editable content. `None` if the post does not exist.
    async fn update_post(&self, post_id: Id<PostMarker>, content: &PostContent)
    -> Result<Option<Post>>;

    async fn count_posts(&self, scope: PostScope) -> Result<u64>;

    /// Newest first.
    async fn fetch_posts(&self, scope: PostScope, window: PageWindow) -> Result<Vec<Post>>;

    async fn fetch_post_page(&self, scope: PostScope, requested: Option<&str>) -> Result<Page<Post>> {
        let count = self.count_posts(scope).await?;
        let window = Paginator::new(count, POSTS_PER_PAGE).get_page(requested);
        let items = self.fetch_posts(scope, window).await?;

        Ok(Page { items, window })
    }
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment>;

    /// Newest first.
    async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>>;

    async fn count_comments(&self, post_id: Id<PostMarker>) -> Result<u64>;
}

#[async_trait]
pub trait FollowRepository: Send + Sync {
    /// Get-or-create the edge `user -> author`.
    async fn follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<FollowOutcome>;

    /// Returns whether an edge was removed.
    async fn unfollow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool>;

    async fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool>;
}

pub trait Store:
    UserRepository
    + AuthRepository
    + GroupRepository
    + PostRepository
    + CommentRepository
    + FollowRepository
{
}

impl<T> Store for T where
    T: UserRepository
        + AuthRepository
        + GroupRepository
        + PostRepository
        + CommentRepository
        + FollowRepository
{
}
