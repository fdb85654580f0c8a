//! Process-local store with the same semantics as the PostgreSQL schema.
//!
//! Rows live in ordered maps behind a single mutex. Foreign keys, the
//! unique keys and the `prevent_self_follow` check are enforced on write so
//! callers observe the same errors as against the database.

use crate::store::{
    AuthRepository, CommentRepository, DbError, FollowRepository, GroupRepository,
    PostRepository, PostScope, Result, UserRepository,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use time::UtcDateTime;
use yatube_common::{
    model::{
        Id, Text,
        auth::{AuthTokenHash, Authentication},
        comment::{Comment, CommentMarker, CreateComment},
        follow::{Follow, FollowMarker, FollowOutcome},
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    pagination::PageWindow,
};

#[derive(Clone, Debug)]
struct UserRow {
    user: User,
    password_hash: String,
}

#[derive(Clone, Debug)]
struct PostRow {
    id: Id<PostMarker>,
    text: Text,
    created_at: UtcDateTime,
    group: Option<Id<GroupMarker>>,
    author: Id<UserMarker>,
    image: Option<String>,
}

#[derive(Clone, Debug)]
struct CommentRow {
    id: Id<CommentMarker>,
    post: Id<PostMarker>,
    text: Text,
    created_at: UtcDateTime,
    author: Id<UserMarker>,
}

#[derive(Debug, Default)]
struct Tables {
    last_id: u64,
    users: BTreeMap<Id<UserMarker>, UserRow>,
    auths: BTreeMap<AuthTokenHash, Authentication>,
    groups: BTreeMap<Id<GroupMarker>, Group>,
    posts: BTreeMap<Id<PostMarker>, PostRow>,
    comments: BTreeMap<Id<CommentMarker>, CommentRow>,
    follows: BTreeMap<Id<FollowMarker>, Follow>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn next_id<Marker>(&mut self) -> Id<Marker> {
        self.last_id += 1;
        Id::new(self.last_id)
    }

    fn user(&self, user_id: Id<UserMarker>) -> Result<User> {
        self.users
            .get(&user_id)
            .map(|row| row.user.clone())
            .ok_or(DbError::MissingReference("user"))
    }

    fn check_group(&self, group_id: Option<Id<GroupMarker>>) -> Result<()> {
        match group_id {
            Some(group_id) if !self.groups.contains_key(&group_id) => {
                Err(DbError::MissingReference("group"))
            }
            _ => Ok(()),
        }
    }

    fn full_post(&self, row: &PostRow) -> Result<Post> {
        Ok(Post {
            id: row.id,
            text: row.text.clone(),
            created_at: row.created_at,
            group: row.group.and_then(|group_id| self.groups.get(&group_id).cloned()),
            author: self.user(row.author)?,
            image: row.image.clone(),
        })
    }

    fn full_comment(&self, row: &CommentRow) -> Result<Comment> {
        Ok(Comment {
            id: row.id,
            post: row.post,
            text: row.text.clone(),
            created_at: row.created_at,
            author: self.user(row.author)?,
        })
    }

    fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> bool {
        self.follows
            .values()
            .any(|follow| follow.user == user && follow.author == author)
    }

    fn in_scope(&self, row: &PostRow, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(group_id) => row.group == Some(group_id),
            PostScope::Author(author_id) => row.author == author_id,
            PostScope::FollowedBy(user_id) => self.is_following(user_id, row.author),
        }
    }

    /// Newest first, ties broken by id.
    fn scoped_posts(&self, scope: PostScope) -> Vec<&PostRow> {
        let mut rows: Vec<_> = self
            .posts
            .values()
            .filter(|row| self.in_scope(row, scope))
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let tables = self.tables.lock();
        Ok(tables.users.get(&user_id).map(|row| row.user.clone()))
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let tables = self.tables.lock();
        Ok(tables
            .users
            .values()
            .find(|row| row.user.username == *username)
            .map(|row| row.user.clone()))
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<(User, String)>> {
        let tables = self.tables.lock();
        Ok(tables
            .users
            .values()
            .find(|row| row.user.username == *username)
            .map(|row| (row.user.clone(), row.password_hash.clone())))
    }

    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let mut tables = self.tables.lock();
        if tables
            .users
            .values()
            .any(|row| row.user.username == user.username)
        {
            return Err(DbError::UsernameTaken(user.username.clone()));
        }

        let created = User {
            id: tables.next_id(),
            username: user.username.clone(),
        };
        tables.users.insert(
            created.id,
            UserRow {
                user: created.clone(),
                password_hash: user.password_hash.clone(),
            },
        );

        Ok(created)
    }
}

#[async_trait]
impl AuthRepository for MemoryStore {
    async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.user(authentication.user)?;
        tables
            .auths
            .insert(authentication.token_hash.clone(), authentication.clone());
        Ok(())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let tables = self.tables.lock();
        Ok(tables.auths.get(token_hash).cloned())
    }

    async fn delete_auth(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let mut tables = self.tables.lock();
        Ok(tables.auths.remove(token_hash).is_some())
    }
}

#[async_trait]
impl GroupRepository for MemoryStore {
    async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let mut tables = self.tables.lock();
        if tables.groups.values().any(|existing| existing.slug == group.slug) {
            return Err(DbError::SlugTaken(group.slug.clone()));
        }

        let created = Group {
            id: tables.next_id(),
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        };
        tables.groups.insert(created.id, created.clone());

        Ok(created)
    }

    async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        let tables = self.tables.lock();
        Ok(tables.groups.get(&group_id).cloned())
    }

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let tables = self.tables.lock();
        Ok(tables
            .groups
            .values()
            .find(|group| group.slug == *slug)
            .cloned())
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let tables = self.tables.lock();
        let mut groups: Vec<_> = tables.groups.values().cloned().collect();
        groups.sort_by(|a, b| (&a.title, a.id).cmp(&(&b.title, b.id)));
        Ok(groups)
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let mut tables = self.tables.lock();
        tables.user(post.author)?;
        tables.check_group(post.content.group)?;

        let row = PostRow {
            id: tables.next_id(),
            text: post.content.text.clone(),
            created_at: UtcDateTime::now(),
            group: post.content.group,
            author: post.author,
            image: post.content.image.clone(),
        };
        let created = tables.full_post(&row)?;
        tables.posts.insert(row.id, row);

        Ok(created)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let tables = self.tables.lock();
        tables
            .posts
            .get(&post_id)
            .map(|row| tables.full_post(row))
            .transpose()
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let mut tables = self.tables.lock();
        tables.check_group(content.group)?;

        let Some(row) = tables.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        row.text = content.text.clone();
        row.group = content.group;
        row.image.clone_from(&content.image);

        let row = row.clone();
        tables.full_post(&row).map(Some)
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64> {
        let tables = self.tables.lock();
        Ok(tables.scoped_posts(scope).len() as u64)
    }

    async fn fetch_posts(&self, scope: PostScope, window: PageWindow) -> Result<Vec<Post>> {
        let tables = self.tables.lock();
        let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);

        tables
            .scoped_posts(scope)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| tables.full_post(row))
            .collect()
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let mut tables = self.tables.lock();
        tables.user(comment.author)?;
        if !tables.posts.contains_key(&comment.post) {
            return Err(DbError::MissingReference("post"));
        }

        let row = CommentRow {
            id: tables.next_id(),
            post: comment.post,
            text: comment.text.clone(),
            created_at: UtcDateTime::now(),
            author: comment.author,
        };
        let created = tables.full_comment(&row)?;
        tables.comments.insert(row.id, row);

        Ok(created)
    }

    async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let tables = self.tables.lock();
        let mut rows: Vec<_> = tables
            .comments
            .values()
            .filter(|row| row.post == post_id)
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        rows.into_iter().map(|row| tables.full_comment(row)).collect()
    }

    async fn count_comments(&self, post_id: Id<PostMarker>) -> Result<u64> {
        let tables = self.tables.lock();
        Ok(tables
            .comments
            .values()
            .filter(|row| row.post == post_id)
            .count() as u64)
    }
}

#[async_trait]
impl FollowRepository for MemoryStore {
    async fn follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<FollowOutcome> {
        let mut tables = self.tables.lock();
        if user == author {
            return Err(DbError::SelfFollow(user));
        }
        tables.user(user)?;
        tables.user(author)?;

        if tables.is_following(user, author) {
            return Ok(FollowOutcome::Existing);
        }

        let id = tables.next_id();
        tables.follows.insert(id, Follow { id, user, author });
        Ok(FollowOutcome::Created)
    }

    async fn unfollow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let mut tables = self.tables.lock();
        let before = tables.follows.len();
        tables
            .follows
            .retain(|_, follow| !(follow.user == user && follow.author == author));
        Ok(tables.follows.len() < before)
    }

    async fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let tables = self.tables.lock();
        Ok(tables.is_following(user, author))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        memory::MemoryStore,
        store::{
            AuthRepository, CommentRepository, DbError, FollowRepository, GroupRepository,
            PostRepository, PostScope, UserRepository,
        },
    };
    use time::UtcDateTime;
    use yatube_common::model::{
        Id, Text,
        auth::{AuthToken, Authentication},
        comment::CreateComment,
        follow::FollowOutcome,
        group::{CreateGroup, Group, GroupSlug, GroupTitle},
        post::{CreatePost, PostContent},
        user::{CreateUser, User, Username},
    };

    async fn user(store: &MemoryStore, name: &str) -> User {
        store
            .create_user(&CreateUser {
                username: Username::new(name.to_owned()).unwrap(),
                password_hash: String::new(),
            })
            .await
            .unwrap()
    }

    async fn group(store: &MemoryStore, slug: &str) -> Group {
        store
            .create_group(&CreateGroup {
                title: GroupTitle::new(format!("Group {slug}")).unwrap(),
                slug: GroupSlug::new(slug.to_owned()).unwrap(),
                description: "Test description".to_owned(),
            })
            .await
            .unwrap()
    }

    fn post(author: &User, text: &str, group: Option<&Group>) -> CreatePost {
        CreatePost {
            author: author.id,
            content: PostContent {
                text: Text::new(text.to_owned()).unwrap(),
                group: group.map(|group| group.id),
                image: None,
            },
        }
    }

    #[tokio::test]
    async fn duplicate_username_and_slug_are_rejected() {
        let store = MemoryStore::new();
        user(&store, "NPS").await;
        group(&store, "test_slug").await;

        let duplicate_user = store
            .create_user(&CreateUser {
                username: Username::new("NPS".to_owned()).unwrap(),
                password_hash: String::new(),
            })
            .await;
        assert!(matches!(duplicate_user, Err(DbError::UsernameTaken(_))));

        let duplicate_group = store
            .create_group(&CreateGroup {
                title: GroupTitle::new("Other".to_owned()).unwrap(),
                slug: GroupSlug::new("test_slug".to_owned()).unwrap(),
                description: String::new(),
            })
            .await;
        assert!(matches!(duplicate_group, Err(DbError::SlugTaken(_))));
    }

    #[tokio::test]
    async fn posts_are_listed_newest_first_per_scope() {
        let store = MemoryStore::new();
        let author = user(&store, "VIP_NPS").await;
        let other = user(&store, "NPS").await;
        let first_group = group(&store, "test_slug").await;
        let second_group = group(&store, "test_slug1").await;

        for index in 0..13 {
            store
                .create_post(&post(&author, &format!("post number {index}"), Some(&first_group)))
                .await
                .unwrap();
        }
        store.create_post(&post(&other, "elsewhere", None)).await.unwrap();

        assert_eq!(store.count_posts(PostScope::All).await.unwrap(), 14);
        assert_eq!(
            store.count_posts(PostScope::Group(first_group.id)).await.unwrap(),
            13
        );
        assert_eq!(
            store.count_posts(PostScope::Group(second_group.id)).await.unwrap(),
            0
        );

        let first_page = store
            .fetch_post_page(PostScope::Author(author.id), None)
            .await
            .unwrap();
        assert_eq!(first_page.len(), 10);
        assert_eq!(first_page.items[0].text.get(), "post number 12");

        let second_page = store
            .fetch_post_page(PostScope::Author(author.id), Some("2"))
            .await
            .unwrap();
        assert_eq!(second_page.len(), 3);
        assert_eq!(second_page.items[2].text.get(), "post number 0");
    }

    #[tokio::test]
    async fn posts_require_existing_references() {
        let store = MemoryStore::new();
        let author = user(&store, "auth").await;

        let mut orphan = post(&author, "text", None);
        orphan.content.group = Some(Id::new(999));
        assert!(matches!(
            store.create_post(&orphan).await,
            Err(DbError::MissingReference(_))
        ));

        let missing_post = store
            .create_comment(&CreateComment {
                post: Id::new(999),
                author: author.id,
                text: Text::new("comment".to_owned()).unwrap(),
            })
            .await;
        assert!(matches!(missing_post, Err(DbError::MissingReference(_))));
    }

    #[tokio::test]
    async fn update_replaces_content() {
        let store = MemoryStore::new();
        let author = user(&store, "auth").await;
        let group = group(&store, "test_slug").await;
        let created = store.create_post(&post(&author, "before", None)).await.unwrap();

        let content = PostContent {
            text: Text::new("after".to_owned()).unwrap(),
            group: Some(group.id),
            image: None,
        };
        let updated = store
            .update_post(created.id, &content)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.text.get(), "after");
        assert_eq!(updated.group, Some(group));
        assert_eq!(updated.created_at, created.created_at);
        assert!(store.update_post(Id::new(999), &content).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn comments_are_listed_newest_first() {
        let store = MemoryStore::new();
        let author = user(&store, "MarieL").await;
        let created = store.create_post(&post(&author, "post", None)).await.unwrap();

        for text in ["first", "second"] {
            store
                .create_comment(&CreateComment {
                    post: created.id,
                    author: author.id,
                    text: Text::new(text.to_owned()).unwrap(),
                })
                .await
                .unwrap();
        }

        let comments = store.fetch_comments(created.id).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text.get(), "second");
        assert_eq!(comments[0].author, author);
        assert_eq!(store.count_comments(created.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn follow_edges() {
        let store = MemoryStore::new();
        let follower = user(&store, "testuser").await;
        let author = user(&store, "author").await;

        assert!(matches!(
            store.follow(follower.id, follower.id).await,
            Err(DbError::SelfFollow(_))
        ));
        assert_eq!(
            store.follow(follower.id, author.id).await.unwrap(),
            FollowOutcome::Created
        );
        assert_eq!(
            store.follow(follower.id, author.id).await.unwrap(),
            FollowOutcome::Existing
        );
        assert!(store.is_following(follower.id, author.id).await.unwrap());
        assert!(!store.is_following(author.id, follower.id).await.unwrap());

        store.create_post(&post(&author, "followed", None)).await.unwrap();
        store.create_post(&post(&follower, "own", None)).await.unwrap();
        let feed = store
            .fetch_post_page(PostScope::FollowedBy(follower.id), None)
            .await
            .unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.items[0].author, author);

        assert!(store.unfollow(follower.id, author.id).await.unwrap());
        assert!(!store.unfollow(follower.id, author.id).await.unwrap());
        assert!(!store.is_following(follower.id, author.id).await.unwrap());
    }

    #[tokio::test]
    async fn sessions_are_looked_up_and_deleted_by_hash() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner").await;
        let first = AuthToken::generate_random(owner.id).hash().unwrap();
        let second = AuthToken::generate_random(owner.id).hash().unwrap();

        for token_hash in [&first, &second] {
            store
                .create_auth(&Authentication {
                    user: owner.id,
                    token_hash: token_hash.clone(),
                    created_at: UtcDateTime::now(),
                    expires_after: None,
                })
                .await
                .unwrap();
        }

        assert!(store.delete_auth(&first).await.unwrap());
        assert!(!store.delete_auth(&first).await.unwrap());
        assert_eq!(store.fetch_auth(&first).await.unwrap(), None);
        assert_eq!(
            store.fetch_auth(&second).await.unwrap().map(|auth| auth.user),
            Some(owner.id)
        );
    }
}
