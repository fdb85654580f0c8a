use crate::{
    record::{
        AuthenticationRecord, CommentRecord, CredentialsRecord, FullPostRecord, GroupRecord,
        UserRecord, id, primitive,
    },
    store::{
        AuthRepository, CommentRepository, DbError, FollowRepository, GroupRepository,
        PostRepository, PostScope, Result, UserRepository,
    },
};
use async_trait::async_trait;
use sqlx::{
    PgPool, Postgres, QueryBuilder, error::ErrorKind, postgres::PgPoolOptions, query, query_as,
    query_scalar,
};
use tracing::debug;
use yatube_common::{
    model::{
        Id,
        auth::{AuthTokenHash, Authentication},
        comment::{Comment, CreateComment},
        follow::FollowOutcome,
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    pagination::PageWindow,
};

const FULL_POST_SELECT: &str = "
    SELECT
        posts.post_id,
        posts.text,
        posts.created_at,
        posts.image,
        users.user_id AS author_id,
        users.username AS author_username,
        groups.group_id,
        groups.title AS group_title,
        groups.slug AS group_slug,
        groups.description AS group_description
    FROM
        posts.posts
        JOIN users.users ON users.user_id = posts.author_id
        LEFT JOIN posts.groups ON groups.group_id = posts.group_id
    ";

/// PostgreSQL-backed store.
#[derive(Clone, Debug)]
pub struct DbClient {
    pool: PgPool,
}

fn signed<Marker>(id: Id<Marker>) -> i64 {
    id.get().cast_signed()
}

fn violated_constraint(err: &sqlx::Error, kind: ErrorKind) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) if db_err.kind() == kind => db_err.constraint(),
        _ => None,
    }
}

fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: PostScope) {
    match scope {
        PostScope::All => {}
        PostScope::Group(group_id) => {
            builder.push(" WHERE posts.group_id = ").push_bind(signed(group_id));
        }
        PostScope::Author(author_id) => {
            builder.push(" WHERE posts.author_id = ").push_bind(signed(author_id));
        }
        PostScope::FollowedBy(user_id) => {
            builder
                .push(
                    " WHERE posts.author_id IN \
                    (SELECT follows.author_id FROM users.follows WHERE follows.user_id = ",
                )
                .push_bind(signed(user_id))
                .push(")");
        }
    }
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Applied database migrations");
        Ok(())
    }
}

#[async_trait]
impl UserRepository for DbClient {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_id,
                users.username
            FROM
                users.users
            WHERE
                users.user_id = $1
            ",
        )
        .bind(signed(user_id))
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_id,
                users.username
            FROM
                users.users
            WHERE
                users.username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<(User, String)>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                users.user_id,
                users.username,
                users.password_hash
            FROM
                users.users
            WHERE
                users.username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(<(User, String)>::try_from).transpose()?;
        Ok(credentials)
    }

    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (username, password_hash)
            VALUES ($1, $2)
            RETURNING users.user_id, users.username
            ",
        )
        .bind(user.username.get())
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match violated_constraint(&err, ErrorKind::UniqueViolation) {
            Some("users_username_key") => DbError::UsernameTaken(user.username.clone()),
            _ => err.into(),
        })?;

        Ok(User::try_from(record)?)
    }
}

#[async_trait]
impl AuthRepository for DbClient {
    async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO users.auths (token_hash, user_id, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(authentication.token_hash.0.as_slice())
        .bind(signed(authentication.user))
        .bind(primitive(authentication.created_at))
        .bind(
            authentication
                .expires_after
                .map(|expires_after| expires_after.whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                auths.user_id,
                auths.token_hash,
                auths.created_at,
                auths.expires_after_seconds
            FROM
                users.auths
            WHERE
                auths.token_hash = $1
            ",
        )
        .bind(token_hash.0.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    async fn delete_auth(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result = query("DELETE FROM users.auths WHERE auths.token_hash = $1")
            .bind(token_hash.0.as_slice())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl GroupRepository for DbClient {
    async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let record = query_as::<_, GroupRecord>(
            "
            INSERT INTO posts.groups (title, slug, description)
            VALUES ($1, $2, $3)
            RETURNING groups.group_id, groups.title, groups.slug, groups.description
            ",
        )
        .bind(group.title.get())
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match violated_constraint(&err, ErrorKind::UniqueViolation) {
            Some("groups_slug_key") => DbError::SlugTaken(group.slug.clone()),
            _ => err.into(),
        })?;

        Ok(Group::try_from(record)?)
    }

    async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT groups.group_id, groups.title, groups.slug, groups.description
            FROM posts.groups
            WHERE groups.group_id = $1
            ",
        )
        .bind(signed(group_id))
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT groups.group_id, groups.title, groups.slug, groups.description
            FROM posts.groups
            WHERE groups.slug = $1
            ",
        )
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT groups.group_id, groups.title, groups.slug, groups.description
            FROM posts.groups
            ORDER BY groups.title, groups.group_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let groups = records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?;
        Ok(groups)
    }
}

#[async_trait]
impl PostRepository for DbClient {
    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let post_id = query_scalar::<_, i64>(
            "
            INSERT INTO posts.posts (text, group_id, author_id, image)
            VALUES ($1, $2, $3, $4)
            RETURNING posts.post_id
            ",
        )
        .bind(post.content.text.get())
        .bind(post.content.group.map(signed))
        .bind(signed(post.author))
        .bind(post.content.image.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match violated_constraint(&err, ErrorKind::ForeignKeyViolation) {
            Some(_) => DbError::MissingReference("group or author"),
            None => err.into(),
        })?;

        debug!(post_id, "Inserted post");

        self.fetch_post(id(post_id))
            .await?
            .ok_or(DbError::MissingReference("post"))
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let mut builder = QueryBuilder::<Postgres>::new(FULL_POST_SELECT);
        builder
            .push(" WHERE posts.post_id = ")
            .push_bind(signed(post_id));

        let record = builder
            .build_query_as::<FullPostRecord>()
            .fetch_optional(&self.pool)
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let updated = query(
            "
            UPDATE posts.posts
            SET text = $2, group_id = $3, image = $4
            WHERE posts.post_id = $1
            ",
        )
        .bind(signed(post_id))
        .bind(content.text.get())
        .bind(content.group.map(signed))
        .bind(content.image.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|err| match violated_constraint(&err, ErrorKind::ForeignKeyViolation) {
            Some(_) => DbError::MissingReference("group"),
            None => err.into(),
        })?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        self.fetch_post(post_id).await
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts.posts");
        push_scope(&mut builder, scope);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count.cast_unsigned())
    }

    async fn fetch_posts(&self, scope: PostScope, window: PageWindow) -> Result<Vec<Post>> {
        let mut builder = QueryBuilder::<Postgres>::new(FULL_POST_SELECT);
        push_scope(&mut builder, scope);
        builder
            .push(" ORDER BY posts.created_at DESC, posts.post_id DESC LIMIT ")
            .push_bind(window.limit.cast_signed())
            .push(" OFFSET ")
            .push_bind(window.offset.cast_signed());

        let records = builder
            .build_query_as::<FullPostRecord>()
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }
}

#[async_trait]
impl CommentRepository for DbClient {
    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let record = query_as::<_, CommentRecord>(
            "
            WITH inserted AS (
                INSERT INTO posts.comments (post_id, text, author_id)
                VALUES ($1, $2, $3)
                RETURNING comment_id, post_id, text, created_at, author_id
            )
            SELECT
                inserted.comment_id,
                inserted.post_id,
                inserted.text,
                inserted.created_at,
                users.user_id AS author_id,
                users.username AS author_username
            FROM
                inserted JOIN users.users ON users.user_id = inserted.author_id
            ",
        )
        .bind(signed(comment.post))
        .bind(comment.text.get())
        .bind(signed(comment.author))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match violated_constraint(&err, ErrorKind::ForeignKeyViolation) {
            Some(_) => DbError::MissingReference("post or author"),
            None => err.into(),
        })?;

        Ok(Comment::try_from(record)?)
    }

    async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_id,
                comments.post_id,
                comments.text,
                comments.created_at,
                users.user_id AS author_id,
                users.username AS author_username
            FROM
                posts.comments JOIN users.users ON users.user_id = comments.author_id
            WHERE
                comments.post_id = $1
            ORDER BY comments.created_at DESC, comments.comment_id DESC
            ",
        )
        .bind(signed(post_id))
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    async fn count_comments(&self, post_id: Id<PostMarker>) -> Result<u64> {
        let count = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM posts.comments WHERE comments.post_id = $1",
        )
        .bind(signed(post_id))
        .fetch_one(&self.pool)
        .await?;

        Ok(count.cast_unsigned())
    }
}

#[async_trait]
impl FollowRepository for DbClient {
    async fn follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<FollowOutcome> {
        let inserted = query_scalar::<_, i64>(
            "
            INSERT INTO users.follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT ON CONSTRAINT follows_user_author_key DO NOTHING
            RETURNING follows.follow_id
            ",
        )
        .bind(signed(user))
        .bind(signed(author))
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| {
            if violated_constraint(&err, ErrorKind::CheckViolation) == Some("prevent_self_follow") {
                DbError::SelfFollow(user)
            } else if violated_constraint(&err, ErrorKind::ForeignKeyViolation).is_some() {
                DbError::MissingReference("user")
            } else {
                err.into()
            }
        })?;

        Ok(match inserted {
            Some(_) => FollowOutcome::Created,
            None => FollowOutcome::Existing,
        })
    }

    async fn unfollow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let result = query(
            "DELETE FROM users.follows WHERE follows.user_id = $1 AND follows.author_id = $2",
        )
        .bind(signed(user))
        .bind(signed(author))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let exists = query_scalar::<_, bool>(
            "
            SELECT EXISTS (
                SELECT 1 FROM users.follows
                WHERE follows.user_id = $1 AND follows.author_id = $2
            )
            ",
        )
        .bind(signed(user))
        .bind(signed(author))
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        client::DbClient,
        store::{
            DbError, FollowRepository, GroupRepository, PostRepository, PostScope, UserRepository,
        },
    };
    use sqlx::PgPool;
    use yatube_common::model::{
        Text,
        follow::FollowOutcome,
        group::{CreateGroup, Group, GroupSlug, GroupTitle},
        post::{CreatePost, PostContent},
        user::{CreateUser, User, Username},
    };

    async fn user(client: &DbClient, name: &str) -> User {
        client
            .create_user(&CreateUser {
                username: Username::new(name.to_owned()).unwrap(),
                password_hash: String::new(),
            })
            .await
            .unwrap()
    }

    async fn group(client: &DbClient, slug: &str) -> Group {
        client
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

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs PostgreSQL at DATABASE_URL"]
    async fn self_follow_violates_check(pool: PgPool) {
        let client = DbClient::new(pool);
        let lonely = user(&client, "lonely").await;

        let result = client.follow(lonely.id, lonely.id).await;

        assert!(matches!(result, Err(DbError::SelfFollow(id)) if id == lonely.id));
        assert!(!client.is_following(lonely.id, lonely.id).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs PostgreSQL at DATABASE_URL"]
    async fn follow_is_get_or_create(pool: PgPool) {
        let client = DbClient::new(pool);
        let follower = user(&client, "follower").await;
        let author = user(&client, "author").await;

        assert!(!client.unfollow(follower.id, author.id).await.unwrap());
        assert_eq!(
            client.follow(follower.id, author.id).await.unwrap(),
            FollowOutcome::Created
        );
        assert_eq!(
            client.follow(follower.id, author.id).await.unwrap(),
            FollowOutcome::Existing
        );
        assert!(client.is_following(follower.id, author.id).await.unwrap());

        client.create_post(&post(&author, "followed", None)).await.unwrap();
        client.create_post(&post(&follower, "own", None)).await.unwrap();
        let feed = client
            .fetch_post_page(PostScope::FollowedBy(follower.id), None)
            .await
            .unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.items[0].author, author);

        assert!(client.unfollow(follower.id, author.id).await.unwrap());
        assert!(!client.unfollow(follower.id, author.id).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs PostgreSQL at DATABASE_URL"]
    async fn scoped_pages_hold_ten_posts_newest_first(pool: PgPool) {
        let client = DbClient::new(pool);
        let author = user(&client, "VIP_NPS").await;
        let other = user(&client, "other").await;
        let first_group = group(&client, "first").await;
        let second_group = group(&client, "second").await;

        for index in 0..13 {
            client
                .create_post(&post(&author, &format!("post number {index}"), Some(&first_group)))
                .await
                .unwrap();
        }
        client
            .create_post(&post(&other, "elsewhere", Some(&second_group)))
            .await
            .unwrap();

        for scope in [PostScope::Author(author.id), PostScope::Group(first_group.id)] {
            assert_eq!(client.count_posts(scope).await.unwrap(), 13);

            let first = client.fetch_post_page(scope, None).await.unwrap();
            assert_eq!(first.len(), 10);
            assert_eq!(first.items[0].text.get(), "post number 12");

            let second = client.fetch_post_page(scope, Some("2")).await.unwrap();
            assert_eq!(second.len(), 3);
            assert_eq!(second.items[2].text.get(), "post number 0");
        }

        let everything = client.fetch_post_page(PostScope::All, None).await.unwrap();
        assert_eq!(everything.window.count, 14);
        assert_eq!(everything.items[0].text.get(), "elsewhere");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs PostgreSQL at DATABASE_URL"]
    async fn deleting_a_group_keeps_its_posts(pool: PgPool) {
        let client = DbClient::new(pool.clone());
        let author = user(&client, "auth").await;
        let doomed = group(&client, "doomed").await;
        let created = client
            .create_post(&post(&author, "survivor", Some(&doomed)))
            .await
            .unwrap();
        assert_eq!(created.group.as_ref(), Some(&doomed));

        sqlx::query("DELETE FROM posts.groups WHERE groups.group_id = $1")
            .bind(doomed.id.get().cast_signed())
            .execute(&pool)
            .await
            .unwrap();

        let post = client.fetch_post(created.id).await.unwrap().unwrap();
        assert_eq!(post.group, None);
        assert_eq!(post.text.get(), "survivor");
    }
}
