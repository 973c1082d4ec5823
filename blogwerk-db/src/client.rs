use crate::{
    record::{
        AuthenticationRecord, CommentRecord, CredentialsRecord, FullPostRecord, GroupRecord,
        UserRecord,
    },
    store::{EntityStore, PostFilter, Result, StoredCredentials},
};
use async_trait::async_trait;
use blogwerk_common::model::{
    Id, Text,
    auth::{AuthTokenHash, Authentication},
    comment::Comment,
    group::{CreateGroup, Group, GroupMarker, GroupSlug},
    post::{Post, PostContent, PostMarker},
    user::{CreateUser, User, UserMarker, Username},
};
use sqlx::{PgPool, migrate::Migrator, postgres::PgPoolOptions, query, query_as, query_scalar};
use time::PrimitiveDateTime;

static MIGRATOR: Migrator = sqlx::migrate!();

/// Selected columns for [`FullPostRecord`], reading from a relation named `p`.
const POST_COLUMNS: &str = "
    p.post_id,
    p.text,
    p.created_at,
    p.image,
    u.user_id,
    u.username,
    u.first_name,
    u.last_name,
    g.group_id,
    g.title AS group_title,
    g.slug AS group_slug,
    g.description AS group_description
";

const POST_JOINS: &str = "
    JOIN users.users u ON u.user_id = p.author_id
    LEFT JOIN posts.groups g ON g.group_id = p.group_id
";

const COMMENT_COLUMNS: &str = "
    c.comment_id,
    c.post_id,
    c.text,
    c.created_at,
    u.user_id,
    u.username,
    u.first_name,
    u.last_name
";

pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for DbClient {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_id, username, first_name, last_name
            FROM users.users
            WHERE user_id = $1
            ",
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_id, username, first_name, last_name
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (username, first_name, last_name, email, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, username, first_name, last_name
            ",
        )
        .bind(user.username.get())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.try_into()?)
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<StoredCredentials>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT user_id, password_hash
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(|record| StoredCredentials {
            user: record.user_id.into(),
            password_hash: record.password_hash,
        }))
    }

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        let created_at = authentication.created_at;

        query(
            "
            INSERT INTO users.authentications
                (token_hash, user_id, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(authentication.token_hash.0.as_slice())
        .bind(authentication.user.get())
        .bind(PrimitiveDateTime::new(created_at.date(), created_at.time()))
        .bind(
            authentication
                .expires_after
                .map(|expires_after| expires_after.whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_authentication(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT user_id, token_hash, created_at, expires_after_seconds
            FROM users.authentications
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash.0.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    async fn delete_authentication(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result = query("DELETE FROM users.authentications WHERE token_hash = $1")
            .bind(token_hash.0.as_slice())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM posts.groups
            WHERE group_id = $1
            ",
        )
        .bind(group_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM posts.groups
            WHERE slug = $1
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
            SELECT group_id, title, slug, description
            FROM posts.groups
            ORDER BY title, group_id
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

    async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let record = query_as::<_, GroupRecord>(
            "
            INSERT INTO posts.groups (title, slug, description)
            VALUES ($1, $2, $3)
            RETURNING group_id, title, slug, description
            ",
        )
        .bind(&group.title)
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.try_into()?)
    }

    async fn fetch_posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        let (group, authors): (Option<i64>, Option<Vec<i64>>) = match filter {
            PostFilter::All => (None, None),
            PostFilter::Group(group) => (Some(group.get()), None),
            PostFilter::Author(author) => (None, Some(vec![author.get()])),
            PostFilter::Authors(authors) => {
                (None, Some(authors.iter().map(|author| author.get()).collect()))
            }
        };

        let sql = format!(
            "
            SELECT {POST_COLUMNS}
            FROM posts.posts p {POST_JOINS}
            WHERE ($1::BIGINT IS NULL OR p.group_id = $1)
                AND ($2::BIGINT[] IS NULL OR p.author_id = ANY($2))
            ORDER BY p.created_at DESC, p.post_id DESC
            "
        );

        let records = query_as::<_, FullPostRecord>(&sql)
            .bind(group)
            .bind(authors)
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let sql = format!(
            "
            SELECT {POST_COLUMNS}
            FROM posts.posts p {POST_JOINS}
            WHERE p.post_id = $1
            "
        );

        let record = query_as::<_, FullPostRecord>(&sql)
            .bind(post_id.get())
            .fetch_optional(&self.pool)
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn count_posts_by_author(&self, author: Id<UserMarker>) -> Result<usize> {
        let count = query_scalar::<_, i64>("SELECT count(*) FROM posts.posts WHERE author_id = $1")
            .bind(author.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn create_post(&self, author: Id<UserMarker>, content: &PostContent) -> Result<Post> {
        let sql = format!(
            "
            WITH p AS (
                INSERT INTO posts.posts (text, author_id, group_id, image)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            SELECT {POST_COLUMNS}
            FROM p {POST_JOINS}
            "
        );

        let record = query_as::<_, FullPostRecord>(&sql)
            .bind(content.text.get())
            .bind(author.get())
            .bind(content.group.map(Id::get))
            .bind(content.image.as_ref().map(|image| image.get()))
            .fetch_one(&self.pool)
            .await?;

        Ok(record.try_into()?)
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let sql = format!(
            "
            WITH p AS (
                UPDATE posts.posts
                SET text = $2, group_id = $3, image = $4
                WHERE post_id = $1
                RETURNING *
            )
            SELECT {POST_COLUMNS}
            FROM p {POST_JOINS}
            "
        );

        let record = query_as::<_, FullPostRecord>(&sql)
            .bind(post_id.get())
            .bind(content.text.get())
            .bind(content.group.map(Id::get))
            .bind(content.image.as_ref().map(|image| image.get()))
            .fetch_optional(&self.pool)
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts.posts WHERE post_id = $1")
            .bind(post_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let sql = format!(
            "
            SELECT {COMMENT_COLUMNS}
            FROM posts.comments c
                JOIN users.users u ON u.user_id = c.author_id
            WHERE c.post_id = $1
            ORDER BY c.created_at DESC, c.comment_id DESC
            "
        );

        let records = query_as::<_, CommentRecord>(&sql)
            .bind(post_id.get())
            .fetch_all(&self.pool)
            .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        author: Id<UserMarker>,
        text: &Text,
    ) -> Result<Comment> {
        let sql = format!(
            "
            WITH c AS (
                INSERT INTO posts.comments (post_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT {COMMENT_COLUMNS}
            FROM c
                JOIN users.users u ON u.user_id = c.author_id
            "
        );

        let record = query_as::<_, CommentRecord>(&sql)
            .bind(post_id.get())
            .bind(author.get())
            .bind(text.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(record.try_into()?)
    }

    async fn fetch_followed_authors(&self, user: Id<UserMarker>) -> Result<Vec<Id<UserMarker>>> {
        let authors = query_scalar::<_, i64>(
            "
            SELECT author_id
            FROM users.follows
            WHERE user_id = $1
            ORDER BY author_id
            ",
        )
        .bind(user.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(authors.into_iter().map(Id::from).collect())
    }

    async fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let following = query_scalar::<_, bool>(
            "
            SELECT EXISTS (
                SELECT 1 FROM users.follows WHERE user_id = $1 AND author_id = $2
            )
            ",
        )
        .bind(user.get())
        .bind(author.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(following)
    }

    async fn create_follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let result = query(
            "
            INSERT INTO users.follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT ON CONSTRAINT unique_following DO NOTHING
            ",
        )
        .bind(user.get())
        .bind(author.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let result = query("DELETE FROM users.follows WHERE user_id = $1 AND author_id = $2")
            .bind(user.get())
            .bind(author.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
