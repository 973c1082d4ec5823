use async_trait::async_trait;
use blogwerk_common::model::{
    Id, ModelValidationError, Text,
    auth::{AuthTokenHash, Authentication},
    comment::Comment,
    group::{CreateGroup, Group, GroupMarker, GroupSlug},
    post::{Post, PostContent, PostMarker},
    user::{CreateUser, User, UserMarker, Username},
};
use std::sync::Arc;
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// The store as it is shared between request handlers.
pub type SharedStore = Arc<dyn EntityStore>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Unique constraint {0} was violated")]
    UniqueViolation(String),
    #[error("Foreign key constraint {0} was violated")]
    ForeignKeyViolation(String),
    #[error(transparent)]
    Sqlx(sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or_default().to_owned();

            if db_err.is_unique_violation() {
                return Self::UniqueViolation(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return Self::ForeignKeyViolation(constraint);
            }
        }

        Self::Sqlx(err)
    }
}

/// Which posts to list. Every variant is returned most recent first.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostFilter {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    Authors(Vec<Id<UserMarker>>),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct StoredCredentials {
    pub user: Id<UserMarker>,
    pub password_hash: String,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>>;

    async fn create_user(&self, user: &CreateUser) -> Result<User>;

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<StoredCredentials>>;

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()>;

    async fn fetch_authentication(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>>;

    async fn delete_authentication(&self, token_hash: &AuthTokenHash) -> Result<bool>;

    async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>>;

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>>;

    async fn fetch_groups(&self) -> Result<Vec<Group>>;

    async fn create_group(&self, group: &CreateGroup) -> Result<Group>;

    async fn fetch_posts(&self, filter: &PostFilter) -> Result<Vec<Post>>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn count_posts_by_author(&self, author: Id<UserMarker>) -> Result<usize>;

    async fn create_post(&self, author: Id<UserMarker>, content: &PostContent) -> Result<Post>;

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>>;

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool>;

    async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>>;

    async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        author: Id<UserMarker>,
        text: &Text,
    ) -> Result<Comment>;

    async fn fetch_followed_authors(&self, user: Id<UserMarker>) -> Result<Vec<Id<UserMarker>>>;

    async fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool>;

    /// Returns `false` if the edge already existed.
    async fn create_follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool>;

    /// Returns `false` if there was no edge to remove.
    async fn delete_follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool>;
}
