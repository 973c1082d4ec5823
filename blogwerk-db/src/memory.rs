//! An in-process [`EntityStore`] used when no database is configured, and by tests.

use crate::store::{DbError, EntityStore, PostFilter, Result, StoredCredentials};
use async_trait::async_trait;
use blogwerk_common::model::{
    Id, Text,
    auth::{AuthTokenHash, Authentication},
    comment::{Comment, CommentMarker},
    follow::Follow,
    group::{CreateGroup, Group, GroupMarker, GroupSlug},
    post::{ImageRef, Post, PostContent, PostMarker},
    user::{CreateUser, User, UserMarker, Username},
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_id: i64,
    users: BTreeMap<Id<UserMarker>, UserRow>,
    authentications: HashMap<AuthTokenHash, Authentication>,
    groups: BTreeMap<Id<GroupMarker>, Group>,
    posts: BTreeMap<Id<PostMarker>, PostRow>,
    comments: BTreeMap<Id<CommentMarker>, CommentRow>,
    follows: BTreeSet<Follow>,
}

struct UserRow {
    user: User,
    password_hash: String,
}

struct PostRow {
    text: Text,
    created_at: OffsetDateTime,
    author: Id<UserMarker>,
    group: Option<Id<GroupMarker>>,
    image: Option<ImageRef>,
}

struct CommentRow {
    post: Id<PostMarker>,
    author: Id<UserMarker>,
    text: Text,
    created_at: OffsetDateTime,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn next_id<Marker>(&mut self) -> Id<Marker> {
        self.last_id += 1;
        Id::new(self.last_id)
    }

    fn user(&self, user_id: Id<UserMarker>) -> Option<User> {
        self.users.get(&user_id).map(|row| row.user.clone())
    }

    fn post(&self, post_id: Id<PostMarker>) -> Option<Post> {
        let row = self.posts.get(&post_id)?;

        Some(Post {
            id: post_id,
            text: row.text.clone(),
            created_at: row.created_at,
            author: self.user(row.author)?,
            group: row.group.and_then(|group| self.groups.get(&group).cloned()),
            image: row.image.clone(),
        })
    }

    fn comment(&self, comment_id: Id<CommentMarker>) -> Option<Comment> {
        let row = self.comments.get(&comment_id)?;

        Some(Comment {
            id: comment_id,
            post: row.post,
            author: self.user(row.author)?,
            text: row.text.clone(),
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.state().user(user_id))
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        Ok(self
            .state()
            .users
            .values()
            .find(|row| &row.user.username == username)
            .map(|row| row.user.clone()))
    }

    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let mut state = self.state();

        if state
            .users
            .values()
            .any(|row| row.user.username == user.username)
        {
            return Err(DbError::UniqueViolation("users_username_key".to_owned()));
        }

        let created = User {
            id: state.next_id(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        };
        state.users.insert(
            created.id,
            UserRow {
                user: created.clone(),
                password_hash: user.password_hash.clone(),
            },
        );

        Ok(created)
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<StoredCredentials>> {
        Ok(self
            .state()
            .users
            .values()
            .find(|row| &row.user.username == username)
            .map(|row| StoredCredentials {
                user: row.user.id,
                password_hash: row.password_hash.clone(),
            }))
    }

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        let mut state = self.state();

        if state.authentications.contains_key(&authentication.token_hash) {
            return Err(DbError::UniqueViolation("authentications_pkey".to_owned()));
        }
        state
            .authentications
            .insert(authentication.token_hash.clone(), authentication.clone());

        Ok(())
    }

    async fn fetch_authentication(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>> {
        Ok(self.state().authentications.get(token_hash).cloned())
    }

    async fn delete_authentication(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        Ok(self.state().authentications.remove(token_hash).is_some())
    }

    async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        Ok(self.state().groups.get(&group_id).cloned())
    }

    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        Ok(self
            .state()
            .groups
            .values()
            .find(|group| &group.slug == slug)
            .cloned())
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = self.state().groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        Ok(groups)
    }

    async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let mut state = self.state();

        if state.groups.values().any(|existing| existing.slug == group.slug) {
            return Err(DbError::UniqueViolation("groups_slug_key".to_owned()));
        }

        let created = Group {
            id: state.next_id(),
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        };
        state.groups.insert(created.id, created.clone());

        Ok(created)
    }

    async fn fetch_posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        let state = self.state();

        let mut posts: Vec<Post> = state
            .posts
            .iter()
            .filter(|(_, row)| match filter {
                PostFilter::All => true,
                PostFilter::Group(group) => row.group == Some(*group),
                PostFilter::Author(author) => row.author == *author,
                PostFilter::Authors(authors) => authors.contains(&row.author),
            })
            .filter_map(|(id, _)| state.post(*id))
            .collect();
        posts.sort_by(Post::recency_order);

        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.state().post(post_id))
    }

    async fn count_posts_by_author(&self, author: Id<UserMarker>) -> Result<usize> {
        Ok(self
            .state()
            .posts
            .values()
            .filter(|row| row.author == author)
            .count())
    }

    async fn create_post(&self, author: Id<UserMarker>, content: &PostContent) -> Result<Post> {
        let mut state = self.state();

        if !state.users.contains_key(&author) {
            return Err(DbError::ForeignKeyViolation("posts_author_id_fkey".to_owned()));
        }
        if let Some(group) = content.group
            && !state.groups.contains_key(&group)
        {
            return Err(DbError::ForeignKeyViolation("posts_group_id_fkey".to_owned()));
        }

        let post_id = state.next_id();
        state.posts.insert(
            post_id,
            PostRow {
                text: content.text.clone(),
                created_at: OffsetDateTime::now_utc(),
                author,
                group: content.group,
                image: content.image.clone(),
            },
        );

        state
            .post(post_id)
            .ok_or_else(|| DbError::ForeignKeyViolation("posts_author_id_fkey".to_owned()))
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let mut state = self.state();

        if let Some(group) = content.group
            && !state.groups.contains_key(&group)
        {
            return Err(DbError::ForeignKeyViolation("posts_group_id_fkey".to_owned()));
        }

        let Some(row) = state.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        row.text = content.text.clone();
        row.group = content.group;
        row.image = content.image.clone();

        Ok(state.post(post_id))
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let mut state = self.state();

        let deleted = state.posts.remove(&post_id).is_some();
        state.comments.retain(|_, comment| comment.post != post_id);

        Ok(deleted)
    }

    async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let state = self.state();

        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|(_, row)| row.post == post_id)
            .filter_map(|(id, _)| state.comment(*id))
            .collect();
        comments.sort_by(Comment::recency_order);

        Ok(comments)
    }

    async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        author: Id<UserMarker>,
        text: &Text,
    ) -> Result<Comment> {
        let mut state = self.state();

        if !state.posts.contains_key(&post_id) {
            return Err(DbError::ForeignKeyViolation("comments_post_id_fkey".to_owned()));
        }
        if !state.users.contains_key(&author) {
            return Err(DbError::ForeignKeyViolation("comments_author_id_fkey".to_owned()));
        }

        let comment_id = state.next_id();
        state.comments.insert(
            comment_id,
            CommentRow {
                post: post_id,
                author,
                text: text.clone(),
                created_at: OffsetDateTime::now_utc(),
            },
        );

        state
            .comment(comment_id)
            .ok_or_else(|| DbError::ForeignKeyViolation("comments_author_id_fkey".to_owned()))
    }

    async fn fetch_followed_authors(&self, user: Id<UserMarker>) -> Result<Vec<Id<UserMarker>>> {
        Ok(self
            .state()
            .follows
            .iter()
            .filter(|follow| follow.user == user)
            .map(|follow| follow.author)
            .collect())
    }

    async fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        Ok(self.state().follows.contains(&Follow { user, author }))
    }

    async fn create_follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let mut state = self.state();

        for id in [user, author] {
            if !state.users.contains_key(&id) {
                return Err(DbError::ForeignKeyViolation("follows_user_fkey".to_owned()));
            }
        }

        Ok(state.follows.insert(Follow { user, author }))
    }

    async fn delete_follow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        Ok(self.state().follows.remove(&Follow { user, author }))
    }
}
