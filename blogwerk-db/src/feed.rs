//! Chooses which posts a viewer sees.
//!
//! Whatever order the store hands back, a selection is always sorted most
//! recent first, with newer ids first among posts sharing a timestamp.

use crate::store::{DbError, EntityStore, PostFilter};
use blogwerk_common::model::{
    Id,
    group::{Group, GroupSlug},
    post::Post,
    user::{User, UserMarker, Username},
};
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum FeedView {
    Global,
    Group(GroupSlug),
    Profile(Username),
    /// Posts by the authors the viewer follows. Anonymous viewers follow nobody.
    Following(Option<Id<UserMarker>>),
}

/// The entity a feed was resolved against, if any.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum FeedScope {
    Global,
    Group(Group),
    Profile(User),
    Following,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct FeedSelection {
    pub scope: FeedScope,
    pub posts: Vec<Post>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Group with slug {0} was not found.")]
    GroupNotFound(GroupSlug),
    #[error("User {0} was not found.")]
    UserNotFound(Username),
    #[error(transparent)]
    Database(#[from] DbError),
}

pub async fn select_feed(
    store: &dyn EntityStore,
    view: FeedView,
) -> Result<FeedSelection, FeedError> {
    let (scope, mut posts) = match view {
        FeedView::Global => (FeedScope::Global, store.fetch_posts(&PostFilter::All).await?),
        FeedView::Group(slug) => {
            let group = store
                .fetch_group_by_slug(&slug)
                .await?
                .ok_or(FeedError::GroupNotFound(slug))?;
            let posts = store.fetch_posts(&PostFilter::Group(group.id)).await?;

            (FeedScope::Group(group), posts)
        }
        FeedView::Profile(username) => {
            let author = store
                .fetch_user_by_username(&username)
                .await?
                .ok_or(FeedError::UserNotFound(username))?;
            let posts = store.fetch_posts(&PostFilter::Author(author.id)).await?;

            (FeedScope::Profile(author), posts)
        }
        FeedView::Following(None) => (FeedScope::Following, Vec::new()),
        FeedView::Following(Some(viewer)) => {
            let authors = store.fetch_followed_authors(viewer).await?;
            debug!(%viewer, authors = authors.len(), "Selecting followed feed");

            let posts = if authors.is_empty() {
                Vec::new()
            } else {
                store.fetch_posts(&PostFilter::Authors(authors)).await?
            };

            (FeedScope::Following, posts)
        }
    };

    posts.sort_by(Post::recency_order);

    Ok(FeedSelection { scope, posts })
}
