use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json, page::RequestedPage,
};
use axum::{extract::State, response::Redirect};
use axum_extra::routing::{RouterExt, TypedPath};
use blogwerk_common::{
    model::{
        post::Post,
        user::{User, Username},
    },
    pagination::{Page, Paginator},
};
use blogwerk_db::{
    feed::{FeedScope, FeedSelection, FeedView, select_feed},
    store::SharedStore,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_profile)
        .typed_post(follow)
        .typed_post(unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}", rejection(ServerError))]
struct ProfilePath {
    username: Username,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct Profile {
    author: User,
    post_count: usize,
    /// Whether the viewer follows this author. Always `false` for anonymous viewers.
    following: bool,
    page: Page<Post>,
}

async fn get_profile(
    ProfilePath { username }: ProfilePath,
    State(store): State<SharedStore>,
    State(paginator): State<Paginator>,
    viewer: Option<AuthenticatedUser>,
    RequestedPage(page): RequestedPage,
) -> Result<Json<Profile>> {
    let FeedSelection { scope, posts } =
        select_feed(store.as_ref(), FeedView::Profile(username.clone())).await?;
    let FeedScope::Profile(author) = scope else {
        return Err(ServerError::UserByUsernameNotFound(username));
    };

    let following = match viewer {
        Some(viewer) => store.is_following(viewer.user_id(), author.id).await?,
        None => false,
    };

    Ok(Json(Profile {
        author,
        post_count: posts.len(),
        following,
        page: paginator.paginate(posts, page),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow", rejection(ServerError))]
struct FollowPath {
    username: Username,
}

async fn follow(
    FollowPath { username }: FollowPath,
    State(store): State<SharedStore>,
    user: AuthenticatedUser,
) -> Result<Redirect> {
    let author = fetch_author(&store, username).await?;

    if store.create_follow(user.user_id(), author.id).await? {
        info!(user = %user.user_id(), author = %author.id, "Follow created");
    }

    Ok(redirect_to_profile(&author))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow", rejection(ServerError))]
struct UnfollowPath {
    username: Username,
}

async fn unfollow(
    UnfollowPath { username }: UnfollowPath,
    State(store): State<SharedStore>,
    user: AuthenticatedUser,
) -> Result<Redirect> {
    let author = fetch_author(&store, username).await?;

    if store.delete_follow(user.user_id(), author.id).await? {
        info!(user = %user.user_id(), author = %author.id, "Follow removed");
    }

    Ok(redirect_to_profile(&author))
}

async fn fetch_author(store: &SharedStore, username: Username) -> Result<User> {
    store
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))
}

pub(super) fn redirect_to_profile(user: &User) -> Redirect {
    Redirect::to(&format!("/profile/{}", user.username))
}
