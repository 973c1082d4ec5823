use crate::server::{
    IndexCache, Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::{Json, JsonBytes},
    page::RequestedPage,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use blogwerk_common::{
    model::{
        group::{Group, GroupSlug},
        post::Post,
    },
    pagination::{Page, Paginator},
};
use blogwerk_db::{
    feed::{FeedScope, FeedSelection, FeedView, select_feed},
    store::SharedStore,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(group_feed)
        .typed_get(follow_feed)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
struct IndexPath();

/// The global feed. Rendered pages are reused until their TTL runs out, so
/// writes can take that long to show up here.
async fn index(
    IndexPath(): IndexPath,
    State(store): State<SharedStore>,
    State(paginator): State<Paginator>,
    State(index_cache): State<IndexCache>,
    RequestedPage(page): RequestedPage,
) -> Result<JsonBytes> {
    let key = page.max(1);

    if let Some(body) = index_cache.cache.get(&key).await {
        debug!(page = key, "Global feed served from cache");
        return Ok(JsonBytes(body));
    }
    debug!(page = key, "Global feed not cached, rendering");

    let selection = select_feed(store.as_ref(), FeedView::Global).await?;
    let body = JsonBytes::serialize(&paginator.paginate(selection.posts, page))?;

    index_cache
        .cache
        .put(key, body.0.clone(), index_cache.ttl)
        .await;

    Ok(body)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}", rejection(ServerError))]
struct GroupFeedPath {
    slug: GroupSlug,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct GroupFeed {
    group: Group,
    page: Page<Post>,
}

async fn group_feed(
    GroupFeedPath { slug }: GroupFeedPath,
    State(store): State<SharedStore>,
    State(paginator): State<Paginator>,
    RequestedPage(page): RequestedPage,
) -> Result<Json<GroupFeed>> {
    let FeedSelection { scope, posts } =
        select_feed(store.as_ref(), FeedView::Group(slug.clone())).await?;
    let FeedScope::Group(group) = scope else {
        return Err(ServerError::GroupBySlugNotFound(slug));
    };

    Ok(Json(GroupFeed {
        group,
        page: paginator.paginate(posts, page),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/follow", rejection(ServerError))]
struct FollowFeedPath();

async fn follow_feed(
    FollowFeedPath(): FollowFeedPath,
    State(store): State<SharedStore>,
    State(paginator): State<Paginator>,
    user: AuthenticatedUser,
    RequestedPage(page): RequestedPage,
) -> Result<Json<Page<Post>>> {
    let selection =
        select_feed(store.as_ref(), FeedView::Following(Some(user.user_id()))).await?;

    Ok(Json(paginator.paginate(selection.posts, page)))
}
