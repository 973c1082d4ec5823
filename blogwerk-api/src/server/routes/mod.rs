use crate::server::ServerRouter;
use axum::Router;

mod auth;
mod feed;
mod posts;
mod profiles;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(feed::routes())
        .merge(posts::routes())
        .merge(profiles::routes())
        .merge(auth::routes())
}
