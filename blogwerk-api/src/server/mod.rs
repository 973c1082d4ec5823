use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use blogwerk_common::{
    model::{
        Id,
        auth::{AuthTokenDecodeError, AuthTokenHashError, PasswordHashError},
        group::{GroupMarker, GroupSlug},
        post::PostMarker,
        user::Username,
    },
    pagination::Paginator,
    util::PositiveDuration,
};
use blogwerk_db::{
    feed::FeedError,
    store::{DbError, SharedStore},
};
use cache::ResponseCache;
use json::Json;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error};

mod auth;
mod cache;
mod json;
mod page;
mod routes;
#[cfg(test)]
mod tests;

pub type ServerRouter = Router<ServerState>;

/// Characters left as-is when a path is passed along in a query parameter.
const NEXT_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub store: SharedStore,
    pub paginator: Paginator,
    pub index_cache: IndexCache,
    pub auth: AuthSettings,
}

/// The rendered global feed, keyed by requested page number.
#[derive(Clone)]
pub struct IndexCache {
    pub cache: Arc<ResponseCache<i64>>,
    pub ttl: Duration,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct AuthSettings {
    pub token_lifetime: Option<PositiveDuration>,
}

impl IndexCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(ResponseCache::new()),
            ttl,
        }
    }
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// Input that parsed fine but does not fit the current state of the store.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Group with id {0} does not exist.")]
    UnknownGroup(Id<GroupMarker>),
    #[error("The username {0} is already taken.")]
    UsernameTaken(Username),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error("Username or password was wrong")]
    InvalidCredentials,
    #[error("Login required for {next}")]
    Unauthenticated { next: String },
    #[error("Only the author may change post {post}")]
    NotPostAuthor { post: Id<PostMarker> },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User {0} was not found.")]
    UserByUsernameNotFound(Username),
    #[error("Group with slug {0} was not found.")]
    GroupBySlugNotFound(GroupSlug),
}

impl From<FeedError> for ServerError {
    fn from(value: FeedError) -> Self {
        match value {
            FeedError::GroupNotFound(slug) => Self::GroupBySlugNotFound(slug),
            FeedError::UserNotFound(username) => Self::UserByUsernameNotFound(username),
            FeedError::Database(err) => Self::Database(err),
        }
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByUsernameNotFound(_)
            | ServerError::GroupBySlugNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Unauthenticated { .. } | ServerError::NotPostAuthor { .. } => {
                StatusCode::SEE_OTHER
            }
            ServerError::InvalidToken | ServerError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::JsonRejection(rejection) => rejection.status(),
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::QueryRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn redirect_location(&self) -> Option<String> {
        match self {
            ServerError::Unauthenticated { next } => Some(format!(
                "/auth/login?next={}",
                utf8_percent_encode(next, NEXT_PATH_SET)
            )),
            ServerError::NotPostAuthor { post } => Some(format!("/posts/{post}")),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let Some(location) = self.redirect_location() {
            debug!(reason = %self, %location, "Redirecting");
            return Redirect::to(&location).into_response();
        }

        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            debug!(error = %self, %status, "Replying with error");
        }

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message: status.is_client_error().then(|| self.to_string()),
        };
        (status, Json(error_response)).into_response()
    }
}
