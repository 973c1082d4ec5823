use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::TypedHeader;
use blogwerk_common::model::{
    Id,
    auth::{AuthToken, AuthTokenHash},
    user::UserMarker,
};
use blogwerk_db::store::SharedStore;
use headers::{Authorization, authorization::Bearer};
use time::UtcDateTime;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// A request carrying a valid bearer token.
///
/// Requests without an `Authorization` header are rejected with a redirect to
/// the login route; use `Option<AuthenticatedUser>` where anonymous access is fine.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
    token_hash: AuthTokenHash,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.id
    }

    #[must_use]
    pub fn token_hash(&self) -> &AuthTokenHash {
        &self.token_hash
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    SharedStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let extracted =
            <AuthorizationHeader as FromRequestParts<S>>::from_request_parts(parts, state).await;
        let header = match extracted {
            Ok(header) => header,
            Err(rejection) if rejection.is_missing() => {
                return Err(ServerError::Unauthenticated {
                    next: parts.uri.path().to_owned(),
                });
            }
            Err(rejection) => return Err(ServerError::InvalidAuthorizationHeader(rejection)),
        };

        let request_token: AuthToken = header.token().parse()?;
        let token_hash = request_token.hash()?;

        let authentication = SharedStore::from_ref(state)
            .fetch_authentication(&token_hash)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        if authentication.user != request_token.user_id
            || authentication.is_expired_at(UtcDateTime::now())
        {
            return Err(ServerError::InvalidToken);
        }

        Ok(Self {
            id: authentication.user,
            token_hash,
        })
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    SharedStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(None);
        }

        <Self as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}
