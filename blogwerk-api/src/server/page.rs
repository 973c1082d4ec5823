use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use blogwerk_common::pagination::parse_page_number;
use serde::Deserialize;
use std::convert::Infallible;

/// The page number requested through the `page` query parameter.
///
/// Never rejects: a missing or malformed value means page 1.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct RequestedPage(pub i64);

#[derive(Deserialize)]
struct PageQuery {
    page: Option<String>,
}

impl<S> FromRequestParts<S> for RequestedPage
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw = Query::<PageQuery>::from_request_parts(parts, state)
            .await
            .ok()
            .and_then(|Query(query)| query.page);

        Ok(Self(parse_page_number(raw.as_deref())))
    }
}
