use crate::server::ServerError;
use axum::{
    Json as AxumJson,
    body::Bytes,
    extract::FromRequest,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::Serialize;

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumJson), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(json) => JsonBytes(json.into()).into_response(),
            Err(err) => ServerError::JsonResponse(err).into_response(),
        }
    }
}

/// An already serialized JSON body, e.g. one taken from a cache.
#[derive(Debug, Clone, Default)]
pub struct JsonBytes(pub Bytes);

impl JsonBytes {
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(|json| Self(json.into()))
    }
}

impl IntoResponse for JsonBytes {
    fn into_response(self) -> Response {
        (TypedHeader(ContentType::json()), self.0).into_response()
    }
}
