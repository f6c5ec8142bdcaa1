use crate::server::{Result, ServerError};
use axum::{
    Json as AxumJson,
    body::Bytes,
    extract::FromRequest,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::{Serialize, de::DeserializeOwned};

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumJson), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> Json<T> {
    /// Parses a body that was extracted as raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let AxumJson(value) = AxumJson::from_bytes(bytes)?;
        Ok(Self(value))
    }
}

impl<T: Serialize> Json<T> {
    pub fn into_bytes(self) -> Result<Bytes> {
        Ok(serde_json::to_vec(&self.0)?.into())
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match self.into_bytes() {
            Ok(json) => RenderedJson(json).into_response(),
            Err(err) => err.into_response(),
        }
    }
}

/// A JSON document that was already serialized, e.g. one served from a cache.
#[derive(Debug, Clone, Default)]
pub struct RenderedJson(pub Bytes);

impl IntoResponse for RenderedJson {
    fn into_response(self) -> Response {
        (TypedHeader(ContentType::json()), self.0).into_response()
    }
}
