use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::{ApiError, UnauthenticatedSnafu};
use crate::model::ViewerId;

/// Header carrying the identity an upstream authenticator resolved.
pub const VIEWER_HEADER: &str = "x-viewer-id";

/// The authenticated viewer of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer(pub ViewerId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(VIEWER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match id {
            Some(id) => Ok(Viewer(ViewerId::new(id))),
            None => UnauthenticatedSnafu {
                header: VIEWER_HEADER,
            }
            .fail(),
        }
    }
}
