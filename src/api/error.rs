use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use snafu::{Location, Snafu};

use crate::database::DatabaseError;
use crate::model::{ErrorKind, ParseVideoId, ProgressError, VideoId};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("missing or blank `{header}` header"))]
    Unauthenticated {
        header: &'static str,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("video `{video_id}` is not in the catalog"))]
    VideoNotFound {
        video_id: VideoId,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("{source}"))]
    InvalidVideo {
        source: ParseVideoId,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("invalid request body: {source}"))]
    InvalidBody {
        source: JsonRejection,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(transparent)]
    Progress { source: ProgressError },

    #[snafu(transparent)]
    Database { source: DatabaseError },
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            ApiError::VideoNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::InvalidVideo { .. } | ApiError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            ApiError::Progress { source } => match source.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated { .. } => "unauthenticated",
            ApiError::VideoNotFound { .. } => "video_not_found",
            ApiError::InvalidVideo { .. } => "invalid_video",
            ApiError::InvalidBody { .. } => "invalid_request",
            ApiError::Progress { source } => match source.kind() {
                ErrorKind::Validation => "invalid_request",
                ErrorKind::Conflict => "conflict",
                ErrorKind::Internal => "internal",
            },
            ApiError::Database { .. } => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            tracing::error!(error = ?self, "request failed: {}", self);
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %self, "request rejected");
            self.to_string()
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
