use std::future::Future;

use derive_new::new;
use snafu::{IntoError as _, Location, Snafu};
use url::Url;

use crate::database::Store;
use crate::model::{ErrorKind, ProgressError, ProgressUpdate, ProgressView, VideoId, ViewerId};
use crate::service::ProgressService;

/// The progress API as seen by a session.
pub trait ProgressRemote: Clone + Send + Sync + 'static {
    fn fetch(&self, video_id: &VideoId) -> impl Future<Output = Result<ProgressView, RemoteError>> + Send;

    fn save(
        &self, video_id: &VideoId, update: &ProgressUpdate,
    ) -> impl Future<Output = Result<ProgressView, RemoteError>> + Send;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RemoteError {
    /// Lost an optimistic-concurrency race on the server.
    #[snafu(display("progress was saved concurrently: {message}"))]
    Conflict { message: String },

    #[snafu(display("progress request rejected with status {status}: {message}"))]
    Rejected { status: u16, message: String },

    #[snafu(display("failed to reach `{url}` at {location}: {source}"))]
    Transport {
        url: Url,
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("unexpected response from `{url}` at {location}: {source}"))]
    Decode {
        url: Url,
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("`{url}` cannot be used as an API base"))]
    InvalidBase {
        url: Url,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("{source}"))]
    Service {
        source: ProgressError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl RemoteError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict { .. })
    }
}

impl From<ProgressError> for RemoteError {
    fn from(error: ProgressError) -> Self {
        match error.kind() {
            ErrorKind::Conflict => ConflictSnafu {
                message: error.to_string(),
            }
            .build(),
            ErrorKind::Validation => RejectedSnafu {
                status: 400u16,
                message: error.to_string(),
            }
            .build(),
            ErrorKind::Internal => ServiceSnafu.into_error(error),
        }
    }
}

/// Talks to an in-process [ProgressService] on behalf of one viewer.
#[derive(Debug, Clone, new)]
pub struct LocalRemote<S> {
    service: ProgressService<S>,
    viewer_id: ViewerId,
}

impl<S: Store> ProgressRemote for LocalRemote<S> {
    async fn fetch(&self, video_id: &VideoId) -> Result<ProgressView, RemoteError> {
        Ok(self.service.progress(&self.viewer_id, video_id).await?)
    }

    async fn save(&self, video_id: &VideoId, update: &ProgressUpdate) -> Result<ProgressView, RemoteError> {
        let record = self.service.update(&self.viewer_id, video_id, update).await?;
        Ok(ProgressView::from(&record))
    }
}
