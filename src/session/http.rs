use derive_new::new;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use snafu::{OptionExt as _, ResultExt as _};
use url::Url;

use super::remote::{ConflictSnafu, DecodeSnafu, InvalidBaseSnafu, RejectedSnafu, TransportSnafu};
use super::{ProgressRemote, RemoteError};
use crate::api::{ErrorBody, VIEWER_HEADER};
use crate::model::{ProgressUpdate, ProgressView, VideoId, ViewerId};

/// [ProgressRemote] over the HTTP API.
///
/// `base` is the server root, e.g. `http://localhost:5001/`.
#[derive(Debug, Clone, new)]
pub struct HttpRemote {
    client: Client,
    base: Url,
    viewer_id: ViewerId,
}

impl HttpRemote {
    fn endpoint(&self, video_id: &VideoId) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();

        url.path_segments_mut()
            .ok()
            .context(InvalidBaseSnafu {
                url: self.base.clone(),
            })?
            .pop_if_empty()
            .extend(["api", "progress", video_id.as_ref()]);

        Ok(url)
    }

    async fn send(&self, url: Url, request: RequestBuilder) -> Result<ProgressView, RemoteError> {
        let response = request
            .header(VIEWER_HEADER, self.viewer_id.as_ref())
            .send()
            .await
            .context(TransportSnafu { url: url.clone() })?;

        let response = check(response).await?;
        response.json().await.context(DecodeSnafu { url })
    }
}

impl ProgressRemote for HttpRemote {
    async fn fetch(&self, video_id: &VideoId) -> Result<ProgressView, RemoteError> {
        let url = self.endpoint(video_id)?;
        let request = self.client.get(url.clone());
        self.send(url, request).await
    }

    async fn save(&self, video_id: &VideoId, update: &ProgressUpdate) -> Result<ProgressView, RemoteError> {
        let url = self.endpoint(video_id)?;
        let request = self.client.post(url.clone()).json(update);
        self.send(url, request).await
    }
}

/// Turns non-success statuses into [RemoteError]s, 409 into a conflict.
async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);

    if status == StatusCode::CONFLICT {
        return ConflictSnafu { message }.fail();
    }

    RejectedSnafu {
        status: status.as_u16(),
        message,
    }
    .fail()
}
