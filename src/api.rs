use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt as _, ResultExt as _};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::instrument;
use url::Url;

pub use error::*;
pub use state::*;
pub use viewer::*;

use crate::database::Store;
use crate::model::{ProgressUpdate, ProgressView, Video, VideoId};

mod error;
mod state;
mod viewer;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

pub const HEALTH_MESSAGE: &str = "Video Progress Tracker API Running";

pub fn create_router<S: Store>(app: App<S>) -> Router {
    let progress = get(progress::<S>).post(save_progress::<S>).put(save_progress::<S>);
    let video = get(video::<S>).put(register_video::<S>);

    Router::new()
        .route("/", get(health))
        .route("/api/progress/:video_id", progress)
        .route("/api/videos", get(videos::<S>))
        .route("/api/videos/:video_id", video)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app)
}

/// Browser access restricted to `origin`, or open to any origin.
pub fn cors(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(error)) => {
            tracing::warn!(?origin, %error, "ignoring invalid CORS origin, allowing any origin");
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(VIEWER_HEADER)])
}

async fn health() -> &'static str {
    HEALTH_MESSAGE
}

fn parse_video_id(video_id: &str) -> Result<VideoId> {
    video_id.parse().context(InvalidVideoSnafu)
}

#[instrument(skip(app))]
async fn progress<S: Store>(
    State(app): State<App<S>>, Viewer(viewer_id): Viewer, Path(video_id): Path<String>,
) -> Result<Json<ProgressView>> {
    let video_id = parse_video_id(&video_id)?;
    let view = app.progress(&viewer_id, &video_id).await?;

    Ok(Json(view))
}

#[instrument(skip(app, body))]
async fn save_progress<S: Store>(
    State(app): State<App<S>>, Viewer(viewer_id): Viewer, Path(video_id): Path<String>,
    body: std::result::Result<Json<ProgressUpdate>, JsonRejection>,
) -> Result<Json<ProgressView>> {
    let video_id = parse_video_id(&video_id)?;
    let Json(update) = body.context(InvalidBodySnafu)?;

    let record = app.update(&viewer_id, &video_id, &update).await?;

    Ok(Json(ProgressView::from(&record)))
}

#[instrument(skip(app))]
async fn videos<S: Store>(State(app): State<App<S>>) -> Result<Json<Vec<Video>>> {
    Ok(Json(app.store().videos().await?))
}

#[instrument(skip(app))]
async fn video<S: Store>(State(app): State<App<S>>, Path(video_id): Path<String>) -> Result<Json<Video>> {
    let video_id = parse_video_id(&video_id)?;

    let video = app
        .store()
        .video(&video_id)
        .await?
        .context(VideoNotFoundSnafu {
            video_id: video_id.clone(),
        })?;

    Ok(Json(video))
}

/// Catalog entry as sent by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterVideo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<Url>,
    pub duration: f64,
}

#[instrument(skip(app, body))]
async fn register_video<S: Store>(
    State(app): State<App<S>>, Path(video_id): Path<String>,
    body: std::result::Result<Json<RegisterVideo>, JsonRejection>,
) -> Result<Json<Video>> {
    let video_id = parse_video_id(&video_id)?;
    let Json(RegisterVideo {
        title,
        description,
        url,
        duration,
    }) = body.context(InvalidBodySnafu)?;

    let video = Video {
        video_id,
        title,
        description,
        url,
        duration,
    };

    tracing::info!(video = ?video, "register video `{}`", video.video_id);
    Ok(Json(app.store().register(video).await?))
}
