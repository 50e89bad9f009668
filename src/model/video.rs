use serde::{Deserialize, Serialize};
use url::Url;

use super::VideoId;

/// Catalog entry of a video. The catalog only matters to progress tracking as
/// the fallback source of a video's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub video_id: VideoId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// Length in seconds, `0` when unknown.
    #[serde(default)]
    pub duration: f64,
}

impl Video {
    pub fn new(video_id: VideoId, title: impl Into<String>, duration: f64) -> Self {
        Self {
            video_id,
            title: title.into(),
            description: None,
            url: None,
            duration,
        }
    }
}
