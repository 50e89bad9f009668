use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};

pub use progress::*;
pub use video::*;

mod progress;
mod video;

pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Opaque identity of an already authenticated viewer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(String);

impl ViewerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ViewerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ViewerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Catalog identifier of a video, usually a URL slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl std::str::FromStr for VideoId {
    type Err = ParseVideoId;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        ensure!(!trimmed.is_empty(), ParseVideoIdSnafu { text: input });
        Ok(VideoId(trimmed.to_string()))
    }
}

impl TryFrom<String> for VideoId {
    type Error = ParseVideoId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("invalid video id: `{text}`"))]
pub struct ParseVideoId {
    pub text: String,
}
