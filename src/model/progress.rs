use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError, VecSkipError};
use snafu::{ensure, Location, ResultExt as _, Snafu};

use super::{now, Timestamp, VideoId, ViewerId};
use crate::database::{DatabaseError, VideoCatalog};
use crate::interval::{calculate_progress, RawInterval, WatchedSet};

/// Optimistic-concurrency token of a [ProgressRecord].
///
/// A record that was never written has no revision; the first accepted write
/// stores revision 1 and every later write increments it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    pub fn new(revision: u64) -> Self {
        Self(revision)
    }

    /// The revision a write stores when it observed `expected` at read time.
    pub fn after(expected: Option<Revision>) -> Revision {
        expected.map_or(Revision(1), |Revision(n)| Revision(n + 1))
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Watched progress of one viewer on one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub viewer_id: ViewerId,
    pub video_id: VideoId,
    #[serde(default)]
    pub watched_intervals: WatchedSet,
    #[serde(default)]
    pub total_unique_watched_seconds: f64,
    #[serde(default)]
    pub progress_percentage: f64,
    #[serde(default)]
    pub last_watched_position: f64,
    #[serde(default)]
    pub video_duration: f64,
    #[serde(default)]
    pub revision: Revision,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ProgressRecord {
    pub fn new(viewer_id: ViewerId, video_id: VideoId, video_duration: f64) -> Self {
        let created_at = now();

        Self {
            viewer_id,
            video_id,
            watched_intervals: WatchedSet::new(),
            total_unique_watched_seconds: 0.0,
            progress_percentage: 0.0,
            last_watched_position: 0.0,
            video_duration,
            revision: Revision::default(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Applies the fields present in `update` and recalculates the aggregates.
    ///
    /// Validation (see [ProgressUpdate::is_actionable]) is the caller's job.
    pub fn apply(&mut self, update: &ProgressUpdate) {
        if let Some(duration) = update.positive_duration() {
            if duration != self.video_duration {
                self.video_duration = duration;
                self.last_watched_position = self.clamp_position(self.last_watched_position);
            }
        }

        if let Some(position) = update.position() {
            self.last_watched_position = self.clamp_position(position);
        }

        if let Some(intervals) = &update.intervals {
            self.watched_intervals = self.watched_intervals.merge(intervals);
        }

        self.recalculate();
        self.updated_at = now();
    }

    /// Re-derives `total_unique_watched_seconds` and `progress_percentage`.
    pub fn recalculate(&mut self) {
        self.total_unique_watched_seconds = self.watched_intervals.total_seconds();
        self.progress_percentage =
            calculate_progress(self.total_unique_watched_seconds, self.video_duration);
    }

    fn clamp_position(&self, position: f64) -> f64 {
        if self.video_duration > 0.0 {
            position.clamp(0.0, self.video_duration)
        } else {
            position.max(0.0)
        }
    }
}

/// A progress report as sent by a playback client.
///
/// Every field is optional and lenient: a field with the wrong JSON type is
/// treated as absent, and interval entries that are not objects are skipped.
/// `intervals: []` is different from a missing `intervals`.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    #[serde_as(deserialize_as = "DefaultOnError<Option<VecSkipError<_>>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervals: Option<Vec<RawInterval>>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_watched_position: Option<f64>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<f64>,
}

impl ProgressUpdate {
    pub fn with_intervals(mut self, intervals: impl IntoIterator<Item = RawInterval>) -> Self {
        self.intervals = Some(intervals.into_iter().collect());
        self
    }

    pub fn with_position(mut self, position: f64) -> Self {
        self.last_watched_position = Some(position);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.video_duration = Some(duration);
        self
    }

    /// A report must carry at least one interval or a numeric position.
    pub fn is_actionable(&self) -> bool {
        let has_intervals = self.intervals.as_ref().is_some_and(|intervals| !intervals.is_empty());
        has_intervals || self.position().is_some()
    }

    pub fn position(&self) -> Option<f64> {
        self.last_watched_position.filter(|position| position.is_finite())
    }

    pub fn positive_duration(&self) -> Option<f64> {
        self.video_duration
            .filter(|duration| duration.is_finite() && *duration > 0.0)
    }
}

/// Aggregates returned to clients. Also the shape of the "no progress yet"
/// answer, see [ProgressView::empty].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    #[serde(default)]
    pub watched_intervals: WatchedSet,
    #[serde(default)]
    pub total_unique_watched_seconds: f64,
    #[serde(default)]
    pub progress_percentage: f64,
    #[serde(default)]
    pub last_watched_position: f64,
    #[serde(default)]
    pub video_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressView {
    pub fn empty() -> Self {
        Self {
            message: Some("No progress found for this user/video.".to_string()),
            ..Self::default()
        }
    }
}

impl From<&ProgressRecord> for ProgressView {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            watched_intervals: record.watched_intervals.clone(),
            total_unique_watched_seconds: record.total_unique_watched_seconds,
            progress_percentage: record.progress_percentage,
            last_watched_position: record.last_watched_position,
            video_duration: record.video_duration,
            message: None,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProgressError {
    #[snafu(display(
        "request must include a non-empty intervals array or a numeric lastWatchedPosition"
    ))]
    InvalidRequest {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("a positive videoDuration is required to create progress for video `{video_id}`"))]
    MissingDuration {
        video_id: VideoId,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "progress of `{viewer_id}` on video `{video_id}` was saved concurrently, re-read and retry"
    ))]
    Conflict {
        viewer_id: ViewerId,
        video_id: VideoId,
        expected: Option<Revision>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to access the progress store: {source}"))]
    Store {
        source: DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// How a caller should react to a [ProgressError].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong; nothing was written.
    Validation,
    /// Lost an optimistic-concurrency race; retrying is safe.
    Conflict,
    Internal,
}

impl ProgressError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProgressError::InvalidRequest { .. } | ProgressError::MissingDuration { .. } => {
                ErrorKind::Validation
            }
            ProgressError::Conflict { .. } => ErrorKind::Conflict,
            ProgressError::Store { .. } => ErrorKind::Internal,
        }
    }
}

/// Produces the record that should be written for `update`.
///
/// A missing record is created, taking its duration from the update or, failing
/// that, from the catalog. The returned record keeps the revision it was read
/// with; the store assigns the next one on write.
pub async fn apply_update<C: VideoCatalog>(
    record: Option<ProgressRecord>, viewer_id: &ViewerId, video_id: &VideoId,
    update: &ProgressUpdate, catalog: &C,
) -> Result<ProgressRecord, ProgressError> {
    ensure!(update.is_actionable(), InvalidRequestSnafu);

    let mut record = match record {
        Some(record) => record,
        None => {
            let duration = match update.positive_duration() {
                Some(duration) => duration,
                None => catalog
                    .video(video_id)
                    .await
                    .context(StoreSnafu)?
                    .map_or(0.0, |video| video.duration),
            };

            ensure!(
                duration.is_finite() && duration > 0.0,
                MissingDurationSnafu {
                    video_id: video_id.clone()
                }
            );

            tracing::debug!(%viewer_id, %video_id, duration, "creating progress record");
            ProgressRecord::new(viewer_id.clone(), video_id.clone(), duration)
        }
    };

    record.apply(update);
    Ok(record)
}
