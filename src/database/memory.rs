use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use super::{ProgressStore, Result, Upsert, VideoCatalog};
use crate::model::{ProgressRecord, Revision, Video, VideoId, ViewerId};

/// In-process [Store](super::Store) used by tests and local sessions.
///
/// Revision checks happen under the map's entry lock, which gives the same
/// single-winner guarantee as the database's conditional update.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    progress: Arc<DashMap<(ViewerId, VideoId), ProgressRecord>>,
    videos: Arc<DashMap<VideoId, Video>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_video(&self, video: Video) {
        self.videos.insert(video.video_id.clone(), video);
    }
}

impl ProgressStore for MemoryStore {
    async fn find_one(&self, viewer_id: &ViewerId, video_id: &VideoId) -> Result<Option<ProgressRecord>> {
        let key = (viewer_id.clone(), video_id.clone());
        Ok(self.progress.get(&key).map(|record| record.clone()))
    }

    async fn upsert(&self, mut record: ProgressRecord, expected: Option<Revision>) -> Result<Upsert> {
        let key = (record.viewer_id.clone(), record.video_id.clone());
        record.revision = Revision::after(expected);

        let outcome = match (self.progress.entry(key), expected) {
            (Entry::Vacant(entry), None) => {
                entry.insert(record.clone());
                Upsert::Written(record)
            }
            (Entry::Occupied(mut entry), Some(expected)) if entry.get().revision == expected => {
                entry.insert(record.clone());
                Upsert::Written(record)
            }
            _ => Upsert::Conflict,
        };

        Ok(outcome)
    }
}

impl VideoCatalog for MemoryStore {
    async fn video(&self, video_id: &VideoId) -> Result<Option<Video>> {
        Ok(self.videos.get(video_id).map(|video| video.clone()))
    }

    async fn videos(&self) -> Result<Vec<Video>> {
        let mut videos: Vec<Video> = self.videos.iter().map(|video| video.clone()).collect();
        videos.sort_by(|a, b| a.video_id.as_ref().cmp(b.video_id.as_ref()));
        Ok(videos)
    }

    async fn register(&self, video: Video) -> Result<Video> {
        self.insert_video(video.clone());
        Ok(video)
    }
}
