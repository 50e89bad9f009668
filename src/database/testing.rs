use super::{MemoryStore, ProgressStore, Result, Upsert, VideoCatalog};
use crate::model::{ProgressRecord, Revision, Video, VideoId, ViewerId};

/// A [MemoryStore] where another writer always lands between a caller's read
/// and its write, so every revision-checked write conflicts.
#[derive(Debug, Clone, Default)]
pub struct RacingStore {
    inner: MemoryStore,
}

impl RacingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self { inner }
    }
}

impl ProgressStore for RacingStore {
    async fn find_one(&self, viewer_id: &ViewerId, video_id: &VideoId) -> Result<Option<ProgressRecord>> {
        self.inner.find_one(viewer_id, video_id).await
    }

    async fn upsert(&self, record: ProgressRecord, expected: Option<Revision>) -> Result<Upsert> {
        self.inner.upsert(record.clone(), expected).await?;
        self.inner.upsert(record, expected).await
    }
}

impl VideoCatalog for RacingStore {
    async fn video(&self, video_id: &VideoId) -> Result<Option<Video>> {
        self.inner.video(video_id).await
    }

    async fn videos(&self) -> Result<Vec<Video>> {
        self.inner.videos().await
    }

    async fn register(&self, video: Video) -> Result<Video> {
        self.inner.register(video).await
    }
}
