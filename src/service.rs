use derive_new::new;
use snafu::ResultExt as _;
use tracing::instrument;

use crate::database::{Store, Upsert};
use crate::model::{
    apply_update, ConflictSnafu, ProgressError, ProgressRecord, ProgressUpdate, ProgressView,
    StoreSnafu, VideoId, ViewerId,
};

/// Reads and writes progress records on top of a [Store].
#[derive(Debug, Clone, new)]
pub struct ProgressService<S> {
    store: S,
}

impl<S: Store> ProgressService<S> {
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The viewer's progress, or the "no progress yet" view.
    #[instrument(skip(self))]
    pub async fn progress(&self, viewer_id: &ViewerId, video_id: &VideoId) -> Result<ProgressView, ProgressError> {
        let record = self
            .store
            .find_one(viewer_id, video_id)
            .await
            .context(StoreSnafu)?;

        Ok(record.as_ref().map_or_else(ProgressView::empty, ProgressView::from))
    }

    /// Merges `update` into the stored record in one read-modify-write.
    ///
    /// Fails with [ProgressError::Conflict] when another write landed between
    /// the read and the write; the losing update is not applied.
    #[instrument(skip(self, update))]
    pub async fn update(
        &self, viewer_id: &ViewerId, video_id: &VideoId, update: &ProgressUpdate,
    ) -> Result<ProgressRecord, ProgressError> {
        let current = self
            .store
            .find_one(viewer_id, video_id)
            .await
            .context(StoreSnafu)?;
        let expected = current.as_ref().map(|record| record.revision);

        let record = apply_update(current, viewer_id, video_id, update, &self.store).await?;

        match self.store.upsert(record, expected).await.context(StoreSnafu)? {
            Upsert::Written(record) => {
                tracing::info!(
                    %viewer_id,
                    %video_id,
                    revision = %record.revision,
                    total = record.total_unique_watched_seconds,
                    percentage = record.progress_percentage,
                    "saved progress"
                );
                Ok(record)
            }
            Upsert::Conflict => {
                tracing::warn!(%viewer_id, %video_id, ?expected, "progress was modified concurrently");
                ConflictSnafu {
                    viewer_id: viewer_id.clone(),
                    video_id: video_id.clone(),
                    expected,
                }
                .fail()
            }
        }
    }
}
