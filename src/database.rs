use std::future::Future;

use derive_new::new;
use snafu::{Location, OptionExt as _, ResultExt as _, Snafu};
use surrealdb::{engine::any::Any, opt::auth::Root, Surreal};

use crate::config::SurrealConfig;
use crate::model::{ProgressRecord, Revision, Video, VideoId, ViewerId};

pub use memory::MemoryStore;

mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;

const SCHEMA: &str = include_str!("../schema.surrealql");

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatabaseError {
    #[snafu(display("cannot connect to the database `{url}` at {location}: {source}"))]
    DatabaseConnection {
        url: String,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to query the database at {location}: {source}"))]
    DatabaseQuery {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to deserialize the database response at {location}: {source}"))]
    DatabaseDeserialize {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to parse the database response at {location}: response is empty"))]
    EmptyQuery {
        #[snafu(implicit)]
        location: Location,
    },
}

/// Outcome of a revision-checked write.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// The record as stored, carrying its new revision.
    Written(ProgressRecord),
    /// The stored revision is not the one the writer read; nothing was written.
    Conflict,
}

/// Storage of progress records, at most one per (viewer, video) pair.
pub trait ProgressStore: Clone + Send + Sync + 'static {
    fn find_one(
        &self, viewer_id: &ViewerId, video_id: &VideoId,
    ) -> impl Future<Output = Result<Option<ProgressRecord>>> + Send;

    /// Writes `record` only if the stored revision still equals `expected`
    /// (`None` meaning "no record yet"). The written record gets
    /// [Revision::after] `expected`.
    fn upsert(
        &self, record: ProgressRecord, expected: Option<Revision>,
    ) -> impl Future<Output = Result<Upsert>> + Send;
}

/// Lookup of video metadata.
pub trait VideoCatalog: Clone + Send + Sync + 'static {
    fn video(&self, video_id: &VideoId) -> impl Future<Output = Result<Option<Video>>> + Send;

    fn videos(&self) -> impl Future<Output = Result<Vec<Video>>> + Send;

    /// Inserts or replaces the catalog entry of `video.video_id`.
    fn register(&self, video: Video) -> impl Future<Output = Result<Video>> + Send;
}

/// Everything the HTTP layer needs from a backend.
pub trait Store: ProgressStore + VideoCatalog {}

impl<T: ProgressStore + VideoCatalog> Store for T {}

/// SurrealDB backed [Store].
///
/// Progress lives at `progress:[viewer_id, video_id]`, so the record id itself
/// enforces one record per pair. Catalog entries live at `videos:<video_id>`.
#[derive(Debug, Clone, new)]
pub struct Database {
    database: Surreal<Any>,
}

impl Database {
    pub async fn connect(config: &SurrealConfig) -> Result<Self> {
        let url = config.endpoint.to_string();

        let database = surrealdb::engine::any::connect(config.endpoint.as_str())
            .await
            .context(DatabaseConnectionSnafu { url: url.clone() })?;

        if let Some(credentials) = &config.credentials {
            database
                .signin(Root {
                    username: &credentials.username,
                    password: &credentials.password,
                })
                .await
                .context(DatabaseConnectionSnafu { url: url.clone() })?;
        }

        database
            .use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .context(DatabaseConnectionSnafu { url: url.clone() })?;

        database
            .query(SCHEMA)
            .await
            .and_then(|response| response.check())
            .context(DatabaseConnectionSnafu { url })?;

        tracing::info!(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database, "connected to the database");

        Ok(Self::new(database))
    }

    /// A throwaway in-process database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&SurrealConfig::default()).await
    }
}

impl ProgressStore for Database {
    async fn find_one(&self, viewer_id: &ViewerId, video_id: &VideoId) -> Result<Option<ProgressRecord>> {
        let mut response = self
            .database
            .query("SELECT * FROM type::thing('progress', [$viewer_id, $video_id])")
            .bind(("viewer_id", viewer_id.to_string()))
            .bind(("video_id", video_id.to_string()))
            .await
            .context(DatabaseQuerySnafu)?;

        response.take(0).context(DatabaseDeserializeSnafu)
    }

    async fn upsert(&self, mut record: ProgressRecord, expected: Option<Revision>) -> Result<Upsert> {
        record.revision = Revision::after(expected);

        let statement = match expected {
            None => "CREATE type::thing('progress', [$viewer_id, $video_id]) CONTENT $record RETURN AFTER",
            Some(_) => {
                "UPDATE type::thing('progress', [$viewer_id, $video_id]) CONTENT $record \
                 WHERE revision = $expected RETURN AFTER"
            }
        };

        let mut response = self
            .database
            .query(statement)
            .bind(("viewer_id", record.viewer_id.to_string()))
            .bind(("video_id", record.video_id.to_string()))
            .bind(("expected", expected))
            .bind(("record", record.clone()))
            .await
            .context(DatabaseQuerySnafu)?;

        match response.take::<Option<ProgressRecord>>(0) {
            Ok(Some(written)) => Ok(Upsert::Written(written)),
            Ok(None) => Ok(Upsert::Conflict),
            Err(error) if is_conflict(&error) => Ok(Upsert::Conflict),
            Err(error) => Err(error).context(DatabaseQuerySnafu),
        }
    }
}

impl VideoCatalog for Database {
    async fn video(&self, video_id: &VideoId) -> Result<Option<Video>> {
        self.database
            .select(("videos", video_id.as_ref()))
            .await
            .context(DatabaseQuerySnafu)
    }

    async fn videos(&self) -> Result<Vec<Video>> {
        let mut response = self
            .database
            .query("SELECT * FROM videos ORDER BY videoId ASC")
            .await
            .context(DatabaseQuerySnafu)?;

        response.take(0).context(DatabaseDeserializeSnafu)
    }

    async fn register(&self, video: Video) -> Result<Video> {
        let id = video.video_id.to_string();

        self.database
            .update(("videos", id))
            .content(video)
            .await
            .context(DatabaseQuerySnafu)?
            .context(EmptyQuerySnafu)
    }
}

/// Whether a failed statement means another writer created the record first.
fn is_conflict(error: &surrealdb::Error) -> bool {
    use surrealdb::error::{Api, Db};

    match error {
        surrealdb::Error::Db(Db::RecordExists { .. } | Db::IndexExists { .. }) => true,
        surrealdb::Error::Api(Api::Query(message)) => message.contains("already exists"),
        _ => false,
    }
}
