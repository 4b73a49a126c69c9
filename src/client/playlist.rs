use std::sync::{Arc, RwLock};

use log::{debug, o, warn, Logger};

use crate::db::Db;
use crate::errors::BackendError;
use crate::recording::{Id, NewRecording, Recording};

/// Where the cached playlist is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CacheState {
    /// Never listed.
    Empty,

    /// Holds the result of the last completed `list`.
    Populated,

    /// A mutation has been sent; the cached recordings may be stale.
    Invalidated,
}

struct Cache {
    state: CacheState,
    recordings: Vec<Recording>,
}

/// Keeps a client-side copy of the playlist in step with the recording
/// store by re-listing after every mutation.
pub struct Playlist {
    logger: Arc<Logger>,
    db: Arc<dyn Db + Send + Sync>,
    cache: RwLock<Cache>,
}

impl Playlist {
    pub fn new(logger: Arc<Logger>, db: Arc<dyn Db + Send + Sync>) -> Self {
        Playlist {
            logger,
            db,
            cache: RwLock::new(Cache {
                state: CacheState::Empty,
                recordings: vec![],
            }),
        }
    }

    /// Fetches every recording, most recent first, and replaces the cache
    /// with them.
    pub async fn list(&self) -> Result<Vec<Recording>, BackendError> {
        let recordings = self.db.list().await?;

        debug!(self.logger, "Listed recordings"; "count" => recordings.len());

        let mut cache = self.cache.write().unwrap();
        cache.recordings = recordings.clone();
        cache.state = CacheState::Populated;

        Ok(recordings)
    }

    /// The recordings as of the last `list`.
    pub fn recordings(&self) -> Vec<Recording> {
        self.cache.read().unwrap().recordings.clone()
    }

    pub fn state(&self) -> CacheState {
        self.cache.read().unwrap().state
    }

    pub async fn add(&self, recording: NewRecording) -> Result<Recording, BackendError> {
        self.invalidate();

        let created = self.db.insert(recording).await?;
        debug!(self.logger, "Added recording"; "id" => created.id);

        self.relist(created).await
    }

    pub async fn update(&self, id: Id, recording: NewRecording) -> Result<Recording, BackendError> {
        self.invalidate();

        let updated = self.db.update(id, recording).await?;
        debug!(self.logger, "Updated recording"; "id" => id);

        self.relist(updated).await
    }

    pub async fn remove(&self, id: Id) -> Result<(), BackendError> {
        self.invalidate();

        self.db.delete(id).await?;
        debug!(self.logger, "Removed recording"; "id" => id);

        self.list().await?;

        Ok(())
    }

    /// Deletes every recording, one at a time. Deletions that succeed stay
    /// deleted even if others fail; the playlist is re-listed either way,
    /// and failed deletions are reported even if that listing fails.
    /// Returns the recordings that were removed.
    pub async fn remove_all(&self) -> Result<Vec<Recording>, BackendError> {
        let recordings = self.list().await?;
        let attempted = recordings.len();

        self.invalidate();

        let mut removed = Vec::with_capacity(attempted);
        let mut failed = 0;

        for recording in recordings {
            let logger = self.logger.new(o!("id" => recording.id));

            match self.db.delete(recording.id).await {
                Ok(()) => removed.push(recording),
                Err(e) => {
                    warn!(logger, "Failed to remove recording"; "error" => %e);
                    failed += 1;
                }
            }
        }

        let relisted = self.list().await;

        if failed > 0 {
            if let Err(e) = relisted {
                warn!(self.logger, "Failed to refresh after removing recordings"; "error" => %e);
            }

            return Err(BackendError::PartialBulkFailure { failed, attempted });
        }

        relisted?;

        Ok(removed)
    }

    /// Lists again after a stored mutation, keeping hold of what was stored
    /// if listing fails.
    async fn relist(&self, recording: Recording) -> Result<Recording, BackendError> {
        match self.list().await {
            Ok(_) => Ok(recording),
            Err(e) => Err(BackendError::RelistFailed {
                recording: Box::new(recording),
                source: Box::new(e),
            }),
        }
    }

    fn invalidate(&self) {
        self.cache.write().unwrap().state = CacheState::Invalidated;
    }
}
