use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

use super::{IndexError, PetitionDocument, SearchIndexer};

/// Indexer that keeps documents in memory
#[derive(Debug, Default)]
pub struct RecordingIndexer {
    documents: Mutex<Vec<(Uuid, PetitionDocument)>>,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl RecordingIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn documents(&self) -> Vec<(Uuid, PetitionDocument)> {
        self.documents.lock().clone()
    }
}

#[async_trait]
impl SearchIndexer for RecordingIndexer {
    async fn index(&self, id: Uuid, document: &PetitionDocument) -> Result<(), IndexError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("recording indexer switched off".to_string()));
        }
        self.documents.lock().push((id, document.clone()));
        Ok(())
    }
}
