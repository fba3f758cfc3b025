//! Full-text search indexing for petitions

pub mod http;
pub mod memory;

pub use self::http::HttpSearchIndexer;
pub use self::memory::RecordingIndexer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Petition;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Index rejected document with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Index request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Indexer unavailable: {0}")]
    Unavailable(String),
}

/// Searchable projection of a petition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetitionDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub goal: i64,
    pub votes_in_favor: i64,
    pub votes_against: i64,
    pub voting_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&Petition> for PetitionDocument {
    fn from(petition: &Petition) -> Self {
        PetitionDocument {
            id: petition.id,
            owner_id: petition.owner_id,
            title: petition.title.clone(),
            description: petition.description.clone(),
            goal: petition.goal,
            votes_in_favor: petition.votes_in_favor,
            votes_against: petition.votes_against,
            voting_deadline: petition.voting_deadline,
            created_at: petition.created_at,
        }
    }
}

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Insert or replace the document stored under `id`
    async fn index(&self, id: Uuid, document: &PetitionDocument) -> Result<(), IndexError>;
}
