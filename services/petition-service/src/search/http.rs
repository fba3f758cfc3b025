use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use super::{IndexError, PetitionDocument, SearchIndexer};

/// Indexer for Elasticsearch-compatible document APIs (`PUT /{index}/_doc/{id}`)
pub struct HttpSearchIndexer {
    base_url: String,
    index: String,
    client: Client,
}

impl HttpSearchIndexer {
    pub fn new(
        base_url: impl Into<String>,
        index: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(HttpSearchIndexer {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
            client,
        })
    }

    pub fn document_url(&self, id: Uuid) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, id)
    }
}

#[async_trait]
impl SearchIndexer for HttpSearchIndexer {
    async fn index(&self, id: Uuid, document: &PetitionDocument) -> Result<(), IndexError> {
        let url = self.document_url(id);

        let response = self
            .client
            .put(&url)
            .json(document)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to index petition {}: {}", id, e);
                IndexError::Request(e)
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Rejected { status, body });
        }

        debug!("Indexed petition {}", id);
        Ok(())
    }
}
