//! Main ledger orchestration layer
//!
//! This module ties together the chain, the sealing code and the append
//! actor into the public API.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger, LedgerTransaction, TransactionType};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::initialize(Config::with_difficulty(2)).await?;
//!
//!     let block = ledger
//!         .append(LedgerTransaction::new(
//!             TransactionType::VoteCast,
//!             serde_json::json!({"petition_id": "42", "vote_type": "favor"}),
//!             "vote cast",
//!         ))
//!         .await?;
//!     assert!(block.hash.starts_with("00"));
//!
//!     ledger.snapshot().verify()?;
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle, PendingBlock},
    chain::Blockchain,
    metrics::Metrics,
    types::{ChainSnapshot, LedgerBlock, LedgerTransaction},
    Config, Error, Result,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

/// Main ledger interface
///
/// Cheap to clone; all clones share one chain and one writer.
#[derive(Clone, Debug)]
pub struct Ledger {
    /// Actor handle for appends
    handle: LedgerHandle,

    /// Shared chain (read side)
    chain: Arc<RwLock<Blockchain>>,

    metrics: Metrics,
}

impl Ledger {
    /// Seal a genesis block at the configured difficulty and start the writer
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        let metrics = Metrics::new()?;

        let template = Blockchain::genesis_template(config.difficulty, &config.genesis_description);
        let started = Instant::now();
        let sealed = tokio::task::spawn_blocking(move || template.seal())
            .await
            .map_err(|e| Error::Sealing(format!("genesis mining task aborted: {}", e)))??;
        metrics.record_block_sealed(sealed.attempts, started.elapsed().as_secs_f64());

        tracing::info!(
            difficulty = config.difficulty,
            hash = %sealed.block.hash,
            "Ledger initialized with genesis block"
        );

        let chain = Arc::new(RwLock::new(Blockchain::from_genesis(sealed.block)?));
        let handle = spawn_ledger_actor(chain.clone(), metrics.clone(), config.mailbox_capacity);

        Ok(Self {
            handle,
            chain,
            metrics,
        })
    }

    /// Seal `transaction` onto the tail and return the new block
    ///
    /// Concurrent callers are serialized by the append actor. Blocks the
    /// caller for the proof-of-work (expected `16^difficulty` digests).
    pub async fn append(&self, transaction: LedgerTransaction) -> Result<LedgerBlock> {
        self.handle.append(transaction).await
    }

    /// Queue `transaction` behind everything already submitted
    ///
    /// Returns once the append holds its place in the mailbox; await
    /// [`PendingBlock::sealed`] for the block itself.
    pub async fn submit(&self, transaction: LedgerTransaction) -> Result<PendingBlock> {
        self.handle.submit(transaction).await
    }

    /// Immutable copy of the chain as of now
    pub fn snapshot(&self) -> ChainSnapshot {
        self.chain.read().snapshot()
    }

    /// Recompute every hash and check linkage
    pub fn verify(&self) -> Result<()> {
        self.chain.read().verify()
    }

    /// Configured difficulty
    pub fn difficulty(&self) -> u32 {
        self.chain.read().difficulty()
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    /// Always false: genesis exists from initialization on
    pub fn is_empty(&self) -> bool {
        self.chain.read().is_empty()
    }

    /// Ledger metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop the writer once queued appends are sealed
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}
