//! Single-writer append actor
//!
//! Every append goes through one task that owns chain writes, so a new block
//! always links to the current tail. The handle is cheap to clone and talks to
//! the actor over a bounded mailbox; producers wait when it is full.
//!
//! ```text
//! coordinator ──append──► LedgerHandle ──mpsc──► LedgerActor
//!                                                  │ next_template()  (read lock)
//!                                                  │ seal()           (blocking pool)
//!                                                  └ push()           (write lock)
//! ```

use crate::chain::Blockchain;
use crate::metrics::Metrics;
use crate::types::{LedgerBlock, LedgerTransaction};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Seal and append a transaction
    Append {
        /// Transaction to embed
        transaction: LedgerTransaction,
        /// Receives the sealed block
        response: oneshot::Sender<Result<LedgerBlock>>,
    },

    /// Stop after everything already queued has been sealed
    Shutdown {
        /// Acknowledged once the actor stops taking messages
        response: oneshot::Sender<()>,
    },
}

/// Actor that owns chain writes
#[derive(Debug)]
pub struct LedgerActor {
    /// Shared chain; this actor is its only writer
    chain: Arc<RwLock<Blockchain>>,

    /// Pending appends and the shutdown request
    mailbox: mpsc::Receiver<LedgerMessage>,

    metrics: Metrics,
}

impl LedgerActor {
    /// Wrap the shared chain and a receiving mailbox
    pub fn new(
        chain: Arc<RwLock<Blockchain>>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        metrics: Metrics,
    ) -> Self {
        Self {
            chain,
            mailbox,
            metrics,
        }
    }

    /// Serve the mailbox until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Append {
                    transaction,
                    response,
                } => {
                    let result = self.append(transaction).await;
                    if let Err(e) = &result {
                        tracing::error!("Ledger append failed: {}", e);
                    }
                    let _ = response.send(result);
                }
                LedgerMessage::Shutdown { response } => {
                    tracing::info!("Ledger actor shutting down");
                    let _ = response.send(());
                    break;
                }
            }
        }
    }

    async fn append(&mut self, transaction: LedgerTransaction) -> Result<LedgerBlock> {
        let tx_type = transaction.tx_type;
        let template = self.chain.read().next_template(transaction);

        let started = Instant::now();
        let sealed = tokio::task::spawn_blocking(move || template.seal())
            .await
            .map_err(|e| Error::Sealing(format!("mining task aborted: {}", e)))??;
        let elapsed = started.elapsed().as_secs_f64();

        self.chain.write().push(sealed.block.clone())?;
        self.metrics.record_block_sealed(sealed.attempts, elapsed);

        tracing::debug!(
            index = sealed.block.index,
            nonce = sealed.block.nonce,
            attempts = sealed.attempts,
            tx_type = %tx_type,
            "Sealed ledger block"
        );

        Ok(sealed.block)
    }
}

/// Cloneable front end of the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Wrap the sending half of the mailbox
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Queue a transaction and return without waiting for the seal
    ///
    /// The transaction holds its mailbox slot once this returns, so blocks
    /// follow the order in which `submit` calls completed. Waits only while
    /// the mailbox is full.
    pub async fn submit(&self, transaction: LedgerTransaction) -> Result<PendingBlock> {
        let permit = self
            .sender
            .reserve()
            .await
            .map_err(|_| Error::Concurrency("ledger writer has stopped".to_string()))?;

        let (tx, rx) = oneshot::channel();
        permit.send(LedgerMessage::Append {
            transaction,
            response: tx,
        });
        Ok(PendingBlock { reply: rx })
    }

    /// Seal and append a transaction, waiting for the sealed block
    pub async fn append(&self, transaction: LedgerTransaction) -> Result<LedgerBlock> {
        self.submit(transaction).await?.sealed().await
    }

    /// Drain queued appends and stop the actor
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("ledger writer has stopped".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("ledger writer dropped the reply".to_string()))
    }
}

/// A queued append whose block has not been sealed yet
#[derive(Debug)]
pub struct PendingBlock {
    reply: oneshot::Receiver<Result<LedgerBlock>>,
}

impl PendingBlock {
    /// Wait for the actor to seal and push the block
    pub async fn sealed(self) -> Result<LedgerBlock> {
        self.reply
            .await
            .map_err(|_| Error::Concurrency("ledger writer dropped the reply".to_string()))?
    }
}

/// Start the actor on the current runtime and return its handle
pub fn spawn_ledger_actor(
    chain: Arc<RwLock<Blockchain>>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(chain, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;
    use serde_json::json;

    fn genesis_chain(difficulty: u32) -> Arc<RwLock<Blockchain>> {
        let genesis = Blockchain::genesis_template(difficulty, "Genesis block")
            .seal()
            .unwrap()
            .block;
        Arc::new(RwLock::new(Blockchain::from_genesis(genesis).unwrap()))
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let handle = spawn_ledger_actor(genesis_chain(1), Metrics::new().unwrap(), 16);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_append() {
        let chain = genesis_chain(1);
        let metrics = Metrics::new().unwrap();
        let handle = spawn_ledger_actor(chain.clone(), metrics.clone(), 16);

        let block = handle
            .append(LedgerTransaction::new(
                TransactionType::VoteCast,
                json!({"voter": "a"}),
                "vote",
            ))
            .await
            .unwrap();

        assert_eq!(block.index, 1);
        assert!(block.hash.starts_with('0'));
        assert_eq!(chain.read().len(), 2);
        assert_eq!(metrics.blocks_total.get(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_appends_serialize() {
        let chain = genesis_chain(1);
        let handle = spawn_ledger_actor(chain.clone(), Metrics::new().unwrap(), 4);

        let mut tasks = Vec::new();
        for n in 0..20 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .append(LedgerTransaction::new(
                        TransactionType::VoteCast,
                        json!({ "n": n }),
                        "vote",
                    ))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let chain = chain.read();
        assert_eq!(chain.len(), 21);
        assert!(chain.verify().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submitted_appends_keep_submission_order() {
        let chain = genesis_chain(1);
        let handle = spawn_ledger_actor(chain.clone(), Metrics::new().unwrap(), 8);

        let mut pending = Vec::new();
        for n in 0..50 {
            let block = handle
                .submit(LedgerTransaction::new(
                    TransactionType::VoteCast,
                    json!({ "n": n }),
                    "vote",
                ))
                .await
                .unwrap();
            // Waiters race each other; the chain order must not
            pending.push(tokio::spawn(block.sealed()));
        }
        for waiter in pending {
            waiter.await.unwrap().unwrap();
        }

        let chain = chain.read();
        let order: Vec<u64> = chain
            .snapshot()
            .iter()
            .skip(1)
            .map(|b| b.transaction.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_append_after_shutdown_fails() {
        let handle = spawn_ledger_actor(genesis_chain(0), Metrics::new().unwrap(), 4);
        handle.shutdown().await.unwrap();

        // Give the actor task a moment to drop its receiver
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let result = handle
            .append(LedgerTransaction::new(TransactionType::VoteCast, json!({}), "late"))
            .await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }
}
