//! In-memory chain state
//!
//! `Blockchain` is plain data plus the append rules. Only the append actor
//! holds it mutably; everyone else reads through [`crate::Ledger::snapshot`].

use crate::crypto::{self, BlockTemplate};
use crate::types::{ChainSnapshot, LedgerBlock, LedgerTransaction};
use crate::{Error, Result};
use chrono::Utc;

/// Ordered blocks plus the configured difficulty
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<LedgerBlock>,
    difficulty: u32,
}

impl Blockchain {
    /// Start a chain from an already sealed genesis block
    pub fn from_genesis(genesis: LedgerBlock) -> Result<Self> {
        if !genesis.is_genesis() || !genesis.prev_hash.is_empty() {
            return Err(Error::integrity(genesis.index, "not a genesis block"));
        }
        let difficulty = genesis.difficulty;
        crypto::verify_chain(std::slice::from_ref(&genesis))?;

        Ok(Self {
            blocks: vec![genesis],
            difficulty,
        })
    }

    /// Genesis template for the given difficulty
    pub fn genesis_template(difficulty: u32, description: &str) -> BlockTemplate {
        BlockTemplate {
            index: 0,
            timestamp: Utc::now(),
            transaction: LedgerTransaction::genesis(description),
            prev_hash: String::new(),
            difficulty,
        }
    }

    /// Template for the block that would follow the current tail
    pub fn next_template(&self, transaction: LedgerTransaction) -> BlockTemplate {
        let tail = self.tail();
        BlockTemplate {
            index: tail.index + 1,
            timestamp: Utc::now(),
            transaction,
            prev_hash: tail.hash.clone(),
            difficulty: self.difficulty,
        }
    }

    /// Append a sealed block, refusing anything that does not extend the tail
    pub fn push(&mut self, block: LedgerBlock) -> Result<()> {
        let tail = self.tail();
        if block.index != tail.index + 1 {
            return Err(Error::integrity(
                block.index,
                format!("expected index {}", tail.index + 1),
            ));
        }
        if block.prev_hash != tail.hash {
            return Err(Error::integrity(block.index, "previous hash does not link to tail"));
        }
        if block.compute_hash()? != block.hash || !block.meets_difficulty() {
            return Err(Error::integrity(block.index, "block is not properly sealed"));
        }

        self.blocks.push(block);
        Ok(())
    }

    /// Last block; the chain always has at least genesis
    pub fn tail(&self) -> &LedgerBlock {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true for a constructed chain
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Configured difficulty
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Copy the blocks out
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot::new(self.blocks.clone())
    }

    /// Verify the whole chain
    pub fn verify(&self) -> Result<()> {
        crypto::verify_chain(&self.blocks)
    }
}
