//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic hashing (canonical JSON for transactions, fixed-width timestamps)
//! - Export as plain JSON that can be re-verified without this crate
//! - Immutability once sealed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto;

/// Kind of event recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Synthetic transaction carried by block 0
    Genesis,
    /// A petition was created
    PetitionCreated,
    /// A vote was cast on a petition
    VoteCast,
}

impl TransactionType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Genesis => "genesis",
            TransactionType::PetitionCreated => "petition_created",
            TransactionType::VoteCast => "vote_cast",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tagged record embedded in exactly one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Event kind
    #[serde(rename = "type")]
    pub tx_type: TransactionType,

    /// Event data, opaque to the ledger
    pub payload: serde_json::Value,

    /// When the event happened
    pub timestamp: DateTime<Utc>,

    /// Human-readable summary
    pub description: String,
}

impl LedgerTransaction {
    /// Create a transaction stamped with the current time
    pub fn new(
        tx_type: TransactionType,
        payload: serde_json::Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            tx_type,
            payload,
            timestamp: Utc::now(),
            description: description.into(),
        }
    }

    /// Synthetic transaction for block 0
    pub fn genesis(description: impl Into<String>) -> Self {
        Self::new(TransactionType::Genesis, serde_json::Value::Null, description)
    }
}

/// A sealed, immutable link in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerBlock {
    /// Position in the chain (0 = genesis)
    pub index: u64,

    /// When the block was assembled
    pub timestamp: DateTime<Utc>,

    /// The recorded event
    pub transaction: LedgerTransaction,

    /// Hash of the previous block (empty for genesis)
    pub prev_hash: String,

    /// Hex-encoded SHA-256 of this block's contents
    pub hash: String,

    /// Proof-of-work counter
    pub nonce: u64,

    /// Leading zero hex characters required of `hash`
    pub difficulty: u32,
}

impl LedgerBlock {
    /// Recompute the hash from the stored fields
    pub fn compute_hash(&self) -> crate::Result<String> {
        let canonical = crypto::canonical_transaction(&self.transaction)?;
        Ok(crypto::block_digest(
            self.index,
            &self.timestamp,
            &canonical,
            &self.prev_hash,
            self.nonce,
            self.difficulty,
        ))
    }

    /// Whether the stored hash satisfies the stored difficulty
    pub fn meets_difficulty(&self) -> bool {
        crypto::meets_difficulty(&self.hash, self.difficulty)
    }

    /// Whether this is block 0
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

/// Read-only copy of the chain at one point in time
///
/// Iterating does not touch the live chain; the snapshot can be walked any
/// number of times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainSnapshot {
    blocks: Vec<LedgerBlock>,
}

impl ChainSnapshot {
    /// Wrap an ordered block sequence
    pub fn new(blocks: Vec<LedgerBlock>) -> Self {
        Self { blocks }
    }

    /// Blocks in chain order
    pub fn iter(&self) -> std::slice::Iter<'_, LedgerBlock> {
        self.blocks.iter()
    }

    /// Blocks as a slice
    pub fn blocks(&self) -> &[LedgerBlock] {
        &self.blocks
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True only for snapshots that were not taken from a live ledger
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Last block
    pub fn tail(&self) -> Option<&LedgerBlock> {
        self.blocks.last()
    }

    /// Re-verify hashes, difficulty and linkage
    pub fn verify(&self) -> crate::Result<()> {
        crypto::verify_chain(&self.blocks)
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Consume into the underlying blocks
    pub fn into_blocks(self) -> Vec<LedgerBlock> {
        self.blocks
    }
}

impl<'a> IntoIterator for &'a ChainSnapshot {
    type Item = &'a LedgerBlock;
    type IntoIter = std::slice::Iter<'a, LedgerBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

impl IntoIterator for ChainSnapshot {
    type Item = LedgerBlock;
    type IntoIter = std::vec::IntoIter<LedgerBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}
