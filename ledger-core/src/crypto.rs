//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - Canonical serialization of transactions (sorted keys, no whitespace)
//! - SHA-256 block digests over the concatenated block fields
//! - Proof-of-work sealing by nonce search
//! - Whole-chain verification

use crate::types::{LedgerBlock, LedgerTransaction};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a transaction deterministically
///
/// Object keys are emitted in sorted order at every depth, independent of
/// how the payload was built.
pub fn canonical_transaction(transaction: &LedgerTransaction) -> Result<String> {
    let value = serde_json::to_value(transaction)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Fixed-width timestamp used in block digests (RFC 3339, nanoseconds, `Z`)
pub fn digest_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Everything hashed ahead of the nonce
fn header_prefix(
    index: u64,
    timestamp: &DateTime<Utc>,
    canonical_transaction: &str,
    prev_hash: &str,
) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string().as_bytes());
    hasher.update(digest_timestamp(timestamp).as_bytes());
    hasher.update(canonical_transaction.as_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher
}

fn finish(mut hasher: Sha256, nonce: u64, difficulty: u32) -> String {
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(difficulty.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// `H(index ‖ timestamp ‖ transaction ‖ prevHash ‖ nonce ‖ difficulty)`, hex-encoded
pub fn block_digest(
    index: u64,
    timestamp: &DateTime<Utc>,
    canonical_transaction: &str,
    prev_hash: &str,
    nonce: u64,
    difficulty: u32,
) -> String {
    let prefix = header_prefix(index, timestamp, canonical_transaction, prev_hash);
    finish(prefix, nonce, difficulty)
}

/// Whether the first `difficulty` hex characters of `hash` are all `'0'`
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// An assembled block waiting for its nonce
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Position in the chain
    pub index: u64,
    /// Assembly time
    pub timestamp: DateTime<Utc>,
    /// Transaction to embed
    pub transaction: LedgerTransaction,
    /// Hash of the current tail
    pub prev_hash: String,
    /// Required leading zeros
    pub difficulty: u32,
}

/// Result of a successful nonce search
#[derive(Debug, Clone)]
pub struct Sealed {
    /// The finished block
    pub block: LedgerBlock,
    /// Number of digests computed
    pub attempts: u64,
}

impl BlockTemplate {
    /// Search nonces from zero upward until the digest meets the difficulty
    ///
    /// CPU-bound; callers on an async runtime should run this on a blocking
    /// thread.
    pub fn seal(self) -> Result<Sealed> {
        let canonical = canonical_transaction(&self.transaction)?;
        let prefix = header_prefix(self.index, &self.timestamp, &canonical, &self.prev_hash);

        let mut nonce: u64 = 0;
        loop {
            let hash = finish(prefix.clone(), nonce, self.difficulty);
            if meets_difficulty(&hash, self.difficulty) {
                return Ok(Sealed {
                    block: LedgerBlock {
                        index: self.index,
                        timestamp: self.timestamp,
                        transaction: self.transaction,
                        prev_hash: self.prev_hash,
                        hash,
                        nonce,
                        difficulty: self.difficulty,
                    },
                    attempts: nonce + 1,
                });
            }
            nonce = nonce
                .checked_add(1)
                .ok_or_else(|| Error::Sealing("nonce space exhausted".to_string()))?;
        }
    }
}

/// Verify an ordered block sequence
///
/// Checks, for every block: its index equals its position, the stored hash
/// matches a recomputation from the stored fields, the hash meets the stored
/// difficulty, and `prev_hash` equals the previous block's hash (empty for
/// genesis).
pub fn verify_chain(blocks: &[LedgerBlock]) -> Result<()> {
    if blocks.is_empty() {
        return Err(Error::integrity(0, "chain is empty"));
    }

    let mut expected_prev = String::new();
    for (position, block) in blocks.iter().enumerate() {
        let position = position as u64;
        if block.index != position {
            return Err(Error::integrity(
                position,
                format!("index {} out of sequence", block.index),
            ));
        }
        if block.prev_hash != expected_prev {
            return Err(Error::integrity(position, "previous hash does not link"));
        }
        let recomputed = block.compute_hash()?;
        if recomputed != block.hash {
            return Err(Error::integrity(position, "stored hash does not match contents"));
        }
        if !block.meets_difficulty() {
            return Err(Error::integrity(
                position,
                format!("hash does not meet difficulty {}", block.difficulty),
            ));
        }
        expected_prev = block.hash.clone();
    }

    Ok(())
}
