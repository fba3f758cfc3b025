//! Petition Ledger Core
//!
//! Append-only, hash-chained audit log sealed with proof-of-work.
//!
//! # Architecture
//!
//! - **Hash chaining**: every block commits to its predecessor's hash
//! - **Single Writer**: one actor task performs every append
//! - **Proof-of-work seal**: block hashes carry `difficulty` leading zero hex digits
//! - **Snapshots**: readers get detached copies, never the live chain
//!
//! # Invariants
//!
//! - `chain[i].prev_hash == chain[i-1].hash` for all `i > 0`
//! - Recomputing a block's hash from its fields reproduces the stored hash
//! - Blocks are never modified or removed
//! - The chain always contains at least the genesis block

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod types;

// Re-exports
pub use actor::PendingBlock;
pub use config::Config;
pub use crypto::verify_chain;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use types::{ChainSnapshot, LedgerBlock, LedgerTransaction, TransactionType};
