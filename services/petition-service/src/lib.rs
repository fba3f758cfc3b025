// Petition Service Library
// Vote coordination over a transactional store, a read-through cache,
// a search indexer and a proof-of-work audit ledger

pub mod audit;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod errors;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod search;

// Re-exports
pub use coordinator::{CoordinatorSettings, Dependencies, VoteCoordinator};
pub use errors::{ErrorKind, PetitionError, Result, StoreError};
pub use models::*;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVICE_NAME: &str = "petition-service";
