//! Persistence contract for petitions and votes
//!
//! The coordinator only talks to [`PetitionStore`]. [`PgPetitionStore`] is the
//! production implementation; [`MemoryPetitionStore`] backs the tests.

pub mod memory;
pub mod postgres;

pub use memory::MemoryPetitionStore;
pub use postgres::{create_pool, DbPool, PgPetitionStore};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::errors::StoreResult;
use crate::models::{Petition, PetitionVote, VoteType};

/// Writes available inside an open vote transaction
#[async_trait]
pub trait VoteTransaction: Send {
    /// Add one vote to the petition's tally
    ///
    /// Fails with `GoalReached` when the petition already has `goal` votes
    /// and with `NotFound` when it is missing or deleted.
    async fn increment_tally(&mut self, petition_id: Uuid, vote_type: VoteType)
        -> StoreResult<()>;
}

/// Work run after the vote row is inserted and before commit
pub type TallyCallback =
    Box<dyn for<'t> FnOnce(&'t mut dyn VoteTransaction) -> BoxFuture<'t, StoreResult<()>> + Send>;

/// Box a closure as a [`TallyCallback`]
pub fn tally_callback<F>(callback: F) -> TallyCallback
where
    F: for<'t> FnOnce(&'t mut dyn VoteTransaction) -> BoxFuture<'t, StoreResult<()>>
        + Send
        + 'static,
{
    Box::new(callback)
}

#[async_trait]
pub trait PetitionStore: Send + Sync {
    async fn create(&self, petition: &Petition) -> StoreResult<Petition>;

    /// Live (not deleted) petition by id
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Petition>;

    /// Live petitions, newest first; `limit: None` returns everything from `offset`
    async fn get_all_paginated(&self, limit: Option<i64>, offset: i64)
        -> StoreResult<Vec<Petition>>;

    async fn has_voted(&self, voter_id: Uuid, petition_id: Uuid) -> StoreResult<bool>;

    async fn vote_in_favor(&self, petition_id: Uuid) -> StoreResult<()>;

    async fn vote_against(&self, petition_id: Uuid) -> StoreResult<()>;

    /// Soft delete
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Insert `vote` and run `callback` in one transaction
    ///
    /// A second vote for the same `(voter_id, petition_id)` fails with
    /// `DuplicateVote`. If the callback fails, nothing is committed.
    async fn vote_with_transaction(
        &self,
        vote: PetitionVote,
        callback: TallyCallback,
    ) -> StoreResult<PetitionVote>;
}
