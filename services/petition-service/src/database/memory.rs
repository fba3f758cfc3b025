//! In-memory petition store
//!
//! Transactions hold the store lock from the vote insert through commit, so
//! concurrent votes are serialized the way row locks serialize them in
//! Postgres. The callback works on staged copies of the petitions it touches;
//! they and the vote row reach the live state only when it succeeds.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PetitionStore, TallyCallback, VoteTransaction};
use crate::errors::{StoreError, StoreResult};
use crate::models::{Petition, PetitionVote, VoteType};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    petitions: HashMap<Uuid, Petition>,
    votes: HashMap<(Uuid, Uuid), PetitionVote>,
}

fn add_vote(petition: &mut Petition, vote_type: VoteType) -> StoreResult<()> {
    if petition.goal_reached() {
        return Err(StoreError::GoalReached);
    }
    match vote_type {
        VoteType::Favor => petition.votes_in_favor += 1,
        VoteType::Against => petition.votes_against += 1,
    }
    petition.updated_at = Utc::now();
    Ok(())
}

impl MemoryState {
    fn live(&self, petition_id: Uuid) -> StoreResult<&Petition> {
        self.petitions
            .get(&petition_id)
            .filter(|p| !p.is_deleted())
            .ok_or(StoreError::NotFound)
    }

    fn live_mut(&mut self, petition_id: Uuid) -> StoreResult<&mut Petition> {
        self.petitions
            .get_mut(&petition_id)
            .filter(|p| !p.is_deleted())
            .ok_or(StoreError::NotFound)
    }

    fn increment(&mut self, petition_id: Uuid, vote_type: VoteType) -> StoreResult<()> {
        add_vote(self.live_mut(petition_id)?, vote_type)
    }
}

struct MemoryVoteTransaction<'a> {
    live: &'a MemoryState,
    /// Staged copies, keyed by petition id
    touched: HashMap<Uuid, Petition>,
}

impl MemoryVoteTransaction<'_> {
    fn staged_mut(&mut self, petition_id: Uuid) -> StoreResult<&mut Petition> {
        match self.touched.entry(petition_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(self.live.live(petition_id)?.clone())),
        }
    }
}

#[async_trait]
impl VoteTransaction for MemoryVoteTransaction<'_> {
    async fn increment_tally(
        &mut self,
        petition_id: Uuid,
        vote_type: VoteType,
    ) -> StoreResult<()> {
        add_vote(self.staged_mut(petition_id)?, vote_type)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPetitionStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryPetitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a petition as-is, bypassing creation rules
    pub async fn seed(&self, petition: Petition) {
        self.state.lock().await.petitions.insert(petition.id, petition);
    }

    /// Every committed vote for `petition_id`
    pub async fn votes_for(&self, petition_id: Uuid) -> Vec<PetitionVote> {
        self.state
            .lock()
            .await
            .votes
            .values()
            .filter(|v| v.petition_id == petition_id)
            .cloned()
            .collect()
    }

    /// Petition including soft-deleted ones
    pub async fn raw(&self, petition_id: Uuid) -> Option<Petition> {
        self.state.lock().await.petitions.get(&petition_id).cloned()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PetitionStore for MemoryPetitionStore {
    async fn create(&self, petition: &Petition) -> StoreResult<Petition> {
        self.check_available()?;
        self.state
            .lock()
            .await
            .petitions
            .insert(petition.id, petition.clone());
        Ok(petition.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Petition> {
        self.check_available()?;
        self.state
            .lock()
            .await
            .petitions
            .get(&id)
            .filter(|p| !p.is_deleted())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_all_paginated(
        &self,
        limit: Option<i64>,
        offset: i64,
    ) -> StoreResult<Vec<Petition>> {
        self.check_available()?;
        let state = self.state.lock().await;

        let mut live: Vec<Petition> = state
            .petitions
            .values()
            .filter(|p| !p.is_deleted())
            .cloned()
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let skip = usize::try_from(offset).unwrap_or(0);
        let take = limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);

        Ok(live.into_iter().skip(skip).take(take).collect())
    }

    async fn has_voted(&self, voter_id: Uuid, petition_id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .votes
            .contains_key(&(voter_id, petition_id)))
    }

    async fn vote_in_favor(&self, petition_id: Uuid) -> StoreResult<()> {
        self.check_available()?;
        self.state.lock().await.increment(petition_id, VoteType::Favor)
    }

    async fn vote_against(&self, petition_id: Uuid) -> StoreResult<()> {
        self.check_available()?;
        self.state.lock().await.increment(petition_id, VoteType::Against)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let petition = state.live_mut(id)?;
        let now = Utc::now();
        petition.deleted_at = Some(now);
        petition.updated_at = now;
        Ok(())
    }

    async fn vote_with_transaction(
        &self,
        vote: PetitionVote,
        callback: TallyCallback,
    ) -> StoreResult<PetitionVote> {
        self.check_available()?;
        let mut live = self.state.lock().await;

        let key = (vote.voter_id, vote.petition_id);
        if live.votes.contains_key(&key) {
            return Err(StoreError::DuplicateVote);
        }
        if !live.petitions.contains_key(&vote.petition_id) {
            return Err(StoreError::NotFound);
        }

        let mut scope = MemoryVoteTransaction {
            live: &*live,
            touched: HashMap::new(),
        };
        callback(&mut scope).await?;
        let touched = scope.touched;

        live.petitions.extend(touched);
        live.votes.insert(key, vote.clone());
        Ok(vote)
    }
}
