//! Prometheus metrics for the vote path
//!
//! - `petition_votes_total{outcome}` - vote attempts by result
//! - `petition_degraded_writes_total{effect}` - post-commit side effects that failed

use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::Arc;

use crate::errors::PetitionError;

#[derive(Clone, Debug)]
pub struct ServiceMetrics {
    pub votes_total: IntCounterVec,
    pub degraded_writes: IntCounterVec,
    pub registry: Arc<Registry>,
}

impl ServiceMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let votes_total = IntCounterVec::new(
            Opts::new("petition_votes_total", "Vote attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(votes_total.clone()))?;

        let degraded_writes = IntCounterVec::new(
            Opts::new(
                "petition_degraded_writes_total",
                "Committed writes whose side effects failed",
            ),
            &["effect"],
        )?;
        registry.register(Box::new(degraded_writes.clone()))?;

        Ok(Self {
            votes_total,
            degraded_writes,
            registry,
        })
    }

    pub fn record_vote<T>(&self, result: &Result<T, PetitionError>) {
        let outcome = match result {
            Ok(_) => "accepted",
            Err(PetitionError::AlreadyVoted) => "already_voted",
            Err(PetitionError::VotingClosed) => "voting_closed",
            Err(PetitionError::GoalReached) => "goal_reached",
            Err(PetitionError::NotFound) => "not_found",
            Err(PetitionError::InvalidVoteType(_)) | Err(PetitionError::Validation(_)) => "invalid",
            Err(PetitionError::Store(_)) => "store_failure",
        };
        self.votes_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_degraded(&self, effect: &str) {
        self.degraded_writes.with_label_values(&[effect]).inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
