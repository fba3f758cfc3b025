//! Audit ledger seam
//!
//! The coordinator appends through [`AuditLedger`] so tests can swap in a
//! ledger that fails or stalls. Appends are split in two: `submit` fixes the
//! block's position, `PendingBlock::sealed` waits for the proof-of-work.

use async_trait::async_trait;
use ledger_core::{
    ChainSnapshot, Ledger, LedgerBlock, LedgerTransaction, PendingBlock, TransactionType,
};
use serde_json::json;

use crate::models::{Petition, PetitionVote};

#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Reserve the next position on the chain for `transaction`
    async fn submit(&self, transaction: LedgerTransaction) -> ledger_core::Result<PendingBlock>;

    async fn append(&self, transaction: LedgerTransaction) -> ledger_core::Result<LedgerBlock> {
        self.submit(transaction).await?.sealed().await
    }

    fn snapshot(&self) -> ChainSnapshot;
}

#[async_trait]
impl AuditLedger for Ledger {
    async fn submit(&self, transaction: LedgerTransaction) -> ledger_core::Result<PendingBlock> {
        Ledger::submit(self, transaction).await
    }

    fn snapshot(&self) -> ChainSnapshot {
        Ledger::snapshot(self)
    }
}

pub fn vote_cast(vote: &PetitionVote) -> LedgerTransaction {
    LedgerTransaction::new(
        TransactionType::VoteCast,
        json!({
            "vote_id": vote.id,
            "voter_id": vote.voter_id,
            "petition_id": vote.petition_id,
            "vote_type": vote.vote_type,
        }),
        format!("{} vote on petition {}", vote.vote_type, vote.petition_id),
    )
}

pub fn petition_created(petition: &Petition) -> LedgerTransaction {
    LedgerTransaction::new(
        TransactionType::PetitionCreated,
        json!({
            "petition_id": petition.id,
            "owner_id": petition.owner_id,
            "title": petition.title,
            "goal": petition.goal,
            "voting_deadline": petition.voting_deadline,
        }),
        format!("Petition {} created", petition.id),
    )
}
