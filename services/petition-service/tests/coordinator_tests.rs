//! End-to-end coordinator behaviour against in-memory collaborators
//!
//! Covers vote uniqueness under concurrency, the tally/goal invariant, deadline
//! enforcement, cache invalidation, and isolation of ledger, cache and indexer
//! failures from the caller's result.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ledger_core::{
    ChainSnapshot, Config as LedgerConfig, Ledger, LedgerTransaction, PendingBlock, TransactionType,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use petition_service::audit::{AuditLevel, RecordingAuditSink};
use petition_service::cache::{keys, MemoryCacheClient, PetitionCache};
use petition_service::config::{AppendMode, CacheConfig};
use petition_service::database::{MemoryPetitionStore, PetitionStore};
use petition_service::ledger::AuditLedger;
use petition_service::metrics::ServiceMetrics;
use petition_service::search::RecordingIndexer;
use petition_service::{
    CoordinatorSettings, Dependencies, ErrorKind, NewPetition, Petition, PetitionError,
    VoteCoordinator,
};

/// Ledger whose appends always fail
struct FailingLedger;

#[async_trait]
impl AuditLedger for FailingLedger {
    async fn submit(&self, _transaction: LedgerTransaction) -> ledger_core::Result<PendingBlock> {
        Err(ledger_core::Error::Concurrency("ledger offline".to_string()))
    }

    fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot::new(Vec::new())
    }
}

struct Harness {
    coordinator: Arc<VoteCoordinator>,
    store: Arc<MemoryPetitionStore>,
    cache: Arc<MemoryCacheClient>,
    indexer: Arc<RecordingIndexer>,
    audit: Arc<RecordingAuditSink>,
    metrics: ServiceMetrics,
}

fn inline_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        append_mode: AppendMode::Inline,
        ..CoordinatorSettings::default()
    }
}

fn build(ledger: Arc<dyn AuditLedger>, settings: CoordinatorSettings) -> Harness {
    let store = Arc::new(MemoryPetitionStore::new());
    let cache = Arc::new(MemoryCacheClient::new());
    let indexer = Arc::new(RecordingIndexer::new());
    let audit = Arc::new(RecordingAuditSink::new());
    let metrics = ServiceMetrics::new().unwrap();

    let coordinator = VoteCoordinator::new(
        Dependencies {
            store: store.clone(),
            cache: PetitionCache::new(cache.clone(), CacheConfig::default()),
            ledger,
            indexer: indexer.clone(),
            audit: audit.clone(),
            metrics: metrics.clone(),
        },
        settings,
    );

    Harness {
        coordinator: Arc::new(coordinator),
        store,
        cache,
        indexer,
        audit,
        metrics,
    }
}

async fn harness_with(settings: CoordinatorSettings) -> Harness {
    let ledger = Ledger::initialize(LedgerConfig::with_difficulty(1)).await.unwrap();
    build(Arc::new(ledger), settings)
}

async fn harness() -> Harness {
    harness_with(inline_settings()).await
}

fn new_petition(goal: i64) -> NewPetition {
    NewPetition {
        owner_id: Uuid::new_v4(),
        title: "Keep the library open".to_string(),
        description: "Weekend hours for the east branch".to_string(),
        goal,
        voting_deadline: Utc::now() + ChronoDuration::hours(1),
    }
}

async fn tally(h: &Harness, id: Uuid) -> (i64, i64) {
    let p = h.store.get_by_id(id).await.unwrap();
    (p.votes_in_favor, p.votes_against)
}

// ============================================================================
// VOTING RULES
// ============================================================================

#[tokio::test]
async fn test_double_vote_rejected_and_tally_unchanged() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(10)).await.unwrap();
    let user_a = Uuid::new_v4();

    h.coordinator.vote(user_a, p.id, "favor").await.unwrap();
    assert_eq!(tally(&h, p.id).await, (1, 0));

    let second = h.coordinator.vote(user_a, p.id, "against").await;
    assert!(matches!(second, Err(PetitionError::AlreadyVoted)));
    assert_eq!(tally(&h, p.id).await, (1, 0));
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_transaction_rejects_duplicate_without_preflight() {
    let h = harness_with(CoordinatorSettings {
        preflight_vote_check: false,
        ..inline_settings()
    })
    .await;
    let p = h.coordinator.create_petition(new_petition(10)).await.unwrap();
    let user = Uuid::new_v4();

    h.coordinator.vote(user, p.id, "favor").await.unwrap();
    let second = h.coordinator.vote(user, p.id, "favor").await;

    assert!(matches!(second, Err(PetitionError::AlreadyVoted)));
    assert_eq!(h.store.votes_for(p.id).await.len(), 1);
}

#[tokio::test]
async fn test_goal_reached_blocks_further_votes() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(1)).await.unwrap();

    h.coordinator.vote(Uuid::new_v4(), p.id, "favor").await.unwrap();
    assert_eq!(tally(&h, p.id).await, (1, 0));

    let result = h.coordinator.vote(Uuid::new_v4(), p.id, "against").await;
    assert!(matches!(result, Err(PetitionError::GoalReached)));
    assert_eq!(tally(&h, p.id).await, (1, 0));
}

#[tokio::test]
async fn test_vote_after_deadline_is_closed() {
    let h = harness().await;
    let mut p = Petition::from_request(new_petition(100));
    p.voting_deadline = Utc::now() - ChronoDuration::seconds(1);
    h.store.seed(p.clone()).await;

    let result = h.coordinator.vote(Uuid::new_v4(), p.id, "favor").await;

    assert!(matches!(result, Err(PetitionError::VotingClosed)));
    assert_eq!(tally(&h, p.id).await, (0, 0));
}

#[tokio::test]
async fn test_vote_type_checked_before_deadline() {
    let h = harness().await;
    let mut p = Petition::from_request(new_petition(100));
    p.voting_deadline = Utc::now() - ChronoDuration::hours(1);
    h.store.seed(p.clone()).await;

    let result = h.coordinator.vote(Uuid::new_v4(), p.id, "maybe").await;

    assert!(matches!(result, Err(PetitionError::InvalidVoteType(ref v)) if v == "maybe"));
}

#[tokio::test]
async fn test_vote_on_missing_petition() {
    let h = harness().await;

    let result = h.coordinator.vote(Uuid::new_v4(), Uuid::new_v4(), "favor").await;

    assert!(matches!(result, Err(PetitionError::NotFound)));
    assert_eq!(h.metrics.votes_total.with_label_values(&["not_found"]).get(), 1);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_votes_by_one_user_succeed_once() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(100)).await.unwrap();
    let user = Uuid::new_v4();
    let petition_id = p.id;

    let mut tasks = Vec::new();
    for n in 0..16 {
        let coordinator = h.coordinator.clone();
        let vote_type = if n % 2 == 0 { "favor" } else { "against" };
        tasks.push(tokio::spawn(async move {
            coordinator.vote(user, petition_id, vote_type).await
        }));
    }

    let mut accepted = 0;
    let mut already_voted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(PetitionError::AlreadyVoted) => already_voted += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(already_voted, 15);
    assert_eq!(h.store.votes_for(p.id).await.len(), 1);
    let (favor, against) = tally(&h, p.id).await;
    assert_eq!(favor + against, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_voters_never_exceed_goal() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(5)).await.unwrap();
    let petition_id = p.id;

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let coordinator = h.coordinator.clone();
        tasks.push(tokio::spawn(async move {
            coordinator.vote(Uuid::new_v4(), petition_id, "favor").await
        }));
    }

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(PetitionError::GoalReached) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(accepted, 5);
    let stored = h.store.get_by_id(p.id).await.unwrap();
    assert_eq!(stored.total_votes(), 5);
    assert_eq!(h.store.votes_for(p.id).await.len() as i64, stored.total_votes());
}

// ============================================================================
// LEDGER
// ============================================================================

#[tokio::test]
async fn test_create_and_vote_are_sealed_on_ledger() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(3)).await.unwrap();
    let vote = h.coordinator.vote(Uuid::new_v4(), p.id, "against").await.unwrap();

    let snapshot = h.coordinator.ledger_snapshot();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.verify().is_ok());

    let blocks = snapshot.blocks();
    assert_eq!(blocks[1].transaction.tx_type, TransactionType::PetitionCreated);
    assert_eq!(blocks[2].transaction.tx_type, TransactionType::VoteCast);
    assert_eq!(blocks[2].transaction.payload["vote_id"], vote.id.to_string());
    assert_eq!(blocks[2].prev_hash, blocks[1].hash);
}

#[tokio::test]
async fn test_background_appends_land_after_flush() {
    let h = harness_with(CoordinatorSettings {
        append_mode: AppendMode::Background,
        ..CoordinatorSettings::default()
    })
    .await;
    let p = h.coordinator.create_petition(new_petition(3)).await.unwrap();
    h.coordinator.vote(Uuid::new_v4(), p.id, "favor").await.unwrap();

    h.coordinator.flush().await;

    let snapshot = h.coordinator.ledger_snapshot();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.verify().is_ok());

    let blocks = snapshot.blocks();
    assert_eq!(blocks[1].transaction.tx_type, TransactionType::PetitionCreated);
    assert_eq!(blocks[2].transaction.tx_type, TransactionType::VoteCast);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_background_ledger_records_creation_before_votes() {
    let h = harness_with(CoordinatorSettings {
        append_mode: AppendMode::Background,
        ..CoordinatorSettings::default()
    })
    .await;

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let coordinator = h.coordinator.clone();
        tasks.push(tokio::spawn(async move {
            let p = coordinator.create_petition(new_petition(3)).await.unwrap();
            coordinator.vote(Uuid::new_v4(), p.id, "favor").await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    h.coordinator.flush().await;

    let snapshot = h.coordinator.ledger_snapshot();
    assert_eq!(snapshot.len(), 101);
    assert!(snapshot.verify().is_ok());

    let mut created = std::collections::HashSet::new();
    for block in snapshot.iter().skip(1) {
        let petition_id = block.transaction.payload["petition_id"].as_str().unwrap().to_string();
        match block.transaction.tx_type {
            TransactionType::PetitionCreated => {
                created.insert(petition_id);
            }
            TransactionType::VoteCast => assert!(
                created.contains(&petition_id),
                "vote on {} sealed before its petition",
                petition_id
            ),
            other => panic!("unexpected {:?} block", other),
        }
    }
    assert_eq!(created.len(), 50);
}

#[tokio::test]
async fn test_ledger_failure_does_not_fail_vote() {
    let h = build(Arc::new(FailingLedger), inline_settings());
    let p = h.coordinator.create_petition(new_petition(10)).await.unwrap();
    let user = Uuid::new_v4();

    let vote = h.coordinator.vote(user, p.id, "favor").await;

    assert!(vote.is_ok());
    assert_eq!(tally(&h, p.id).await, (1, 0));
    assert!(h.store.has_voted(user, p.id).await.unwrap());
    assert!(h.audit.contains(AuditLevel::Warn, "ledger append"));
    // one for the creation, one for the vote
    assert_eq!(h.metrics.degraded_writes.with_label_values(&["ledger"]).get(), 2);
}

#[tokio::test]
async fn test_store_failure_is_fatal_and_skips_ledger() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(10)).await.unwrap();
    let before = h.coordinator.ledger_snapshot().len();

    h.store.set_unavailable(true);
    let result = h.coordinator.vote(Uuid::new_v4(), p.id, "favor").await;

    assert!(matches!(result, Err(PetitionError::Store(_))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Internal);
    assert_eq!(h.coordinator.ledger_snapshot().len(), before);
    assert!(h.audit.contains(AuditLevel::Error, "vote rejected"));
}

// ============================================================================
// CACHE
// ============================================================================

#[tokio::test]
async fn test_listing_cache_invalidated_by_creation() {
    let h = harness().await;
    h.coordinator.create_petition(new_petition(5)).await.unwrap();

    let first = h.coordinator.get_all_petitions(None, None).await.unwrap();
    assert_eq!(first.len(), 1);
    assert!(h.cache.keys().contains(&keys::LISTING.to_string()));

    // served from cache
    h.coordinator.get_all_petitions(None, None).await.unwrap();
    assert_eq!(h.coordinator.cache_metrics().await.hits, 1);

    h.coordinator.create_petition(new_petition(5)).await.unwrap();
    assert!(!h.cache.keys().contains(&keys::LISTING.to_string()));

    let second = h.coordinator.get_all_petitions(None, None).await.unwrap();
    assert_eq!(second.len(), 2);
}

#[tokio::test]
async fn test_vote_invalidates_page_and_petition_keys() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(5)).await.unwrap();

    let page = h.coordinator.get_all_petitions(Some(10), Some(0)).await.unwrap();
    let single = h.coordinator.get_petition_by_id(p.id).await.unwrap();
    assert_eq!(page[0].votes_in_favor, 0);
    assert_eq!(single.votes_in_favor, 0);
    assert_eq!(
        h.cache.keys(),
        vec![keys::petition(p.id), keys::page(1, 10)]
    );

    h.coordinator.vote(Uuid::new_v4(), p.id, "favor").await.unwrap();
    assert!(h.cache.keys().is_empty());

    let page = h.coordinator.get_all_petitions(Some(10), Some(0)).await.unwrap();
    let single = h.coordinator.get_petition_by_id(p.id).await.unwrap();
    assert_eq!(page[0].votes_in_favor, 1);
    assert_eq!(single.votes_in_favor, 1);
}

#[tokio::test]
async fn test_unaligned_offset_bypasses_page_cache() {
    let h = harness().await;
    for _ in 0..3 {
        h.coordinator.create_petition(new_petition(5)).await.unwrap();
    }

    let window = h.coordinator.get_all_petitions(Some(2), Some(1)).await.unwrap();

    assert_eq!(window.len(), 2);
    assert!(h.cache.keys().is_empty());
}

#[tokio::test]
async fn test_cache_outage_degrades_to_store() {
    let h = harness().await;
    h.cache.set_unavailable(true);

    let p = h.coordinator.create_petition(new_petition(5)).await.unwrap();
    h.coordinator.vote(Uuid::new_v4(), p.id, "against").await.unwrap();

    let listed = h.coordinator.get_all_petitions(None, None).await.unwrap();
    let fetched = h.coordinator.get_petition_by_id(p.id).await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(fetched.votes_against, 1);
    assert!(h.audit.contains(AuditLevel::Warn, "invalidating listings failed"));
    assert!(h.metrics.degraded_writes.with_label_values(&["cache"]).get() >= 3);
}

// ============================================================================
// DELETION
// ============================================================================

#[tokio::test]
async fn test_delete_hides_petition_everywhere() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(5)).await.unwrap();
    h.coordinator.get_petition_by_id(p.id).await.unwrap();
    h.coordinator.get_all_petitions(None, None).await.unwrap();

    h.coordinator.delete_petition(p.id).await.unwrap();

    assert!(matches!(
        h.coordinator.get_petition_by_id(p.id).await,
        Err(PetitionError::NotFound)
    ));
    assert!(h.coordinator.get_all_petitions(None, None).await.unwrap().is_empty());
    assert!(matches!(
        h.coordinator.vote(Uuid::new_v4(), p.id, "favor").await,
        Err(PetitionError::NotFound)
    ));
    assert!(matches!(
        h.coordinator.delete_petition(p.id).await,
        Err(PetitionError::NotFound)
    ));
}

// ============================================================================
// CREATION AND INDEXING
// ============================================================================

#[tokio::test]
async fn test_invalid_petition_is_not_stored() {
    let h = harness().await;
    let mut request = new_petition(5);
    request.title = String::new();

    let result = h.coordinator.create_petition(request).await;

    assert!(matches!(result, Err(PetitionError::Validation(_))));
    assert!(h.store.get_all_paginated(None, 0).await.unwrap().is_empty());
    assert_eq!(h.coordinator.ledger_snapshot().len(), 1);
}

#[tokio::test]
async fn test_created_petition_is_indexed() {
    let h = harness().await;
    let p = h.coordinator.create_petition(new_petition(5)).await.unwrap();

    h.coordinator.flush().await;

    let documents = h.indexer.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].0, p.id);
    assert_eq!(documents[0].1.title, p.title);
}

#[tokio::test]
async fn test_indexer_failure_is_degraded_write() {
    let h = harness().await;
    h.indexer.set_failing(true);

    let result = h.coordinator.create_petition(new_petition(5)).await;
    h.coordinator.flush().await;

    assert!(result.is_ok());
    assert!(h.audit.contains(AuditLevel::Warn, "indexing petition"));
    assert_eq!(h.metrics.degraded_writes.with_label_values(&["index"]).get(), 1);
}

#[tokio::test]
async fn test_slow_indexer_times_out() {
    let h = harness_with(CoordinatorSettings {
        index_timeout: Duration::from_millis(20),
        ..inline_settings()
    })
    .await;
    h.indexer.set_latency(Duration::from_millis(300));

    h.coordinator.create_petition(new_petition(5)).await.unwrap();
    h.coordinator.flush().await;

    assert!(h.indexer.documents().is_empty());
    assert!(h.audit.contains(AuditLevel::Warn, "timed out"));
}
