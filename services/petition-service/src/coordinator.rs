//! Vote coordinator
//!
//! The single orchestration point for petition creation, voting and deletion.
//! The store alone decides whether an operation happened. Once it has, the
//! cache, the search index and the audit ledger are brought up to date; a
//! failure in any of them is reported as a degraded write and never changes
//! the caller's result.
//!
//! # Vote state machine
//!
//! ```text
//! Validating ──► Committing ──► PostCommit ──► Success
//!     │              │
//!     ▼              ▼
//!  rejected    AlreadyVoted / GoalReached / Store
//! ```

use chrono::Utc;
use ledger_core::{ChainSnapshot, LedgerTransaction};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditLevel, AuditSink};
use crate::cache::{keys, CacheMetrics, PetitionCache};
use crate::config::{AppendMode, Config, PaginationConfig};
use crate::database::{tally_callback, PetitionStore};
use crate::errors::{ErrorKind, PetitionError, Result};
use crate::ledger::{self, AuditLedger};
use crate::metrics::ServiceMetrics;
use crate::models::{NewPetition, PageRequest, Petition, PetitionVote, VoteType};
use crate::search::{IndexError, PetitionDocument, SearchIndexer};

/// Collaborators selected at composition time
pub struct Dependencies {
    pub store: Arc<dyn PetitionStore>,
    pub cache: PetitionCache,
    pub ledger: Arc<dyn AuditLedger>,
    pub indexer: Arc<dyn SearchIndexer>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: ServiceMetrics,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub append_mode: AppendMode,
    pub index_timeout: Duration,
    pub pagination: PaginationConfig,
    /// Look for an existing vote before opening the transaction
    pub preflight_vote_check: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            append_mode: AppendMode::Background,
            index_timeout: Duration::from_secs(2),
            pagination: PaginationConfig::default(),
            preflight_vote_check: true,
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        CoordinatorSettings {
            append_mode: config.ledger.append_mode,
            index_timeout: config.search.timeout(),
            pagination: config.pagination.clone(),
            preflight_vote_check: true,
        }
    }
}

/// Reports side effects that failed after a committed write
#[derive(Clone)]
struct DegradedWrites {
    audit: Arc<dyn AuditSink>,
    metrics: ServiceMetrics,
}

impl DegradedWrites {
    fn report(&self, effect: &'static str, detail: String) {
        self.metrics.record_degraded(effect);
        self.audit
            .emit(AuditLevel::Warn, &format!("degraded write ({}): {}", effect, detail));
    }
}

/// Detached post-commit work that can be waited on
#[derive(Clone, Default)]
struct BackgroundTasks {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

struct InFlight(BackgroundTasks);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(self.clone());
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    async fn wait_idle(&self) {
        loop {
            // Registered before the check so a wake-up in between is not lost
            let idle = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }
}

pub struct VoteCoordinator {
    store: Arc<dyn PetitionStore>,
    cache: PetitionCache,
    ledger: Arc<dyn AuditLedger>,
    indexer: Arc<dyn SearchIndexer>,
    audit: Arc<dyn AuditSink>,
    metrics: ServiceMetrics,
    degraded: DegradedWrites,
    background: BackgroundTasks,
    settings: CoordinatorSettings,
}

impl VoteCoordinator {
    pub fn new(deps: Dependencies, settings: CoordinatorSettings) -> Self {
        let degraded = DegradedWrites {
            audit: deps.audit.clone(),
            metrics: deps.metrics.clone(),
        };

        VoteCoordinator {
            store: deps.store,
            cache: deps.cache,
            ledger: deps.ledger,
            indexer: deps.indexer,
            audit: deps.audit,
            metrics: deps.metrics,
            degraded,
            background: BackgroundTasks::default(),
            settings,
        }
    }

    // =========================================================================
    // PETITIONS
    // =========================================================================

    pub async fn create_petition(&self, request: NewPetition) -> Result<Petition> {
        request.validate(Utc::now())?;

        let petition = self.store.create(&Petition::from_request(request)).await?;
        info!("Created petition {} (goal {})", petition.id, petition.goal);
        self.audit.emit(
            AuditLevel::Info,
            &format!("petition {} created by {}", petition.id, petition.owner_id),
        );

        self.spawn_index(&petition);
        self.invalidate_listings().await;
        self.record_on_ledger(ledger::petition_created(&petition)).await;

        Ok(petition)
    }

    pub async fn get_all_petitions(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Petition>> {
        let store = &self.store;

        let petitions = match PageRequest::resolve(limit, offset, &self.settings.pagination)? {
            PageRequest::All => {
                self.cache
                    .get_or_load(keys::LISTING, self.cache.listing_ttl(), || {
                        store.get_all_paginated(None, 0)
                    })
                    .await?
            }
            PageRequest::Page {
                limit,
                offset,
                page: Some(page),
            } => {
                self.cache
                    .get_or_load(&keys::page(page, limit), self.cache.page_ttl(), || {
                        store.get_all_paginated(Some(limit), offset)
                    })
                    .await?
            }
            // Unaligned windows have no page key
            PageRequest::Page {
                limit,
                offset,
                page: None,
            } => store.get_all_paginated(Some(limit), offset).await?,
        };

        Ok(petitions)
    }

    pub async fn get_petition_by_id(&self, id: Uuid) -> Result<Petition> {
        let store = &self.store;
        let petition = self
            .cache
            .get_or_load(&keys::petition(id), self.cache.petition_ttl(), || {
                store.get_by_id(id)
            })
            .await?;
        Ok(petition)
    }

    pub async fn delete_petition(&self, id: Uuid) -> Result<()> {
        self.store.delete(id).await?;
        info!("Deleted petition {}", id);
        self.audit.emit(AuditLevel::Info, &format!("petition {} deleted", id));

        self.invalidate_petition(id).await;
        self.invalidate_listings().await;
        Ok(())
    }

    // =========================================================================
    // VOTING
    // =========================================================================

    /// Record one vote by `user_id`; `vote_type` is `"favor"` or `"against"`
    pub async fn vote(
        &self,
        user_id: Uuid,
        petition_id: Uuid,
        vote_type: &str,
    ) -> Result<PetitionVote> {
        let result = self.try_vote(user_id, petition_id, vote_type).await;
        self.metrics.record_vote(&result);

        match &result {
            Ok(vote) => self.audit.emit(
                AuditLevel::Info,
                &format!(
                    "vote accepted: user {} voted {} on petition {}",
                    user_id, vote.vote_type, petition_id
                ),
            ),
            Err(e) => {
                let level = match e.kind() {
                    ErrorKind::Internal => AuditLevel::Error,
                    _ => AuditLevel::Info,
                };
                self.audit.emit(
                    level,
                    &format!("vote rejected: user {} on petition {}: {}", user_id, petition_id, e),
                );
            }
        }

        result
    }

    async fn try_vote(
        &self,
        user_id: Uuid,
        petition_id: Uuid,
        vote_type: &str,
    ) -> Result<PetitionVote> {
        // Validating
        if self.settings.preflight_vote_check && self.store.has_voted(user_id, petition_id).await? {
            return Err(PetitionError::AlreadyVoted);
        }
        let petition = self.store.get_by_id(petition_id).await?;
        let vote_type: VoteType = vote_type.parse()?;
        if petition.voting_closed_at(Utc::now()) {
            return Err(PetitionError::VotingClosed);
        }
        if petition.goal_reached() {
            return Err(PetitionError::GoalReached);
        }

        // Committing; DuplicateVote and GoalReached here mean a concurrent request won
        let vote = self
            .store
            .vote_with_transaction(
                PetitionVote::new(user_id, petition_id, vote_type),
                tally_callback(move |tx| {
                    Box::pin(async move { tx.increment_tally(petition_id, vote_type).await })
                }),
            )
            .await?;
        debug!("Vote {} committed", vote.id);

        // PostCommit
        self.record_on_ledger(ledger::vote_cast(&vote)).await;
        self.invalidate_petition(petition_id).await;
        self.invalidate_listings().await;

        Ok(vote)
    }

    // =========================================================================
    // AUDIT
    // =========================================================================

    pub fn ledger_snapshot(&self) -> ChainSnapshot {
        self.ledger.snapshot()
    }

    pub async fn cache_metrics(&self) -> CacheMetrics {
        self.cache.get_metrics().await
    }

    /// Wait for detached ledger appends and index requests to finish
    pub async fn flush(&self) {
        self.background.wait_idle().await;
    }

    // =========================================================================
    // SIDE EFFECTS
    // =========================================================================

    async fn record_on_ledger(&self, transaction: LedgerTransaction) {
        let description = transaction.description.clone();

        // Enqueued on the request path so chain order follows request order
        let pending = match self.ledger.submit(transaction).await {
            Ok(pending) => pending,
            Err(e) => {
                self.degraded.report(
                    "ledger",
                    format!("ledger append for '{}' failed: {}", description, e),
                );
                return;
            }
        };

        let degraded = self.degraded.clone();
        let seal = async move {
            match pending.sealed().await {
                Ok(block) => {
                    debug!(index = block.index, hash = %block.hash, "Recorded on ledger")
                }
                Err(e) => degraded.report(
                    "ledger",
                    format!("ledger append for '{}' failed: {}", description, e),
                ),
            }
        };

        match self.settings.append_mode {
            AppendMode::Inline => seal.await,
            AppendMode::Background => self.background.spawn(seal),
        }
    }

    fn spawn_index(&self, petition: &Petition) {
        let indexer = self.indexer.clone();
        let degraded = self.degraded.clone();
        let timeout = self.settings.index_timeout;
        let id = petition.id;
        let document = PetitionDocument::from(petition);

        self.background.spawn(async move {
            let result = match tokio::time::timeout(timeout, indexer.index(id, &document)).await {
                Ok(result) => result,
                Err(_) => Err(IndexError::Timeout(timeout)),
            };
            match result {
                Ok(()) => debug!("Indexed petition {}", id),
                Err(e) => {
                    degraded.report("index", format!("indexing petition {} failed: {}", id, e))
                }
            }
        });
    }

    async fn invalidate_petition(&self, id: Uuid) {
        if let Err(e) = self.cache.invalidate_petition(id).await {
            self.degraded
                .report("cache", format!("invalidating petition {} failed: {}", id, e));
        }
    }

    async fn invalidate_listings(&self) {
        if let Err(e) = self.cache.invalidate_all_listings().await {
            self.degraded
                .report("cache", format!("invalidating listings failed: {}", e));
        }
    }
}
