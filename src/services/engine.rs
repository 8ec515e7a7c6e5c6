use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;
use validator::Validate;

use super::cache::{CacheError, CacheKey, CacheManager};
use super::catalog::{CatalogError, CatalogReader};
use super::explainer::Explainer;
use super::store::{MatchResultStore, StoreError, WriteOutcome};
use crate::core::Matcher;
use crate::models::{BriefId, EventBrief, MatchLookup, MatchResult, MatchResultSet};

/// Errors that abort a matching run
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error("Brief {0} not found")]
    BriefNotFound(BriefId),

    #[error("Brief {brief_id} is invalid: {reason}")]
    InvalidBrief { brief_id: BriefId, reason: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MatchError {
    /// Whether the caller can expect a retry to succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchError::Catalog(_) | MatchError::Store(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            MatchError::BriefNotFound(_) => 404,
            MatchError::InvalidBrief { .. } => 422,
            MatchError::Catalog(_) | MatchError::Store(_) => 503,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            MatchError::BriefNotFound(_) => "brief_not_found",
            MatchError::InvalidBrief { .. } => "invalid_brief",
            MatchError::Catalog(_) | MatchError::Store(_) => "matches_unavailable",
        }
    }
}

type RunResult = Result<MatchResultSet, MatchError>;
type InFlight = Mutex<HashMap<BriefId, watch::Receiver<Option<RunResult>>>>;

enum Role {
    Leader(Lease),
    Follower(watch::Receiver<Option<RunResult>>),
}

/// Clears a brief's in-flight entry when the leading run ends, however it ends
struct FlightGuard {
    in_flight: Arc<InFlight>,
    brief_id: BriefId,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.brief_id);
    }
}

/// The right to run a brief, held from registration until the run ends
///
/// The guard is declared first so the in-flight entry is gone before the
/// sender drops and followers of a cancelled run retry.
struct Lease {
    _guard: FlightGuard,
    tx: watch::Sender<Option<RunResult>>,
}

/// Orchestrates ComputeMatches, GetMatches and InvalidateMatches
///
/// Briefs are independent of each other; the only shared mutable state is the
/// in-flight table, which coalesces duplicate runs for the same brief, and the
/// last failure per brief, which lets a poller learn that a background run
/// failed.
pub struct MatchService {
    catalog: Arc<dyn CatalogReader>,
    store: Arc<dyn MatchResultStore>,
    explainer: Explainer,
    matcher: Matcher,
    cache: Option<Arc<CacheManager>>,
    in_flight: Arc<InFlight>,
    failures: Mutex<HashMap<BriefId, MatchError>>,
}

impl MatchService {
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        store: Arc<dyn MatchResultStore>,
        explainer: Explainer,
        matcher: Matcher,
    ) -> Self {
        Self {
            catalog,
            store,
            explainer,
            matcher,
            cache: None,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// True while a run for the brief is in progress
    pub fn is_computing(&self, brief_id: BriefId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&brief_id)
    }

    /// Compute, persist and return the ranked shortlist for a brief
    ///
    /// Concurrent calls for the same brief share one run. If the leading call
    /// is cancelled, a waiting caller takes over.
    pub async fn compute_matches(&self, brief_id: BriefId) -> Result<MatchResultSet, MatchError> {
        loop {
            match self.claim(brief_id) {
                Role::Leader(lease) => return self.lead(brief_id, lease).await,
                Role::Follower(mut rx) => {
                    tracing::debug!("Brief {}: joining in-flight run", brief_id);
                    if let Ok(shared) = rx.wait_for(Option::is_some).await {
                        if let Some(result) = shared.as_ref() {
                            return result.clone();
                        }
                    }
                    tracing::debug!("Brief {}: in-flight run was cancelled, retrying", brief_id);
                }
            }
        }
    }

    /// Check the brief and start a background run for it
    ///
    /// A missing or invalid brief is reported here. Otherwise the run is
    /// registered before this returns, so an immediate `get_matches` sees it
    /// as computing. If a run is already in flight it is joined, not repeated.
    pub async fn start_compute(self: &Arc<Self>, brief_id: BriefId) -> Result<(), MatchError> {
        let brief = self.fetch_brief(brief_id).await?;
        validate_brief(&brief)?;

        match self.claim(brief_id) {
            Role::Leader(lease) => {
                tracing::info!("Brief {}: scheduling match computation", brief_id);
                let service = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = service.lead(brief_id, lease).await {
                        tracing::error!("Background matching for brief {} failed: {}", brief_id, e);
                    }
                });
            }
            Role::Follower(_) => {
                tracing::debug!("Brief {}: run already in flight", brief_id);
            }
        }

        Ok(())
    }

    /// Read the current shortlist without computing anything
    ///
    /// When there is no fresh shortlist and nothing is computing, the error
    /// of the last failed run is returned if there was one.
    pub async fn get_matches(&self, brief_id: BriefId) -> Result<MatchLookup, MatchError> {
        let brief = self.fetch_brief(brief_id).await?;
        validate_brief(&brief)?;

        let stored = match self.cached(brief_id).await {
            Some(set) if set.brief_revision >= brief.updated_at => Some(set),
            _ => self.store.current(brief_id).await?,
        };

        let lookup = match stored {
            Some(set) if set.brief_revision >= brief.updated_at => MatchLookup::Available(set),
            Some(_) | None if self.is_computing(brief_id) => MatchLookup::Computing,
            stale => {
                if let Some(e) = self.last_failure(brief_id) {
                    return Err(e);
                }
                if let Some(set) = stale {
                    tracing::debug!(
                        "Brief {}: stored matches predate revision {} (computed from {})",
                        brief_id,
                        brief.updated_at,
                        set.brief_revision
                    );
                }
                MatchLookup::NotComputed
            }
        };

        Ok(lookup)
    }

    /// Drop the stored shortlist, e.g. after the host edits the brief
    pub async fn invalidate(&self, brief_id: BriefId) -> Result<bool, MatchError> {
        let removed = self.store.invalidate(brief_id).await?;
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&brief_id);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.delete(&CacheKey::matches(brief_id)).await {
                tracing::warn!("Brief {}: failed to evict cached matches: {}", brief_id, e);
            }
        }

        tracing::info!("Brief {}: matches invalidated (removed: {})", brief_id, removed);
        Ok(removed)
    }

    /// Register a run for the brief, or find the one already registered
    fn claim(&self, brief_id: BriefId) -> Role {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rx) = in_flight.get(&brief_id) {
            return Role::Follower(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(brief_id, rx);
        Role::Leader(Lease {
            _guard: FlightGuard {
                in_flight: Arc::clone(&self.in_flight),
                brief_id,
            },
            tx,
        })
    }

    /// Run under a lease and publish the result to followers
    async fn lead(&self, brief_id: BriefId, lease: Lease) -> RunResult {
        let result = self.run(brief_id).await;

        {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            match &result {
                Err(e) if e.is_retryable() => {
                    failures.insert(brief_id, e.clone());
                }
                _ => {
                    failures.remove(&brief_id);
                }
            }
        }

        lease.tx.send_replace(Some(result.clone()));
        result
    }

    fn last_failure(&self, brief_id: BriefId) -> Option<MatchError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&brief_id)
            .cloned()
    }

    async fn run(&self, brief_id: BriefId) -> RunResult {
        let brief = self.fetch_brief(brief_id).await?;
        validate_brief(&brief)?;

        let venues = self.catalog.venue_snapshot(brief.date_preferred).await?;
        let run = self.matcher.find_matches(&brief, &venues);
        let explanations = self.explainer.explain_all(&brief, &run.ranked).await;

        let generated_at = Utc::now();
        let results: Vec<MatchResult> = run
            .ranked
            .iter()
            .zip(explanations)
            .map(|(ranked, explanation)| MatchResult {
                venue_id: ranked.venue.id,
                venue_name: ranked.venue.name.clone(),
                rank: ranked.rank,
                score: ranked.score,
                explanation: explanation.text,
                explanation_source: explanation.source,
                generated_at,
            })
            .collect();

        let set = MatchResultSet {
            brief_id,
            run_id: Uuid::new_v4(),
            brief_revision: brief.updated_at,
            outcome: run.outcome(),
            candidate_count: u32::try_from(run.total_candidates).unwrap_or(u32::MAX),
            eligible_count: u32::try_from(run.eligible).unwrap_or(u32::MAX),
            generated_at,
            results,
        };
        debug_assert!(set.is_consistent());

        let current = match self.store.replace(&set).await? {
            WriteOutcome::Applied => set,
            WriteOutcome::Superseded => {
                tracing::info!(
                    "Brief {}: run {} superseded by a newer stored set",
                    brief_id,
                    set.run_id
                );
                self.store.current(brief_id).await?.unwrap_or(set)
            }
        };

        self.cache_put(&current).await;

        tracing::info!(
            "Brief {}: {} matches from {} candidates ({} eligible, {} corrupt)",
            brief_id,
            current.results.len(),
            run.total_candidates,
            run.eligible,
            run.corrupt
        );

        Ok(current)
    }

    async fn fetch_brief(&self, brief_id: BriefId) -> Result<EventBrief, MatchError> {
        match self.catalog.get_brief(brief_id).await {
            Ok(Some(brief)) => Ok(brief),
            Ok(None) => Err(MatchError::BriefNotFound(brief_id)),
            Err(CatalogError::CorruptBrief { reason, .. }) => {
                Err(MatchError::InvalidBrief { brief_id, reason })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cached(&self, brief_id: BriefId) -> Option<MatchResultSet> {
        let cache = self.cache.as_ref()?;
        match cache.get(&CacheKey::matches(brief_id)).await {
            Ok(set) => Some(set),
            Err(CacheError::CacheMiss(_)) => None,
            Err(e) => {
                tracing::warn!("Brief {}: cache read failed: {}", brief_id, e);
                None
            }
        }
    }

    async fn cache_put(&self, set: &MatchResultSet) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&CacheKey::matches(set.brief_id), set).await {
                tracing::warn!("Brief {}: cache write failed: {}", set.brief_id, e);
            }
        }
    }
}

fn validate_brief(brief: &EventBrief) -> Result<(), MatchError> {
    brief.validate().map_err(|e| MatchError::InvalidBrief {
        brief_id: brief.id,
        reason: e.to_string(),
    })
}
