use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use super::catalog::{CatalogError, CatalogReader};
use super::store::{supersedes, MatchResultStore, StoreError, WriteOutcome};
use crate::models::{BriefId, EventBrief, MatchResultSet, Venue, VenueId};

/// Catalog held in process memory, for local runs and tests
#[derive(Default)]
pub struct InMemoryCatalog {
    briefs: RwLock<HashMap<BriefId, EventBrief>>,
    venues: RwLock<Vec<Venue>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(briefs: Vec<EventBrief>, venues: Vec<Venue>) -> Self {
        let catalog = Self::new();
        for brief in briefs {
            catalog.upsert_brief(brief);
        }
        for venue in venues {
            catalog.upsert_venue(venue);
        }
        catalog
    }

    pub fn upsert_brief(&self, brief: EventBrief) {
        self.briefs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(brief.id, brief);
    }

    pub fn upsert_venue(&self, venue: Venue) {
        let mut venues = self.venues.write().unwrap_or_else(PoisonError::into_inner);
        match venues.iter_mut().find(|v| v.id == venue.id) {
            Some(existing) => *existing = venue,
            None => venues.push(venue),
        }
    }

    pub fn remove_venue(&self, venue_id: VenueId) {
        self.venues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|v| v.id != venue_id);
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn get_brief(&self, brief_id: BriefId) -> Result<Option<EventBrief>, CatalogError> {
        Ok(self
            .briefs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&brief_id)
            .cloned())
    }

    async fn venue_snapshot(&self, _around: NaiveDate) -> Result<Vec<Venue>, CatalogError> {
        Ok(self
            .venues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Match store held in process memory
#[derive(Default)]
pub struct InMemoryResultStore {
    sets: RwLock<HashMap<BriefId, MatchResultSet>>,
    applied_writes: AtomicUsize,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `replace` calls that took effect
    pub fn applied_writes(&self) -> usize {
        self.applied_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchResultStore for InMemoryResultStore {
    async fn replace(&self, set: &MatchResultSet) -> Result<WriteOutcome, StoreError> {
        let mut sets = self.sets.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(stored) = sets.get(&set.brief_id) {
            if supersedes(stored, set) {
                return Ok(WriteOutcome::Superseded);
            }
        }

        sets.insert(set.brief_id, set.clone());
        self.applied_writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteOutcome::Applied)
    }

    async fn current(&self, brief_id: BriefId) -> Result<Option<MatchResultSet>, StoreError> {
        Ok(self
            .sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&brief_id)
            .cloned())
    }

    async fn invalidate(&self, brief_id: BriefId) -> Result<bool, StoreError> {
        Ok(self
            .sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&brief_id)
            .is_some())
    }
}
