use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{BriefId, EventBrief, Venue};

/// Errors surfaced by a catalog backend
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Brief {brief_id} could not be decoded: {reason}")]
    CorruptBrief { brief_id: BriefId, reason: String },
}

/// Read-only view over briefs and the venue catalog
///
/// `venue_snapshot` must return a mutually consistent set of venues: a venue
/// edited mid-read is seen either entirely before or entirely after the edit.
/// Blocked dates only need to cover `around` plus the flexible-date window.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn get_brief(&self, brief_id: BriefId) -> Result<Option<EventBrief>, CatalogError>;

    async fn venue_snapshot(&self, around: NaiveDate) -> Result<Vec<Venue>, CatalogError>;
}
