use async_trait::async_trait;
use thiserror::Error;

use crate::models::{BriefId, MatchResultSet};

/// Errors surfaced by a match result store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Match store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored matches for brief {brief_id} are corrupt: {reason}")]
    Corrupt { brief_id: BriefId, reason: String },
}

/// Whether a `replace` took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// A set from a newer brief revision or a later run was already stored
    Superseded,
}

/// Persistence for the current match set of each brief
///
/// Implementations serialize writes per brief and swap the whole set
/// atomically, so a reader sees either the previous set or the new one.
#[async_trait]
pub trait MatchResultStore: Send + Sync {
    async fn replace(&self, set: &MatchResultSet) -> Result<WriteOutcome, StoreError>;

    async fn current(&self, brief_id: BriefId) -> Result<Option<MatchResultSet>, StoreError>;

    /// Returns true when a set was removed
    async fn invalidate(&self, brief_id: BriefId) -> Result<bool, StoreError>;
}

/// Ordering key for the last-writer-wins rule
#[inline]
pub fn supersedes(stored: &MatchResultSet, incoming: &MatchResultSet) -> bool {
    (stored.brief_revision, stored.generated_at) > (incoming.brief_revision, incoming.generated_at)
}
