use serde::{Deserialize, Serialize};
use crate::models::domain::{BriefId, MatchLookup, MatchResultSet};

/// Lifecycle state of a brief's result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    NotComputed,
    Computing,
    Available,
}

/// Body for match endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchesResponse {
    pub brief_id: BriefId,
    pub state: MatchState,
    pub no_eligible_venues: bool,
    pub match_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_set: Option<MatchResultSet>,
}

impl MatchesResponse {
    pub fn available(set: MatchResultSet) -> Self {
        Self {
            brief_id: set.brief_id,
            state: MatchState::Available,
            no_eligible_venues: set.no_eligible_venues(),
            match_count: set.results.len(),
            result_set: Some(set),
        }
    }

    pub fn pending(brief_id: BriefId, state: MatchState) -> Self {
        Self {
            brief_id,
            state,
            no_eligible_venues: false,
            match_count: 0,
            result_set: None,
        }
    }

    pub fn from_lookup(brief_id: BriefId, lookup: MatchLookup) -> Self {
        match lookup {
            MatchLookup::Available(set) => Self::available(set),
            MatchLookup::Computing => Self::pending(brief_id, MatchState::Computing),
            MatchLookup::NotComputed => Self::pending(brief_id, MatchState::NotComputed),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
