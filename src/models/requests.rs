use serde::{Deserialize, Serialize};

/// How a ComputeMatches call waits for its result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Caller waits for the full result set
    #[default]
    Sync,
    /// Run is spawned; caller polls GetMatches
    Async,
}

/// Query string for `POST /briefs/{brief_id}/matches`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputeMatchesQuery {
    #[serde(default)]
    pub mode: RunMode,
}
