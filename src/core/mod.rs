// Core algorithm exports
pub mod explain;
pub mod filters;
pub mod matcher;
pub mod ranker;
pub mod scoring;

pub use explain::{fallback_explanation, summarize_brief, summarize_venue};
pub use filters::{check_eligibility, filter_eligible, Eligibility, Exclusion, FilterDataError};
pub use matcher::{MatchRun, Matcher};
pub use ranker::{rank_venues, DEFAULT_MAX_RESULTS};
pub use scoring::{calculate_fit_score, ScoringTuning};
