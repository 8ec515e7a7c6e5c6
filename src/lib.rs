//! Venue Match - ranked, explained venue shortlists for event briefs
//!
//! This library provides the matching engine behind the venue marketplace:
//! hard eligibility filters, a weighted four-factor fit score, deterministic
//! ranking, best-effort generated explanations with a templated fallback, and
//! atomic per-brief persistence of the resulting shortlist.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{Matcher, ScoringTuning};
pub use models::{EventBrief, MatchResultSet, ScoringWeights, Venue};
pub use services::{MatchError, MatchService};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let matcher = Matcher::with_default_weights();
        assert_eq!(matcher.weights(), &ScoringWeights::default());
        assert!(ScoringTuning::default().validate().is_ok());
    }
}
