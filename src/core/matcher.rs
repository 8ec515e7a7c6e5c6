use crate::core::{
    filters::filter_eligible,
    ranker::{rank_venues, DEFAULT_MAX_RESULTS},
    scoring::{calculate_fit_score, ScoringTuning},
};
use crate::models::{EventBrief, MatchOutcome, RankedVenue, ScoredVenue, ScoringWeights, Venue};

/// Result of the filter/score/rank phase
#[derive(Debug)]
pub struct MatchRun {
    pub ranked: Vec<RankedVenue>,
    pub total_candidates: usize,
    pub eligible: usize,
    pub corrupt: usize,
}

impl MatchRun {
    pub fn outcome(&self) -> MatchOutcome {
        if self.ranked.is_empty() {
            MatchOutcome::NoEligibleVenues
        } else {
            MatchOutcome::Matched
        }
    }
}

/// Main matching orchestrator - implements the synchronous part of the pipeline
///
/// # Pipeline Stages
/// 1. Eligibility filter (hard constraints)
/// 2. Scoring
/// 3. Ranking and truncation
///
/// Nothing here awaits; explanation and persistence happen downstream.
#[derive(Debug, Clone)]
pub struct Matcher {
    weights: ScoringWeights,
    tuning: ScoringTuning,
    max_results: usize,
}

impl Matcher {
    pub fn new(weights: ScoringWeights, tuning: ScoringTuning, max_results: usize) -> Self {
        Self {
            weights,
            tuning,
            max_results: max_results.max(1),
        }
    }

    pub fn with_default_weights() -> Self {
        Self::new(ScoringWeights::default(), ScoringTuning::default(), DEFAULT_MAX_RESULTS)
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Rank the catalog snapshot for a brief
    ///
    /// # Arguments
    /// * `brief` - The validated event brief
    /// * `venues` - A consistent snapshot of the venue catalog
    ///
    /// # Returns
    /// MatchRun with at most `max_results` ranked venues
    pub fn find_matches(&self, brief: &EventBrief, venues: &[Venue]) -> MatchRun {
        let total_candidates = venues.len();

        // Stage 1: Hard constraints
        let filtered = filter_eligible(brief, venues);
        let eligible = filtered.eligible.len();

        // Stage 2: Scoring
        let scored: Vec<ScoredVenue> = filtered
            .eligible
            .into_iter()
            .map(|venue| {
                let (score, breakdown) =
                    calculate_fit_score(venue, brief, &self.weights, &self.tuning);
                ScoredVenue {
                    venue: venue.clone(),
                    breakdown,
                    score,
                }
            })
            .collect();

        // Stage 3: Ranking
        let ranked = rank_venues(scored, self.max_results);

        tracing::debug!(
            "Brief {}: {} candidates, {} eligible, {} excluded, {} corrupt, {} ranked",
            brief.id,
            total_candidates,
            eligible,
            filtered.excluded,
            filtered.corrupt,
            ranked.len()
        );

        MatchRun {
            ranked,
            total_candidates,
            eligible,
            corrupt: filtered.corrupt,
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::with_default_weights()
    }
}
