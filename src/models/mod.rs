// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    AlcoholLevel, Amenity, AvNeeds, AvailabilityCalendar, Borough, BriefId, EventBrief, EventType,
    ExplanationSource, Factor, FoodBevLevel, MatchLookup, MatchOutcome, MatchResult,
    MatchResultSet, RankedVenue, Requirement, ScoreBreakdown, ScoredVenue, ScoringWeights,
    UnknownVariant, Venue, VenueId, VerificationStatus,
};
pub use requests::{ComputeMatchesQuery, RunMode};
pub use responses::{ErrorResponse, HealthResponse, MatchState, MatchesResponse};
