use crate::models::{EventBrief, ScoreBreakdown, ScoringWeights, Venue};
use serde::{Deserialize, Serialize};

/// Share of capacity_max below which a headcount counts as comfortable
pub const DEFAULT_COMFORT_CEILING_RATIO: f64 = 0.9;
/// Capacity fit for a headcount sitting exactly at capacity_max
pub const DEFAULT_CEILING_SCORE: f64 = 60.0;
/// Price fit when a venue publishes no pricing at all
pub const NEUTRAL_PRICE_SCORE: f64 = 50.0;
/// Relative overshoot of budget_max at which price fit reaches 0
pub const DEFAULT_OVER_BUDGET_ZERO_AT: f64 = 0.5;
/// Relative shortfall below budget_min at which price fit bottoms out
pub const DEFAULT_UNDER_BUDGET_FULL_DECAY_AT: f64 = 1.0;
/// Lowest price fit an under-budget venue can get
pub const DEFAULT_UNDER_BUDGET_FLOOR: f64 = 40.0;
/// Location fit for the right borough but a different neighborhood
pub const DEFAULT_NEIGHBORHOOD_MISS_SCORE: f64 = 90.0;
/// Location fit for a neighbouring borough
pub const DEFAULT_ADJACENT_BOROUGH_SCORE: f64 = 50.0;
/// Location fit for any other borough
pub const DEFAULT_OTHER_BOROUGH_SCORE: f64 = 30.0;

const FULL_MARKS: f64 = 100.0;

/// Curve shapes for the sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringTuning {
    pub comfort_ceiling_ratio: f64,
    pub ceiling_score: f64,
    pub over_budget_zero_at: f64,
    pub under_budget_full_decay_at: f64,
    pub under_budget_floor: f64,
    pub neighborhood_miss_score: f64,
    pub adjacent_borough_score: f64,
    pub other_borough_score: f64,
}

impl Default for ScoringTuning {
    fn default() -> Self {
        Self {
            comfort_ceiling_ratio: DEFAULT_COMFORT_CEILING_RATIO,
            ceiling_score: DEFAULT_CEILING_SCORE,
            over_budget_zero_at: DEFAULT_OVER_BUDGET_ZERO_AT,
            under_budget_full_decay_at: DEFAULT_UNDER_BUDGET_FULL_DECAY_AT,
            under_budget_floor: DEFAULT_UNDER_BUDGET_FLOOR,
            neighborhood_miss_score: DEFAULT_NEIGHBORHOOD_MISS_SCORE,
            adjacent_borough_score: DEFAULT_ADJACENT_BOROUGH_SCORE,
            other_borough_score: DEFAULT_OTHER_BOROUGH_SCORE,
        }
    }
}

impl ScoringTuning {
    /// Checks the invariants the ranking relies on: eligible venues never score 0 on
    /// capacity or location, and going over budget costs more per unit than going under.
    pub fn validate(&self) -> Result<(), String> {
        let in_range = |v: f64| v.is_finite() && v > 0.0 && v <= FULL_MARKS;

        if !(self.comfort_ceiling_ratio > 0.0 && self.comfort_ceiling_ratio <= 1.0) {
            return Err(format!(
                "comfort_ceiling_ratio must be in (0, 1], got {}",
                self.comfort_ceiling_ratio
            ));
        }
        for (name, value) in [
            ("ceiling_score", self.ceiling_score),
            ("neighborhood_miss_score", self.neighborhood_miss_score),
            ("adjacent_borough_score", self.adjacent_borough_score),
            ("other_borough_score", self.other_borough_score),
        ] {
            if !in_range(value) {
                return Err(format!("{} must be in (0, 100], got {}", name, value));
            }
        }
        if !(self.under_budget_floor.is_finite()
            && (0.0..=FULL_MARKS).contains(&self.under_budget_floor))
        {
            return Err(format!(
                "under_budget_floor must be in [0, 100], got {}",
                self.under_budget_floor
            ));
        }
        if !(self.over_budget_zero_at.is_finite() && self.over_budget_zero_at > 0.0)
            || !(self.under_budget_full_decay_at.is_finite() && self.under_budget_full_decay_at > 0.0)
        {
            return Err("budget decay distances must be positive".to_string());
        }

        let over_slope = FULL_MARKS / self.over_budget_zero_at;
        let under_slope = (FULL_MARKS - self.under_budget_floor) / self.under_budget_full_decay_at;
        if over_slope <= under_slope {
            return Err(format!(
                "over-budget decay ({:.1}/unit) must be steeper than under-budget decay ({:.1}/unit)",
                over_slope, under_slope
            ));
        }

        Ok(())
    }
}

/// Calculate a fit score (0-100) for a venue against a brief
///
/// score = weighted mean of (capacity, price, location, amenity) sub-scores,
/// rounded to one decimal.
pub fn calculate_fit_score(
    venue: &Venue,
    brief: &EventBrief,
    weights: &ScoringWeights,
    tuning: &ScoringTuning,
) -> (f64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        capacity: round_to_tenth(calculate_capacity_score(
            brief.headcount,
            venue.capacity_min,
            venue.capacity_max,
            tuning,
        )),
        price: round_to_tenth(calculate_price_score(
            venue.price_signal(),
            brief.budget_min,
            brief.budget_max,
            tuning,
        )),
        location: round_to_tenth(calculate_location_score(venue, brief, tuning)),
        amenity: round_to_tenth(calculate_amenity_score(venue, brief)),
    };

    (weighted_total(&breakdown, weights), breakdown)
}

/// Weighted mean of the sub-scores, clamped to [0, 100] and rounded to one decimal
pub fn weighted_total(breakdown: &ScoreBreakdown, weights: &ScoringWeights) -> f64 {
    let total_weight = weights.total();
    if !(total_weight.is_finite() && total_weight > 0.0) {
        return 0.0;
    }

    let raw = (breakdown.capacity * weights.capacity
        + breakdown.price * weights.price
        + breakdown.location * weights.location
        + breakdown.amenity * weights.amenity)
        / total_weight;

    round_to_tenth(raw.clamp(0.0, FULL_MARKS))
}

#[inline]
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Calculate capacity score (0-100)
/// Full marks up to the comfort ceiling, then a linear slide to `ceiling_score` at capacity_max
#[inline]
fn calculate_capacity_score(
    headcount: u32,
    capacity_min: u32,
    capacity_max: u32,
    tuning: &ScoringTuning,
) -> f64 {
    let headcount = headcount as f64;
    let max = capacity_max as f64;
    let comfort_ceiling = (max * tuning.comfort_ceiling_ratio).max(capacity_min as f64);

    if headcount <= comfort_ceiling {
        return FULL_MARKS;
    }

    let span = max - comfort_ceiling;
    if span <= 0.0 {
        return FULL_MARKS;
    }

    let crowding = ((headcount - comfort_ceiling) / span).clamp(0.0, 1.0);
    FULL_MARKS - (FULL_MARKS - tuning.ceiling_score) * crowding
}

/// Calculate price score (0-100)
/// Neutral without pricing; over budget_max decays much faster than under budget_min
#[inline]
fn calculate_price_score(
    price: Option<f64>,
    budget_min: Option<f64>,
    budget_max: f64,
    tuning: &ScoringTuning,
) -> f64 {
    let Some(price) = price else {
        return NEUTRAL_PRICE_SCORE;
    };

    if price > budget_max {
        if budget_max <= 0.0 {
            return 0.0;
        }
        let overshoot = (price - budget_max) / budget_max;
        let decay = (overshoot / tuning.over_budget_zero_at).min(1.0);
        return FULL_MARKS * (1.0 - decay);
    }

    let floor = budget_min.unwrap_or(0.0);
    if price >= floor || floor <= 0.0 {
        return FULL_MARKS;
    }

    let shortfall = (floor - price) / floor;
    let decay = (shortfall / tuning.under_budget_full_decay_at).min(1.0);
    FULL_MARKS - (FULL_MARKS - tuning.under_budget_floor) * decay
}

/// Calculate location score (0-100)
/// A different borough keeps a low non-zero score; hosts still consider it
#[inline]
fn calculate_location_score(venue: &Venue, brief: &EventBrief, tuning: &ScoringTuning) -> f64 {
    let Some(preferred) = brief.borough_pref else {
        return FULL_MARKS;
    };

    if venue.borough != preferred {
        return if preferred.is_adjacent_to(venue.borough) {
            tuning.adjacent_borough_score
        } else {
            tuning.other_borough_score
        };
    }

    match (brief.neighborhood(), venue.neighborhood.as_deref()) {
        (Some(wanted), Some(actual))
            if !actual.to_lowercase().contains(&wanted.to_lowercase()) =>
        {
            tuning.neighborhood_miss_score
        }
        _ => FULL_MARKS,
    }
}

/// Calculate amenity score (0-100)
/// Share of explicit requirements the venue covers; nothing asked means nothing missed
#[inline]
fn calculate_amenity_score(venue: &Venue, brief: &EventBrief) -> f64 {
    let requirements = brief.requirements();
    if requirements.is_empty() {
        return FULL_MARKS;
    }

    let satisfied = requirements
        .iter()
        .filter(|r| r.satisfied_by(&venue.amenities))
        .count();

    FULL_MARKS * satisfied as f64 / requirements.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlcoholLevel, Amenity, AvNeeds, Borough, EventType, FoodBevLevel, VerificationStatus,
    };
    use chrono::{NaiveDate, Utc};
    use std::collections::BTreeSet;

    fn create_test_venue(borough: Borough, price: Option<f64>) -> Venue {
        Venue {
            id: 1,
            name: "Test Venue".to_string(),
            borough,
            neighborhood: Some("Lower East Side".to_string()),
            capacity_min: 20,
            capacity_max: 100,
            base_price: price,
            min_spend: None,
            amenities: [Amenity::FullBar, Amenity::Microphone].into(),
            availability: None,
            verification_status: VerificationStatus::Verified,
        }
    }

    fn create_test_brief() -> EventBrief {
        EventBrief {
            id: 1,
            event_type: EventType::Networking,
            headcount: 50,
            date_preferred: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            date_flexible: false,
            borough_pref: Some(Borough::Manhattan),
            neighborhood_pref: None,
            budget_min: None,
            budget_max: 2000.0,
            food_bev_level: FoodBevLevel::None,
            alcohol_level: AlcoholLevel::None,
            av_needs: AvNeeds::None,
            accessibility_needs: None,
            vibe: None,
            notes: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_calculate_fit_score_range() {
        let venue = create_test_venue(Borough::Manhattan, Some(1800.0));
        let brief = create_test_brief();

        let (score, breakdown) =
            calculate_fit_score(&venue, &brief, &ScoringWeights::default(), &ScoringTuning::default());

        assert!((0.0..=100.0).contains(&score));
        assert_eq!(breakdown.capacity, 100.0);
        assert_eq!(breakdown.price, 100.0);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_capacity_score() {
        let tuning = ScoringTuning::default();

        // Comfortable band
        assert_eq!(calculate_capacity_score(20, 20, 100, &tuning), 100.0);
        assert_eq!(calculate_capacity_score(90, 20, 100, &tuning), 100.0);

        // Crowding towards the ceiling
        let near = calculate_capacity_score(95, 20, 100, &tuning);
        assert!(near < 100.0 && near > DEFAULT_CEILING_SCORE);

        // At the ceiling: lower, but never zero
        let at_max = calculate_capacity_score(100, 20, 100, &tuning);
        assert_eq!(at_max, DEFAULT_CEILING_SCORE);
        assert!(at_max > 0.0);
    }

    #[test]
    fn test_capacity_score_narrow_range() {
        let tuning = ScoringTuning::default();
        // comfort ceiling collapses onto capacity_min
        assert_eq!(calculate_capacity_score(95, 95, 100, &tuning), 100.0);
        assert_eq!(calculate_capacity_score(50, 50, 50, &tuning), 100.0);
        assert!(calculate_capacity_score(100, 95, 100, &tuning) < 100.0);
    }

    #[test]
    fn test_price_score_neutral_without_pricing() {
        let tuning = ScoringTuning::default();
        assert_eq!(calculate_price_score(None, Some(100.0), 2000.0, &tuning), NEUTRAL_PRICE_SCORE);
    }

    #[test]
    fn test_price_score_inside_band() {
        let tuning = ScoringTuning::default();
        assert_eq!(calculate_price_score(Some(1500.0), Some(1000.0), 2000.0, &tuning), 100.0);
        assert_eq!(calculate_price_score(Some(2000.0), None, 2000.0, &tuning), 100.0);
        assert_eq!(calculate_price_score(Some(0.0), None, 2000.0, &tuning), 100.0);
    }

    #[test]
    fn test_price_score_decay_asymmetry() {
        let tuning = ScoringTuning::default();

        // 10% over vs 10% under
        let over = calculate_price_score(Some(2200.0), Some(1000.0), 2000.0, &tuning);
        let under = calculate_price_score(Some(900.0), Some(1000.0), 2000.0, &tuning);

        assert!(over < under, "over={} under={}", over, under);
        assert_eq!(calculate_price_score(Some(5000.0), None, 2000.0, &tuning), 0.0);
        assert!(calculate_price_score(Some(0.0), Some(1000.0), 2000.0, &tuning) >= DEFAULT_UNDER_BUDGET_FLOOR);
    }

    #[test]
    fn test_price_score_zero_budget() {
        let tuning = ScoringTuning::default();
        assert_eq!(calculate_price_score(Some(10.0), None, 0.0, &tuning), 0.0);
        assert_eq!(calculate_price_score(Some(0.0), None, 0.0, &tuning), 100.0);
    }

    #[test]
    fn test_location_score() {
        let tuning = ScoringTuning::default();
        let mut brief = create_test_brief();

        let manhattan = create_test_venue(Borough::Manhattan, None);
        let brooklyn = create_test_venue(Borough::Brooklyn, None);
        let queens = create_test_venue(Borough::Queens, None);

        assert_eq!(calculate_location_score(&manhattan, &brief, &tuning), 100.0);
        assert_eq!(calculate_location_score(&brooklyn, &brief, &tuning), DEFAULT_ADJACENT_BOROUGH_SCORE);
        assert_eq!(calculate_location_score(&queens, &brief, &tuning), DEFAULT_OTHER_BOROUGH_SCORE);

        brief.neighborhood_pref = Some("east side".to_string());
        assert_eq!(calculate_location_score(&manhattan, &brief, &tuning), 100.0);

        brief.neighborhood_pref = Some("Harlem".to_string());
        assert_eq!(calculate_location_score(&manhattan, &brief, &tuning), DEFAULT_NEIGHBORHOOD_MISS_SCORE);

        brief.borough_pref = None;
        assert_eq!(calculate_location_score(&queens, &brief, &tuning), 100.0);
    }

    #[test]
    fn test_amenity_score() {
        let venue = create_test_venue(Borough::Manhattan, None);
        let mut brief = create_test_brief();

        assert_eq!(calculate_amenity_score(&venue, &brief), 100.0);

        brief.alcohol_level = AlcoholLevel::BeerWine;
        brief.food_bev_level = FoodBevLevel::FullCatering;
        assert_eq!(calculate_amenity_score(&venue, &brief), 50.0);

        let mut catered = venue.clone();
        catered.amenities = BTreeSet::from([Amenity::Kitchen, Amenity::BeerWine]);
        assert_eq!(calculate_amenity_score(&catered, &brief), 100.0);
    }

    #[test]
    fn test_weights_are_a_parameter() {
        let breakdown = ScoreBreakdown {
            capacity: 100.0,
            price: 0.0,
            location: 0.0,
            amenity: 0.0,
        };
        let capacity_only = ScoringWeights {
            capacity: 1.0,
            price: 0.0,
            location: 0.0,
            amenity: 0.0,
        };

        assert_eq!(weighted_total(&breakdown, &capacity_only), 100.0);
        assert_eq!(weighted_total(&breakdown, &ScoringWeights::default()), 30.0);
    }

    #[test]
    fn test_rounding_to_one_decimal() {
        assert_eq!(round_to_tenth(83.349), 83.3);
        assert_eq!(round_to_tenth(83.36), 83.4);
        assert_eq!(round_to_tenth(100.0), 100.0);
    }

    #[test]
    fn test_tuning_validation() {
        assert!(ScoringTuning::default().validate().is_ok());

        let gentle_overshoot = ScoringTuning {
            over_budget_zero_at: 5.0,
            ..ScoringTuning::default()
        };
        assert!(gentle_overshoot.validate().is_err());

        let zero_floor = ScoringTuning {
            other_borough_score: 0.0,
            ..ScoringTuning::default()
        };
        assert!(zero_floor.validate().is_err());
    }
}
