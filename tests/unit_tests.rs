// Unit tests for the venue matching pipeline

use chrono::{NaiveDate, Utc};
use std::collections::BTreeSet;

use venue_match::core::{
    calculate_fit_score, check_eligibility, fallback_explanation, Eligibility, Exclusion,
    FilterDataError, Matcher, ScoringTuning,
};
use venue_match::models::{
    AlcoholLevel, Amenity, AvNeeds, AvailabilityCalendar, Borough, EventBrief, EventType,
    FoodBevLevel, MatchOutcome, ScoringWeights, Venue, VenueId, VerificationStatus,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn create_brief(headcount: u32, budget_max: f64, borough: Option<Borough>) -> EventBrief {
    EventBrief {
        id: 7,
        event_type: EventType::Networking,
        headcount,
        date_preferred: date(2025, 9, 12),
        date_flexible: false,
        borough_pref: borough,
        neighborhood_pref: None,
        budget_min: None,
        budget_max,
        food_bev_level: FoodBevLevel::LightBites,
        alcohol_level: AlcoholLevel::BeerWine,
        av_needs: AvNeeds::None,
        accessibility_needs: None,
        vibe: Some("relaxed".to_string()),
        notes: None,
        updated_at: Utc::now(),
    }
}

fn create_venue(id: VenueId, capacity: (u32, u32), price: Option<f64>, borough: Borough) -> Venue {
    Venue {
        id,
        name: format!("Venue {}", id),
        borough,
        neighborhood: None,
        capacity_min: capacity.0,
        capacity_max: capacity.1,
        base_price: price,
        min_spend: None,
        amenities: [Amenity::LightBites, Amenity::BeerWine].into(),
        availability: None,
        verification_status: VerificationStatus::Verified,
    }
}

fn blocked(dates: &[NaiveDate]) -> Option<AvailabilityCalendar> {
    Some(AvailabilityCalendar {
        blocked_dates: dates.iter().copied().collect(),
    })
}

fn price_fit(price: f64, budget_min: Option<f64>, budget_max: f64) -> f64 {
    let mut brief = create_brief(50, budget_max, None);
    brief.budget_min = budget_min;
    let venue = create_venue(1, (20, 100), Some(price), Borough::Queens);
    let (_, breakdown) = calculate_fit_score(
        &venue,
        &brief,
        &ScoringWeights::default(),
        &ScoringTuning::default(),
    );
    breakdown.price
}

#[test]
fn test_right_sized_venue_in_preferred_borough_wins() {
    let brief = create_brief(50, 5000.0, Some(Borough::Manhattan));
    let venue_a = create_venue(1, (40, 60), Some(4000.0), Borough::Manhattan);
    let venue_b = create_venue(2, (100, 300), Some(4000.0), Borough::Brooklyn);

    let weights = ScoringWeights::default();
    let tuning = ScoringTuning::default();
    let (score_a, _) = calculate_fit_score(&venue_a, &brief, &weights, &tuning);
    let (score_b, breakdown_b) = calculate_fit_score(&venue_b, &brief, &weights, &tuning);
    assert!(score_a > score_b, "{} should beat {}", score_a, score_b);
    assert!(breakdown_b.location > 0.0);

    let run = Matcher::with_default_weights().find_matches(&brief, &[venue_b, venue_a]);
    assert_eq!(run.ranked.len(), 1);
    assert_eq!(run.ranked[0].venue.id, 1);
    assert_eq!(run.eligible, 1);
}

#[test]
fn test_over_budget_decays_faster_than_it_rewards() {
    let far_over = price_fit(5000.0, None, 2000.0);
    let near_over = price_fit(2200.0, None, 2000.0);
    let under = price_fit(1800.0, None, 2000.0);

    assert!(far_over < under);
    assert!(under - far_over > under - near_over);
    assert!(near_over > 0.0);
}

#[test]
fn test_equal_miss_costs_more_over_budget() {
    // 200 either side of a 2000-4000 range
    let under_min = price_fit(1800.0, Some(2000.0), 4000.0);
    let over_max = price_fit(4200.0, Some(2000.0), 4000.0);
    let inside = price_fit(3000.0, Some(2000.0), 4000.0);

    assert_eq!(inside, 100.0);
    assert!(over_max < under_min);
    assert!(under_min < inside);
}

#[test]
fn test_unpriced_venue_scores_neutral_price() {
    let brief = create_brief(50, 3000.0, None);
    let venue = create_venue(1, (20, 100), None, Borough::Bronx);
    let (_, breakdown) = calculate_fit_score(
        &venue,
        &brief,
        &ScoringWeights::default(),
        &ScoringTuning::default(),
    );
    assert_eq!(breakdown.price, 50.0);
}

#[test]
fn test_min_spend_counts_as_price() {
    let brief = create_brief(50, 3000.0, None);
    let mut venue = create_venue(1, (20, 100), Some(1000.0), Borough::Bronx);
    venue.min_spend = Some(4500.0);
    assert_eq!(venue.price_signal(), Some(4500.0));

    let (_, breakdown) = calculate_fit_score(
        &venue,
        &brief,
        &ScoringWeights::default(),
        &ScoringTuning::default(),
    );
    assert_eq!(breakdown.price, 0.0);
}

#[test]
fn test_packed_venue_scores_lower_on_capacity() {
    let brief = create_brief(100, 5000.0, None);
    let roomy = create_venue(1, (50, 200), Some(3000.0), Borough::Queens);
    let packed = create_venue(2, (50, 100), Some(3000.0), Borough::Queens);

    let weights = ScoringWeights::default();
    let tuning = ScoringTuning::default();
    let (_, roomy_breakdown) = calculate_fit_score(&roomy, &brief, &weights, &tuning);
    let (_, packed_breakdown) = calculate_fit_score(&packed, &brief, &weights, &tuning);

    assert_eq!(roomy_breakdown.capacity, 100.0);
    assert_eq!(packed_breakdown.capacity, tuning.ceiling_score);
}

#[test]
fn test_scores_stay_within_bounds() {
    let mut brief = create_brief(60, 1000.0, Some(Borough::StatenIsland));
    brief.av_needs = AvNeeds::FullSetup;
    brief.accessibility_needs = Some("wheelchair access".to_string());

    let weights = ScoringWeights::default();
    let tuning = ScoringTuning::default();
    for (i, borough) in Borough::ALL.iter().enumerate() {
        let venue = create_venue(i as VenueId, (10, 60), Some(900.0 * i as f64), *borough);
        let (score, breakdown) = calculate_fit_score(&venue, &brief, &weights, &tuning);
        assert!((0.0..=100.0).contains(&score));
        for value in [breakdown.capacity, breakdown.price, breakdown.location, breakdown.amenity] {
            assert!((0.0..=100.0).contains(&value));
        }
    }
}

#[test]
fn test_custom_weights_change_order() {
    let brief = create_brief(50, 3000.0, Some(Borough::Manhattan));
    let venues = vec![
        create_venue(1, (20, 100), Some(3300.0), Borough::Manhattan),
        create_venue(2, (20, 100), Some(2500.0), Borough::Bronx),
    ];

    let default_run = Matcher::with_default_weights().find_matches(&brief, &venues);
    assert_eq!(default_run.ranked[0].venue.id, 1);

    let price_only = ScoringWeights {
        capacity: 0.0,
        price: 1.0,
        location: 0.0,
        amenity: 0.0,
    };
    let price_run = Matcher::new(price_only, ScoringTuning::default(), 10).find_matches(&brief, &venues);
    assert_eq!(price_run.ranked[0].venue.id, 2);
}

#[test]
fn test_ranking_is_reproducible_and_order_independent() {
    let brief = create_brief(50, 5000.0, Some(Borough::Brooklyn));
    let venues: Vec<Venue> = (1..=12)
        .map(|i| {
            let borough = Borough::ALL[i as usize % Borough::ALL.len()];
            create_venue(i, (20, 40 + (i as u32 % 4) * 10), Some(3000.0 + 250.0 * i as f64), borough)
        })
        .collect();
    let mut reversed = venues.clone();
    reversed.reverse();

    let matcher = Matcher::with_default_weights();
    let first = matcher.find_matches(&brief, &venues);
    let second = matcher.find_matches(&brief, &venues);
    let shuffled = matcher.find_matches(&brief, &reversed);

    let summary = |run: &venue_match::core::MatchRun| -> Vec<(VenueId, u32, f64)> {
        run.ranked.iter().map(|r| (r.venue.id, r.rank, r.score)).collect()
    };
    assert_eq!(summary(&first), summary(&second));
    assert_eq!(summary(&first), summary(&shuffled));
}

#[test]
fn test_ties_break_on_verification_then_id() {
    let brief = create_brief(50, 5000.0, None);
    let mut pending = create_venue(1, (20, 100), Some(3000.0), Borough::Queens);
    pending.verification_status = VerificationStatus::Pending;
    let verified_high_id = create_venue(9, (20, 100), Some(3000.0), Borough::Queens);
    let verified_low_id = create_venue(4, (20, 100), Some(3000.0), Borough::Queens);

    let run = Matcher::with_default_weights()
        .find_matches(&brief, &[pending, verified_high_id, verified_low_id]);

    let ids: Vec<VenueId> = run.ranked.iter().map(|r| r.venue.id).collect();
    assert_eq!(ids, vec![4, 9, 1]);
}

#[test]
fn test_results_capped_with_dense_ranks() {
    let brief = create_brief(30, 5000.0, None);
    let venues: Vec<Venue> = (1..=25)
        .map(|i| create_venue(i, (10, 200), Some(100.0 * i as f64), Borough::Queens))
        .collect();

    let run = Matcher::new(ScoringWeights::default(), ScoringTuning::default(), 5)
        .find_matches(&brief, &venues);

    assert_eq!(run.total_candidates, 25);
    assert_eq!(run.eligible, 25);
    let ranks: Vec<u32> = run.ranked.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_no_capacity_fit_yields_empty_outcome() {
    let brief = create_brief(500, 5000.0, None);
    let venues = vec![
        create_venue(1, (10, 80), Some(1000.0), Borough::Queens),
        create_venue(2, (20, 200), Some(2000.0), Borough::Manhattan),
    ];

    let run = Matcher::with_default_weights().find_matches(&brief, &venues);
    assert!(run.ranked.is_empty());
    assert_eq!(run.outcome(), MatchOutcome::NoEligibleVenues);
}

#[test]
fn test_availability_rules() {
    let mut brief = create_brief(50, 5000.0, None);
    let preferred = brief.date_preferred;

    let mut unknown = create_venue(1, (20, 100), Some(2000.0), Borough::Queens);
    unknown.availability = None;
    assert_eq!(check_eligibility(&unknown, &brief), Ok(Eligibility::Eligible));

    let mut booked = create_venue(2, (20, 100), Some(2000.0), Borough::Queens);
    booked.availability = blocked(&[preferred]);
    assert_eq!(
        check_eligibility(&booked, &brief),
        Ok(Eligibility::Excluded(Exclusion::Unavailable))
    );

    brief.date_flexible = true;
    assert_eq!(check_eligibility(&booked, &brief), Ok(Eligibility::Eligible));

    let week: Vec<NaiveDate> = (-3..=3)
        .map(|offset| preferred + chrono::Duration::days(offset))
        .collect();
    booked.availability = blocked(&week);
    assert_eq!(
        check_eligibility(&booked, &brief),
        Ok(Eligibility::Excluded(Exclusion::Unavailable))
    );
}

#[test]
fn test_rejected_and_broken_venues_are_skipped() {
    let brief = create_brief(50, 5000.0, None);

    let mut rejected = create_venue(1, (20, 100), Some(2000.0), Borough::Queens);
    rejected.verification_status = VerificationStatus::Rejected;
    assert_eq!(
        check_eligibility(&rejected, &brief),
        Ok(Eligibility::Excluded(Exclusion::Rejected))
    );

    let inverted = create_venue(2, (100, 20), Some(2000.0), Borough::Queens);
    assert!(matches!(
        check_eligibility(&inverted, &brief),
        Err(FilterDataError::InvertedCapacity { venue_id: 2, .. })
    ));

    let negative = create_venue(3, (20, 100), Some(-5.0), Borough::Queens);
    let good = create_venue(4, (20, 100), Some(2000.0), Borough::Queens);

    let run = Matcher::with_default_weights().find_matches(&brief, &[rejected, inverted, negative, good]);
    assert_eq!(run.ranked.len(), 1);
    assert_eq!(run.ranked[0].venue.id, 4);
    assert_eq!(run.corrupt, 2);
}

#[test]
fn test_fallback_explanation_cites_strengths_and_tensions() {
    let mut brief = create_brief(50, 2000.0, Some(Borough::Manhattan));
    brief.av_needs = AvNeeds::FullSetup;
    let venue = create_venue(1, (40, 60), Some(3500.0), Borough::Manhattan);

    let (_, breakdown) = calculate_fit_score(
        &venue,
        &brief,
        &ScoringWeights::default(),
        &ScoringTuning::default(),
    );
    let text = fallback_explanation(&venue, &brief, &breakdown);

    assert!(text.starts_with("• "));
    assert!(text.contains("Manhattan"));
    assert!(text.contains("However"));
    assert!(text.contains("$3,500"));
}

#[test]
fn test_fallback_explanation_flags_slightly_over_budget_venue() {
    let brief = create_brief(50, 2000.0, Some(Borough::Manhattan));
    let venue = create_venue(1, (40, 60), Some(2200.0), Borough::Manhattan);

    let (_, breakdown) = calculate_fit_score(
        &venue,
        &brief,
        &ScoringWeights::default(),
        &ScoringTuning::default(),
    );
    assert!(breakdown.price >= 50.0);

    let text = fallback_explanation(&venue, &brief, &breakdown);
    let over_budget: Vec<&str> = text.lines().filter(|l| l.contains("above your $2,000")).collect();

    assert_eq!(over_budget.len(), 1);
    assert!(over_budget[0].starts_with("• However: "));
}

#[test]
fn test_fallback_explanation_flags_missing_accessibility() {
    let mut brief = create_brief(50, 2000.0, Some(Borough::Manhattan));
    brief.av_needs = AvNeeds::BasicMic;
    brief.accessibility_needs = Some("wheelchair access".to_string());
    let mut venue = create_venue(1, (40, 60), Some(1800.0), Borough::Manhattan);
    venue.amenities = [Amenity::LightBites, Amenity::BeerWine, Amenity::Microphone].into();

    let (_, breakdown) = calculate_fit_score(
        &venue,
        &brief,
        &ScoringWeights::default(),
        &ScoringTuning::default(),
    );
    assert!(breakdown.amenity >= 50.0);

    let text = fallback_explanation(&venue, &brief, &breakdown);
    assert!(text.contains("• However: Does not list accessibility"));
    assert!(!text.contains("Offers"));
}

#[test]
fn test_fallback_explanation_never_empty() {
    let brief = create_brief(59, 100.0, Some(Borough::Bronx));
    let mut venue = create_venue(1, (10, 60), Some(900.0), Borough::StatenIsland);
    venue.amenities = BTreeSet::new();

    let (_, breakdown) = calculate_fit_score(
        &venue,
        &brief,
        &ScoringWeights::default(),
        &ScoringTuning::default(),
    );
    let text = fallback_explanation(&venue, &brief, &breakdown);
    assert!(!text.trim().is_empty());
}

#[test]
fn test_default_tuning_is_valid() {
    assert!(ScoringTuning::default().validate().is_ok());

    let flat = ScoringTuning {
        over_budget_zero_at: 10.0,
        ..ScoringTuning::default()
    };
    assert!(flat.validate().is_err());
}
