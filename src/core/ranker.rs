use crate::models::{RankedVenue, ScoredVenue, VerificationStatus};
use std::cmp::Ordering;

/// Default cap on the number of ranked venues a brief receives
pub const DEFAULT_MAX_RESULTS: usize = 10;

#[inline]
fn verification_order(status: VerificationStatus) -> u8 {
    match status {
        VerificationStatus::Verified => 0,
        VerificationStatus::Pending => 1,
        VerificationStatus::Rejected => 2,
    }
}

/// Total ordering used for ranking
///
/// Score descending, then capacity fit descending, then verified before pending,
/// then venue id ascending.
pub fn compare_scored(a: &ScoredVenue, b: &ScoredVenue) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.breakdown.capacity.total_cmp(&a.breakdown.capacity))
        .then_with(|| {
            verification_order(a.venue.verification_status)
                .cmp(&verification_order(b.venue.verification_status))
        })
        .then_with(|| a.venue.id.cmp(&b.venue.id))
}

/// Sort, cap, and assign dense 1-based ranks
pub fn rank_venues(mut scored: Vec<ScoredVenue>, max_results: usize) -> Vec<RankedVenue> {
    scored.sort_by(compare_scored);
    scored.truncate(max_results);

    scored
        .into_iter()
        .enumerate()
        .map(|(i, s)| RankedVenue {
            rank: i as u32 + 1,
            venue: s.venue,
            breakdown: s.breakdown,
            score: s.score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Borough, ScoreBreakdown, Venue, VenueId};
    use std::collections::BTreeSet;

    fn scored(id: VenueId, score: f64, capacity: f64, status: VerificationStatus) -> ScoredVenue {
        ScoredVenue {
            venue: Venue {
                id,
                name: format!("Venue {}", id),
                borough: Borough::Queens,
                neighborhood: None,
                capacity_min: 10,
                capacity_max: 100,
                base_price: None,
                min_spend: None,
                amenities: BTreeSet::new(),
                availability: None,
                verification_status: status,
            },
            breakdown: ScoreBreakdown {
                capacity,
                price: 50.0,
                location: 100.0,
                amenity: 100.0,
            },
            score,
        }
    }

    fn ids(ranked: &[RankedVenue]) -> Vec<VenueId> {
        ranked.iter().map(|r| r.venue.id).collect()
    }

    #[test]
    fn test_sorted_by_score_desc() {
        let ranked = rank_venues(
            vec![
                scored(1, 70.0, 100.0, VerificationStatus::Verified),
                scored(2, 90.5, 100.0, VerificationStatus::Verified),
                scored(3, 80.0, 100.0, VerificationStatus::Verified),
            ],
            10,
        );

        assert_eq!(ids(&ranked), vec![2, 3, 1]);
        assert_eq!(ranked.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_tie_break_capacity_then_verification_then_id() {
        let ranked = rank_venues(
            vec![
                scored(9, 80.0, 100.0, VerificationStatus::Pending),
                scored(4, 80.0, 100.0, VerificationStatus::Verified),
                scored(2, 80.0, 90.0, VerificationStatus::Verified),
                scored(7, 80.0, 100.0, VerificationStatus::Verified),
            ],
            10,
        );

        assert_eq!(ids(&ranked), vec![4, 7, 9, 2]);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let forward = vec![
            scored(1, 75.0, 100.0, VerificationStatus::Verified),
            scored(2, 75.0, 100.0, VerificationStatus::Verified),
            scored(3, 60.0, 80.0, VerificationStatus::Pending),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        assert_eq!(ids(&rank_venues(forward, 10)), ids(&rank_venues(backward, 10)));
    }

    #[test]
    fn test_truncates_to_max_results() {
        let venues: Vec<ScoredVenue> = (0..25)
            .map(|i| scored(i, 50.0 + i as f64, 100.0, VerificationStatus::Verified))
            .collect();

        let ranked = rank_venues(venues, DEFAULT_MAX_RESULTS);

        assert_eq!(ranked.len(), DEFAULT_MAX_RESULTS);
        assert_eq!(ranked[0].venue.id, 24);
        assert_eq!(ranked.last().map(|r| r.rank), Some(DEFAULT_MAX_RESULTS as u32));
    }

    #[test]
    fn test_empty_input() {
        assert!(rank_venues(Vec::new(), 10).is_empty());
    }
}
