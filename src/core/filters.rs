use crate::models::{EventBrief, Venue, VenueId, VerificationStatus};
use thiserror::Error;

/// Days either side of the preferred date a flexible brief will accept
pub const FLEXIBLE_DATE_WINDOW_DAYS: i64 = 3;

/// A venue record too broken to evaluate; the venue is skipped, the run continues
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterDataError {
    #[error("venue {venue_id}: capacity range {min}-{max} is inverted")]
    InvertedCapacity { venue_id: VenueId, min: u32, max: u32 },

    #[error("venue {venue_id}: capacity_max is zero")]
    ZeroCapacity { venue_id: VenueId },

    #[error("venue {venue_id}: {field} {value} is not a valid price")]
    InvalidPrice {
        venue_id: VenueId,
        field: &'static str,
        value: f64,
    },

    #[error("venue {venue_id}: {reason}")]
    Undecodable { venue_id: VenueId, reason: String },
}

/// Hard constraint a venue failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    OutsideCapacity,
    Unavailable,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Excluded(Exclusion),
}

/// Venues that survived the filter, plus counts of what did not
#[derive(Debug)]
pub struct FilterOutcome<'a> {
    pub eligible: Vec<&'a Venue>,
    pub excluded: usize,
    pub corrupt: usize,
}

/// Reject venue records whose fields cannot be reasoned about
pub fn validate_venue(venue: &Venue) -> Result<(), FilterDataError> {
    if venue.capacity_max == 0 {
        return Err(FilterDataError::ZeroCapacity { venue_id: venue.id });
    }

    if venue.capacity_min > venue.capacity_max {
        return Err(FilterDataError::InvertedCapacity {
            venue_id: venue.id,
            min: venue.capacity_min,
            max: venue.capacity_max,
        });
    }

    for (field, value) in [("base_price", venue.base_price), ("min_spend", venue.min_spend)] {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                return Err(FilterDataError::InvalidPrice {
                    venue_id: venue.id,
                    field,
                    value,
                });
            }
        }
    }

    Ok(())
}

#[inline]
pub fn fits_headcount(venue: &Venue, headcount: u32) -> bool {
    venue.capacity_min <= headcount && headcount <= venue.capacity_max
}

/// Missing availability data never excludes a venue
#[inline]
pub fn is_available_for(venue: &Venue, brief: &EventBrief) -> bool {
    let Some(calendar) = &venue.availability else {
        return true;
    };

    if calendar.is_open_on(brief.date_preferred) {
        return true;
    }

    brief.date_flexible
        && calendar.has_open_date_near(brief.date_preferred, FLEXIBLE_DATE_WINDOW_DAYS)
}

/// Apply every hard constraint to a single venue
pub fn check_eligibility(venue: &Venue, brief: &EventBrief) -> Result<Eligibility, FilterDataError> {
    validate_venue(venue)?;

    if venue.verification_status == VerificationStatus::Rejected {
        return Ok(Eligibility::Excluded(Exclusion::Rejected));
    }

    if !fits_headcount(venue, brief.headcount) {
        return Ok(Eligibility::Excluded(Exclusion::OutsideCapacity));
    }

    if !is_available_for(venue, brief) {
        return Ok(Eligibility::Excluded(Exclusion::Unavailable));
    }

    Ok(Eligibility::Eligible)
}

/// Reduce the catalog to venues that could possibly host the brief
pub fn filter_eligible<'a>(brief: &EventBrief, venues: &'a [Venue]) -> FilterOutcome<'a> {
    let mut outcome = FilterOutcome {
        eligible: Vec::with_capacity(venues.len()),
        excluded: 0,
        corrupt: 0,
    };

    for venue in venues {
        match check_eligibility(venue, brief) {
            Ok(Eligibility::Eligible) => outcome.eligible.push(venue),
            Ok(Eligibility::Excluded(reason)) => {
                tracing::trace!("Brief {}: venue {} excluded ({:?})", brief.id, venue.id, reason);
                outcome.excluded += 1;
            }
            Err(e) => {
                tracing::warn!("Brief {}: skipping venue with bad data: {}", brief.id, e);
                outcome.corrupt += 1;
            }
        }
    }

    outcome
}
