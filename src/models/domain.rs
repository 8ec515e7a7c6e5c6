use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub type BriefId = i64;
pub type VenueId = i64;

/// A stored string did not name any variant of the expected enum
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed enum that round-trips through its snake_case database/JSON spelling.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Type of event
    EventType {
        Corporate => "corporate",
        Wedding => "wedding",
        Birthday => "birthday",
        Anniversary => "anniversary",
        Networking => "networking",
        Conference => "conference",
        Other => "other",
    }
);

string_enum!(
    /// NYC boroughs
    Borough {
        Manhattan => "manhattan",
        Brooklyn => "brooklyn",
        Queens => "queens",
        Bronx => "bronx",
        StatenIsland => "staten_island",
    }
);

impl Borough {
    pub fn display_name(&self) -> &'static str {
        match self {
            Borough::Manhattan => "Manhattan",
            Borough::Brooklyn => "Brooklyn",
            Borough::Queens => "Queens",
            Borough::Bronx => "the Bronx",
            Borough::StatenIsland => "Staten Island",
        }
    }

    /// Boroughs close enough that hosts routinely consider either one
    pub fn is_adjacent_to(&self, other: Borough) -> bool {
        matches!(
            (self, other),
            (Borough::Manhattan, Borough::Brooklyn) | (Borough::Brooklyn, Borough::Manhattan)
        )
    }
}

string_enum!(
    /// Food and beverage service level
    FoodBevLevel {
        None => "none",
        LightBites => "light_bites",
        FullCatering => "full_catering",
    }
);

string_enum!(
    /// Alcohol service level
    AlcoholLevel {
        None => "none",
        BeerWine => "beer_wine",
        FullBar => "full_bar",
    }
);

string_enum!(
    /// Audio/visual requirements
    AvNeeds {
        None => "none",
        BasicMic => "basic_mic",
        FullSetup => "full_setup",
    }
);

impl Default for FoodBevLevel {
    fn default() -> Self {
        FoodBevLevel::None
    }
}

impl Default for AlcoholLevel {
    fn default() -> Self {
        AlcoholLevel::None
    }
}

impl Default for AvNeeds {
    fn default() -> Self {
        AvNeeds::None
    }
}

string_enum!(
    /// Venue vetting state
    VerificationStatus {
        Pending => "pending",
        Verified => "verified",
        Rejected => "rejected",
    }
);

string_enum!(
    /// Amenities a venue can advertise
    Amenity {
        Kitchen => "kitchen",
        InHouseCatering => "in_house_catering",
        LightBites => "light_bites",
        BeerWine => "beer_wine",
        FullBar => "full_bar",
        Microphone => "microphone",
        AvSystem => "av_system",
        Projector => "projector",
        WheelchairAccessible => "wheelchair_accessible",
        Wifi => "wifi",
        Parking => "parking",
        Outdoor => "outdoor",
    }
);

string_enum!(
    /// Where a stored explanation came from
    ExplanationSource {
        Generated => "generated",
        Fallback => "fallback",
    }
);

string_enum!(
    /// Whether a matching run found anything
    MatchOutcome {
        Matched => "matched",
        NoEligibleVenues => "no_eligible_venues",
    }
);

/// Host's structured statement of event requirements
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_budget"))]
pub struct EventBrief {
    pub id: BriefId,
    pub event_type: EventType,
    #[validate(range(min = 1, message = "headcount must be positive"))]
    pub headcount: u32,
    pub date_preferred: NaiveDate,
    #[serde(default)]
    pub date_flexible: bool,
    #[serde(default)]
    pub borough_pref: Option<Borough>,
    #[serde(default)]
    pub neighborhood_pref: Option<String>,
    #[serde(default)]
    pub budget_min: Option<f64>,
    pub budget_max: f64,
    #[serde(default)]
    pub food_bev_level: FoodBevLevel,
    #[serde(default)]
    pub alcohol_level: AlcoholLevel,
    #[serde(default)]
    pub av_needs: AvNeeds,
    #[serde(default)]
    pub accessibility_needs: Option<String>,
    #[serde(default)]
    pub vibe: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Revision marker; a host edit moves it forward
    pub updated_at: DateTime<Utc>,
}

fn validate_budget(brief: &EventBrief) -> Result<(), ValidationError> {
    if !brief.budget_max.is_finite() || brief.budget_max < 0.0 {
        return Err(ValidationError::new("budget_max_invalid"));
    }

    if let Some(min) = brief.budget_min {
        if !min.is_finite() || min < 0.0 {
            return Err(ValidationError::new("budget_min_invalid"));
        }
        if min > brief.budget_max {
            return Err(ValidationError::new("budget_range_inverted"));
        }
    }

    Ok(())
}

impl EventBrief {
    /// Explicit service requirements, in a fixed order
    pub fn requirements(&self) -> Vec<Requirement> {
        let mut requirements = Vec::with_capacity(4);

        if self.food_bev_level != FoodBevLevel::None {
            requirements.push(Requirement::FoodBev(self.food_bev_level));
        }
        if self.alcohol_level != AlcoholLevel::None {
            requirements.push(Requirement::Alcohol(self.alcohol_level));
        }
        if self.av_needs != AvNeeds::None {
            requirements.push(Requirement::Av(self.av_needs));
        }
        if self
            .accessibility_needs
            .as_deref()
            .is_some_and(|notes| !notes.trim().is_empty())
        {
            requirements.push(Requirement::Accessibility);
        }

        requirements
    }

    pub fn neighborhood(&self) -> Option<&str> {
        self.neighborhood_pref
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// A single service requirement derived from a brief
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    FoodBev(FoodBevLevel),
    Alcohol(AlcoholLevel),
    Av(AvNeeds),
    Accessibility,
}

impl Requirement {
    pub fn satisfied_by(&self, amenities: &BTreeSet<Amenity>) -> bool {
        let any = |options: &[Amenity]| options.iter().any(|a| amenities.contains(a));

        match self {
            Requirement::FoodBev(FoodBevLevel::None)
            | Requirement::Alcohol(AlcoholLevel::None)
            | Requirement::Av(AvNeeds::None) => true,
            Requirement::FoodBev(FoodBevLevel::LightBites) => {
                any(&[Amenity::LightBites, Amenity::InHouseCatering, Amenity::Kitchen])
            }
            Requirement::FoodBev(FoodBevLevel::FullCatering) => {
                any(&[Amenity::InHouseCatering, Amenity::Kitchen])
            }
            Requirement::Alcohol(AlcoholLevel::BeerWine) => {
                any(&[Amenity::BeerWine, Amenity::FullBar])
            }
            Requirement::Alcohol(AlcoholLevel::FullBar) => any(&[Amenity::FullBar]),
            Requirement::Av(AvNeeds::BasicMic) => any(&[Amenity::Microphone, Amenity::AvSystem]),
            Requirement::Av(AvNeeds::FullSetup) => any(&[Amenity::AvSystem]),
            Requirement::Accessibility => any(&[Amenity::WheelchairAccessible]),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Requirement::FoodBev(FoodBevLevel::None)
            | Requirement::Alcohol(AlcoholLevel::None)
            | Requirement::Av(AvNeeds::None) => "nothing",
            Requirement::FoodBev(FoodBevLevel::LightBites) => "light bites",
            Requirement::FoodBev(FoodBevLevel::FullCatering) => "full catering",
            Requirement::Alcohol(AlcoholLevel::BeerWine) => "beer and wine",
            Requirement::Alcohol(AlcoholLevel::FullBar) => "a full bar",
            Requirement::Av(AvNeeds::BasicMic) => "a microphone",
            Requirement::Av(AvNeeds::FullSetup) => "a full AV setup",
            Requirement::Accessibility => "accessibility",
        }
    }
}

/// Dates a venue has marked as unavailable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityCalendar {
    #[serde(default)]
    pub blocked_dates: BTreeSet<NaiveDate>,
}

impl AvailabilityCalendar {
    pub fn is_open_on(&self, date: NaiveDate) -> bool {
        !self.blocked_dates.contains(&date)
    }

    /// True when any date within `window_days` of `date` (inclusive) is open
    pub fn has_open_date_near(&self, date: NaiveDate, window_days: i64) -> bool {
        (-window_days..=window_days)
            .filter_map(|offset| date.checked_add_signed(Duration::days(offset)))
            .any(|d| self.is_open_on(d))
    }
}

/// Catalog entry for a venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    pub borough: Borough,
    #[serde(default)]
    pub neighborhood: Option<String>,
    pub capacity_min: u32,
    pub capacity_max: u32,
    #[serde(default)]
    pub base_price: Option<f64>,
    #[serde(default)]
    pub min_spend: Option<f64>,
    #[serde(default)]
    pub amenities: BTreeSet<Amenity>,
    /// `None` means the venue has not shared availability data
    #[serde(default)]
    pub availability: Option<AvailabilityCalendar>,
    pub verification_status: VerificationStatus,
}

impl Venue {
    /// Cost estimate used for price fit: the higher of base price and minimum spend
    pub fn price_signal(&self) -> Option<f64> {
        match (self.base_price, self.min_spend) {
            (Some(base), Some(min_spend)) => Some(base.max(min_spend)),
            (Some(base), None) => Some(base),
            (None, Some(min_spend)) => Some(min_spend),
            (None, None) => None,
        }
    }
}

string_enum!(
    /// The four weighted components of a fit score
    Factor {
        Capacity => "capacity",
        Price => "price",
        Location => "location",
        Amenity => "amenity",
    }
);

/// Per-factor sub-scores, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub capacity: f64,
    pub price: f64,
    pub location: f64,
    pub amenity: f64,
}

impl ScoreBreakdown {
    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Capacity => self.capacity,
            Factor::Price => self.price,
            Factor::Location => self.location,
            Factor::Amenity => self.amenity,
        }
    }

    /// Factors ordered by sub-score, highest first; equal scores keep declaration order
    pub fn ranked_factors(&self) -> Vec<(Factor, f64)> {
        let mut factors: Vec<(Factor, f64)> =
            Factor::ALL.iter().map(|f| (*f, self.get(*f))).collect();
        factors.sort_by(|a, b| b.1.total_cmp(&a.1));
        factors
    }
}

/// Scoring weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub capacity: f64,
    pub price: f64,
    pub location: f64,
    pub amenity: f64,
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.capacity + self.price + self.location + self.amenity
    }

    pub fn is_valid(&self) -> bool {
        let parts = [self.capacity, self.price, self.location, self.amenity];
        parts.iter().all(|w| w.is_finite() && *w >= 0.0) && self.total() > 0.0
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            capacity: 0.30,
            price: 0.25,
            location: 0.25,
            amenity: 0.20,
        }
    }
}

/// Eligible venue with its fit score
#[derive(Debug, Clone)]
pub struct ScoredVenue {
    pub venue: Venue,
    pub breakdown: ScoreBreakdown,
    pub score: f64,
}

/// Scored venue after ranking
#[derive(Debug, Clone)]
pub struct RankedVenue {
    pub rank: u32,
    pub venue: Venue,
    pub breakdown: ScoreBreakdown,
    pub score: f64,
}

/// Persisted row for one ranked venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub venue_id: VenueId,
    pub venue_name: String,
    pub rank: u32,
    pub score: f64,
    pub explanation: String,
    pub explanation_source: ExplanationSource,
    pub generated_at: DateTime<Utc>,
}

/// The current ranked shortlist for a brief
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultSet {
    pub brief_id: BriefId,
    pub run_id: Uuid,
    /// `updated_at` of the brief this set was computed from
    pub brief_revision: DateTime<Utc>,
    pub outcome: MatchOutcome,
    pub candidate_count: u32,
    pub eligible_count: u32,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<MatchResult>,
}

impl MatchResultSet {
    pub fn no_eligible_venues(&self) -> bool {
        self.outcome == MatchOutcome::NoEligibleVenues
    }

    /// Ranks are exactly 1..=k and scores never increase with rank
    pub fn is_consistent(&self) -> bool {
        let dense = self
            .results
            .iter()
            .enumerate()
            .all(|(i, r)| r.rank as usize == i + 1);
        let sorted = self
            .results
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score);
        let outcome_matches = self.results.is_empty() == self.no_eligible_venues();

        dense && sorted && outcome_matches
    }
}

/// What GetMatches can observe for a brief
#[derive(Debug, Clone, PartialEq)]
pub enum MatchLookup {
    NotComputed,
    Computing,
    Available(MatchResultSet),
}
