use crate::models::{EventBrief, Factor, Requirement, ScoreBreakdown, Venue};

/// Sub-score at or above which a factor is cited as a strength
const STRONG_FACTOR: f64 = 75.0;
/// Sub-score below which a factor is cited as a tension
const WEAK_FACTOR: f64 = 50.0;

fn format_money(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

fn capacity_statement(venue: &Venue, brief: &EventBrief, score: f64) -> String {
    if score >= STRONG_FACTOR {
        format!(
            "Comfortably fits your {} guests (capacity {}-{})",
            brief.headcount, venue.capacity_min, venue.capacity_max
        )
    } else {
        format!(
            "{} guests is close to its {}-person limit",
            brief.headcount, venue.capacity_max
        )
    }
}

fn price_statement(venue: &Venue, brief: &EventBrief) -> String {
    let Some(price) = venue.price_signal() else {
        return "Pricing is not listed, so budget fit is unknown".to_string();
    };

    if price > brief.budget_max {
        return format!(
            "Pricing from {} is above your {} budget",
            format_money(price),
            format_money(brief.budget_max)
        );
    }

    match brief.budget_min {
        Some(min) if price < min => format!(
            "Pricing from {} sits below your {} minimum budget",
            format_money(price),
            format_money(min)
        ),
        _ => format!(
            "Pricing from {} is within your {} budget",
            format_money(price),
            format_money(brief.budget_max)
        ),
    }
}

/// The brief names a neighborhood and the venue lists a different one
fn misses_neighborhood(venue: &Venue, brief: &EventBrief) -> bool {
    match (brief.neighborhood(), venue.neighborhood.as_deref()) {
        (Some(wanted), Some(actual)) => !actual.to_lowercase().contains(&wanted.to_lowercase()),
        _ => false,
    }
}

fn location_statement(venue: &Venue, brief: &EventBrief) -> String {
    let place = match venue.neighborhood.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(neighborhood) => format!("{}, {}", neighborhood.trim(), venue.borough.display_name()),
        None => venue.borough.display_name().to_string(),
    };

    match brief.borough_pref {
        None => format!("Located in {}", place),
        Some(wanted) if wanted == venue.borough => match brief.neighborhood() {
            Some(neighborhood) if misses_neighborhood(venue, brief) => {
                format!("In {}, though not in {}", place, neighborhood)
            }
            _ => format!("Located in {}, your preferred area", place),
        },
        Some(wanted) if venue.borough.is_adjacent_to(wanted) => format!(
            "Located in {}, next door to your preferred {}",
            place,
            wanted.display_name()
        ),
        Some(wanted) => format!(
            "Located in {}, outside your preferred {}",
            place,
            wanted.display_name()
        ),
    }
}

fn amenity_statement(venue: &Venue, brief: &EventBrief) -> String {
    let requirements = brief.requirements();
    if requirements.is_empty() {
        return "No specific service requirements to check".to_string();
    }

    let (met, missing): (Vec<&Requirement>, Vec<&Requirement>) = requirements
        .iter()
        .partition(|r| r.satisfied_by(&venue.amenities));

    if missing.is_empty() {
        let labels: Vec<&str> = met.iter().map(|r| r.label()).collect();
        format!("Offers {}", join_labels(&labels))
    } else {
        let labels: Vec<&str> = missing.iter().map(|r| r.label()).collect();
        format!("Does not list {}", join_labels(&labels))
    }
}

fn join_labels(labels: &[&str]) -> String {
    match labels {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn factor_statement(factor: Factor, score: f64, venue: &Venue, brief: &EventBrief) -> String {
    match factor {
        Factor::Capacity => capacity_statement(venue, brief, score),
        Factor::Price => price_statement(venue, brief),
        Factor::Location => location_statement(venue, brief),
        Factor::Amenity => amenity_statement(venue, brief),
    }
}

/// Whether a factor works against the venue, judged from the facts as well as the sub-score
///
/// A venue over budget, missing a requested service, or outside the preferred
/// area is a tension even when its sub-score is still respectable.
fn is_tension(factor: Factor, score: f64, venue: &Venue, brief: &EventBrief) -> bool {
    if score < WEAK_FACTOR {
        return true;
    }

    match factor {
        Factor::Capacity => score < STRONG_FACTOR,
        Factor::Price => venue.price_signal().is_some_and(|price| {
            price > brief.budget_max || brief.budget_min.is_some_and(|min| price < min)
        }),
        Factor::Location => {
            brief.borough_pref.is_some_and(|wanted| wanted != venue.borough)
                || misses_neighborhood(venue, brief)
        }
        Factor::Amenity => brief
            .requirements()
            .iter()
            .any(|r| !r.satisfied_by(&venue.amenities)),
    }
}

/// Deterministic explanation built only from the breakdown, brief and venue
///
/// Strong factors with nothing working against them come first as strengths;
/// tensions follow, weakest first. A factor is never cited as both. The result
/// is never empty: when nothing stands out the best untroubled factor is cited.
pub fn fallback_explanation(venue: &Venue, brief: &EventBrief, breakdown: &ScoreBreakdown) -> String {
    let (tensions, untroubled): (Vec<(Factor, f64)>, Vec<(Factor, f64)>) = breakdown
        .ranked_factors()
        .into_iter()
        .partition(|(factor, score)| is_tension(*factor, *score, venue, brief));

    let mut strengths: Vec<String> = untroubled
        .iter()
        .filter(|(_, score)| *score >= STRONG_FACTOR)
        .map(|(factor, score)| factor_statement(*factor, *score, venue, brief))
        .collect();

    if strengths.is_empty() {
        if let Some((factor, score)) = untroubled.first() {
            strengths.push(factor_statement(*factor, *score, venue, brief));
        }
    }

    let tension_prefix = if strengths.is_empty() { "• " } else { "• However: " };
    let mut lines: Vec<String> = strengths.into_iter().map(|s| format!("• {}", s)).collect();
    lines.extend(tensions.iter().rev().map(|(factor, score)| {
        format!(
            "{}{}",
            tension_prefix,
            factor_statement(*factor, *score, venue, brief)
        )
    }));
    lines.join("\n")
}

/// One-paragraph description of a brief for an explanation prompt
pub fn summarize_brief(brief: &EventBrief) -> String {
    let mut parts = vec![
        format!("Event type: {}", brief.event_type),
        format!("Guests: {}", brief.headcount),
        format!(
            "Date: {}{}",
            brief.date_preferred,
            if brief.date_flexible { " (flexible)" } else { "" }
        ),
        match brief.budget_min {
            Some(min) => format!(
                "Budget: {}-{}",
                format_money(min),
                format_money(brief.budget_max)
            ),
            None => format!("Budget: up to {}", format_money(brief.budget_max)),
        },
    ];

    if let Some(borough) = brief.borough_pref {
        let area = match brief.neighborhood() {
            Some(neighborhood) => format!("{}, {}", neighborhood, borough.display_name()),
            None => borough.display_name().to_string(),
        };
        parts.push(format!("Preferred area: {}", area));
    }

    let requirements = brief.requirements();
    if !requirements.is_empty() {
        let labels: Vec<&str> = requirements.iter().map(|r| r.label()).collect();
        parts.push(format!("Needs: {}", join_labels(&labels)));
    }

    for (label, value) in [
        ("Accessibility", &brief.accessibility_needs),
        ("Vibe", &brief.vibe),
        ("Notes", &brief.notes),
    ] {
        if let Some(text) = value.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            parts.push(format!("{}: {}", label, text));
        }
    }

    parts.join("\n")
}

/// One-paragraph description of a venue for an explanation prompt
pub fn summarize_venue(venue: &Venue) -> String {
    let mut parts = vec![
        format!("Name: {}", venue.name),
        format!(
            "Location: {}{}",
            venue
                .neighborhood
                .as_deref()
                .map(|n| format!("{}, ", n.trim()))
                .unwrap_or_default(),
            venue.borough.display_name()
        ),
        format!("Capacity: {}-{}", venue.capacity_min, venue.capacity_max),
    ];

    match venue.price_signal() {
        Some(price) => parts.push(format!("Pricing from: {}", format_money(price))),
        None => parts.push("Pricing: not listed".to_string()),
    }

    if !venue.amenities.is_empty() {
        let amenities: Vec<&str> = venue.amenities.iter().map(|a| a.as_str()).collect();
        parts.push(format!("Amenities: {}", amenities.join(", ")));
    }

    parts.join("\n")
}
