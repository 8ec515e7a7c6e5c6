use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::catalog::{CatalogError, CatalogReader};
use super::store::{MatchResultStore, StoreError, WriteOutcome};
use crate::config::DatabaseSettings;
use crate::core::filters::{FilterDataError, FLEXIBLE_DATE_WINDOW_DAYS};
use crate::models::{
    Amenity, AvailabilityCalendar, BriefId, EventBrief, MatchResult, MatchResultSet,
    UnknownVariant, Venue, VenueId,
};

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<PostgresError> for CatalogError {
    fn from(e: PostgresError) -> Self {
        CatalogError::Unavailable(e.to_string())
    }
}

impl From<PostgresError> for StoreError {
    fn from(e: PostgresError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// PostgreSQL access for the venue catalog and the match tables
///
/// Catalog tables (`event_briefs`, `venues`, `venue_amenities`,
/// `venue_availability`, `venue_blocked_dates`) belong to the marketplace and
/// are only read here. `match_runs` and `match_results` are owned by this
/// service and created by the embedded migrations.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(url: &str, settings: &DatabaseSettings) -> Result<Self, PostgresError> {
        tracing::info!(
            "Connecting to PostgreSQL (max {} connections)",
            settings.max_connections
        );

        Self::new(
            url,
            settings.max_connections,
            settings.min_connections,
            Duration::from_secs(settings.acquire_timeout_secs),
            Duration::from_secs(settings.idle_timeout_secs),
        )
        .await
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, PostgresError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }

    async fn fetch_brief(&self, brief_id: BriefId) -> Result<Option<PgRow>, PostgresError> {
        let query = r#"
            SELECT id::bigint AS id, event_type::text AS event_type, headcount::bigint AS headcount,
                   date_preferred, COALESCE(date_flexible, false) AS date_flexible,
                   borough_pref::text AS borough_pref, neighborhood_pref,
                   budget_min::float8 AS budget_min, budget_max::float8 AS budget_max,
                   food_bev_level::text AS food_bev_level, alcohol_level::text AS alcohol_level,
                   av_needs::text AS av_needs, accessibility_needs, vibe, notes,
                   updated_at::timestamptz AS updated_at
            FROM event_briefs
            WHERE id = $1
        "#;

        Ok(sqlx::query(query)
            .bind(brief_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn read_snapshot(&self, around: NaiveDate) -> Result<Vec<Venue>, PostgresError> {
        let window = ChronoDuration::days(FLEXIBLE_DATE_WINDOW_DAYS);
        let from = around - window;
        let to = around + window;

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let venue_rows = sqlx::query(
            r#"
            SELECT id::bigint AS id, name, borough::text AS borough, neighborhood,
                   capacity_min::bigint AS capacity_min, capacity_max::bigint AS capacity_max,
                   base_price::float8 AS base_price, min_spend::float8 AS min_spend,
                   COALESCE(verification_status::text, 'pending') AS verification_status
            FROM venues
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let amenity_rows = sqlx::query(
            "SELECT venue_id::bigint AS venue_id, amenity_type::text AS amenity_type FROM venue_amenities",
        )
        .fetch_all(&mut *tx)
        .await?;

        let calendar_rows = sqlx::query(
            "SELECT venue_id::bigint AS venue_id FROM venue_availability WHERE sync_status = 'synced'",
        )
        .fetch_all(&mut *tx)
        .await?;

        let blocked_rows = sqlx::query(
            r#"
            SELECT venue_id::bigint AS venue_id, blocked_date
            FROM venue_blocked_dates
            WHERE blocked_date BETWEEN $1 AND $2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut amenities = group_amenities(keep_decoded(
            amenity_rows.iter().map(|row| -> Result<(VenueId, String), sqlx::Error> {
                Ok((row.try_get("venue_id")?, row.try_get("amenity_type")?))
            }),
            "venue_amenities",
        ));
        let synced: HashSet<VenueId> = keep_decoded(
            calendar_rows.iter().map(|row| row.try_get::<i64, _>("venue_id")),
            "venue_availability",
        )
        .into_iter()
        .collect();
        let mut blocked: HashMap<VenueId, BTreeSet<NaiveDate>> = HashMap::new();
        for (venue_id, date) in keep_decoded(
            blocked_rows.iter().map(|row| -> Result<(VenueId, NaiveDate), sqlx::Error> {
                Ok((row.try_get("venue_id")?, row.try_get("blocked_date")?))
            }),
            "venue_blocked_dates",
        ) {
            blocked.entry(venue_id).or_default().insert(date);
        }

        let mut venues = Vec::with_capacity(venue_rows.len());
        for row in &venue_rows {
            match decode_venue(row) {
                Ok(mut venue) => {
                    let venue_id = venue.id;
                    venue.amenities = amenities.remove(&venue_id).unwrap_or_default();
                    if synced.contains(&venue_id) {
                        venue.availability = Some(AvailabilityCalendar {
                            blocked_dates: blocked.remove(&venue_id).unwrap_or_default(),
                        });
                    }
                    venues.push(venue);
                }
                Err(reason) => match column::<VenueId>(row, "id") {
                    Ok(venue_id) => {
                        let e = FilterDataError::Undecodable { venue_id, reason };
                        tracing::warn!("Skipping venue row: {}", e);
                    }
                    Err(_) => tracing::warn!("Skipping venue row without an id: {}", reason),
                },
            }
        }

        tracing::debug!("Read catalog snapshot of {} venues around {}", venues.len(), around);
        Ok(venues)
    }

    async fn write_set(&self, set: &MatchResultSet) -> Result<WriteOutcome, PostgresError> {
        let mut tx = self.pool.begin().await?;

        // Serialize writers for the same brief
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(set.brief_id)
            .execute(&mut *tx)
            .await?;

        let upsert = r#"
            INSERT INTO match_runs
                (brief_id, run_id, brief_revision, outcome, candidate_count, eligible_count, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (brief_id) DO UPDATE SET
                run_id = EXCLUDED.run_id,
                brief_revision = EXCLUDED.brief_revision,
                outcome = EXCLUDED.outcome,
                candidate_count = EXCLUDED.candidate_count,
                eligible_count = EXCLUDED.eligible_count,
                generated_at = EXCLUDED.generated_at
            WHERE (match_runs.brief_revision, match_runs.generated_at)
                  <= (EXCLUDED.brief_revision, EXCLUDED.generated_at)
        "#;

        let applied = sqlx::query(upsert)
            .bind(set.brief_id)
            .bind(set.run_id)
            .bind(set.brief_revision)
            .bind(set.outcome.as_str())
            .bind(set.candidate_count as i32)
            .bind(set.eligible_count as i32)
            .bind(set.generated_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if applied == 0 {
            tx.rollback().await?;
            return Ok(WriteOutcome::Superseded);
        }

        sqlx::query("DELETE FROM match_results WHERE brief_id = $1")
            .bind(set.brief_id)
            .execute(&mut *tx)
            .await?;

        if !set.results.is_empty() {
            let ranks: Vec<i32> = set.results.iter().map(|r| r.rank as i32).collect();
            let venue_ids: Vec<i64> = set.results.iter().map(|r| r.venue_id).collect();
            let names: Vec<String> = set.results.iter().map(|r| r.venue_name.clone()).collect();
            let scores: Vec<f64> = set.results.iter().map(|r| r.score).collect();
            let texts: Vec<String> = set.results.iter().map(|r| r.explanation.clone()).collect();
            let sources: Vec<String> = set
                .results
                .iter()
                .map(|r| r.explanation_source.as_str().to_string())
                .collect();
            let stamps: Vec<DateTime<Utc>> = set.results.iter().map(|r| r.generated_at).collect();

            sqlx::query(
                r#"
                INSERT INTO match_results
                    (brief_id, rank, venue_id, venue_name, score, explanation, explanation_source, generated_at)
                SELECT $1, * FROM UNNEST($2::int4[], $3::int8[], $4::text[], $5::float8[],
                                         $6::text[], $7::text[], $8::timestamptz[])
                "#,
            )
            .bind(set.brief_id)
            .bind(ranks)
            .bind(venue_ids)
            .bind(names)
            .bind(scores)
            .bind(texts)
            .bind(sources)
            .bind(stamps)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Stored {} matches for brief {} (run {})",
            set.results.len(),
            set.brief_id,
            set.run_id
        );
        Ok(WriteOutcome::Applied)
    }

    async fn read_set(&self, brief_id: BriefId) -> Result<Option<MatchResultSet>, PostgresError> {
        // One statement, so the run header and its rows come from the same snapshot
        let query = r#"
            SELECT r.run_id, r.brief_revision, r.outcome, r.candidate_count, r.eligible_count,
                   r.generated_at, m.rank, m.venue_id, m.venue_name, m.score, m.explanation,
                   m.explanation_source, m.generated_at AS result_generated_at
            FROM match_runs r
            LEFT JOIN match_results m ON m.brief_id = r.brief_id
            WHERE r.brief_id = $1
            ORDER BY m.rank
        "#;

        let rows = sqlx::query(query).bind(brief_id).fetch_all(&self.pool).await?;
        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let outcome: String = field(first, "outcome")?;
        let mut set = MatchResultSet {
            brief_id,
            run_id: field::<Uuid>(first, "run_id")?,
            brief_revision: field(first, "brief_revision")?,
            outcome: outcome.parse().map_err(decode_error)?,
            candidate_count: field::<i32>(first, "candidate_count")?.max(0) as u32,
            eligible_count: field::<i32>(first, "eligible_count")?.max(0) as u32,
            generated_at: field(first, "generated_at")?,
            results: Vec::with_capacity(rows.len()),
        };

        for row in &rows {
            let Some(rank) = field::<Option<i32>>(row, "rank")? else {
                continue;
            };
            let source: String = field(row, "explanation_source")?;
            set.results.push(MatchResult {
                venue_id: field(row, "venue_id")?,
                venue_name: field(row, "venue_name")?,
                rank: rank.max(0) as u32,
                score: field(row, "score")?,
                explanation: field(row, "explanation")?,
                explanation_source: source.parse().map_err(decode_error)?,
                generated_at: field(row, "result_generated_at")?,
            });
        }

        Ok(Some(set))
    }

    async fn delete_set(&self, brief_id: BriefId) -> Result<bool, PostgresError> {
        let result = sqlx::query("DELETE FROM match_runs WHERE brief_id = $1")
            .bind(brief_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CatalogReader for PostgresClient {
    async fn get_brief(&self, brief_id: BriefId) -> Result<Option<EventBrief>, CatalogError> {
        let Some(row) = self.fetch_brief(brief_id).await? else {
            return Ok(None);
        };

        decode_brief(&row)
            .map(Some)
            .map_err(|reason| CatalogError::CorruptBrief { brief_id, reason })
    }

    async fn venue_snapshot(&self, around: NaiveDate) -> Result<Vec<Venue>, CatalogError> {
        Ok(self.read_snapshot(around).await?)
    }
}

#[async_trait]
impl MatchResultStore for PostgresClient {
    async fn replace(&self, set: &MatchResultSet) -> Result<WriteOutcome, StoreError> {
        Ok(self.write_set(set).await?)
    }

    async fn current(&self, brief_id: BriefId) -> Result<Option<MatchResultSet>, StoreError> {
        self.read_set(brief_id).await.map_err(|e| match e {
            PostgresError::Decode(reason) => StoreError::Corrupt { brief_id, reason },
            other => other.into(),
        })
    }

    async fn invalidate(&self, brief_id: BriefId) -> Result<bool, StoreError> {
        Ok(self.delete_set(brief_id).await?)
    }
}

fn decode_error(e: UnknownVariant) -> PostgresError {
    PostgresError::Decode(e.to_string())
}

fn field<'r, T>(row: &'r PgRow, name: &str) -> Result<T, PostgresError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    column(row, name).map_err(PostgresError::Decode)
}

/// Keep the rows that decoded, logging and dropping the rest
fn keep_decoded<T, I>(rows: I, table: &str) -> Vec<T>
where
    I: IntoIterator<Item = Result<T, sqlx::Error>>,
{
    rows.into_iter()
        .filter_map(|row| match row {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Skipping undecodable {} row: {}", table, e);
                None
            }
        })
        .collect()
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, String>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| format!("{}: {}", name, e))
}

fn enum_column<T>(row: &PgRow, name: &str) -> Result<T, String>
where
    T: FromStr<Err = UnknownVariant>,
{
    column::<String>(row, name)?.parse().map_err(|e: UnknownVariant| e.to_string())
}

fn optional_enum_column<T>(row: &PgRow, name: &str) -> Result<Option<T>, String>
where
    T: FromStr<Err = UnknownVariant>,
{
    column::<Option<String>>(row, name)?
        .map(|s| s.parse().map_err(|e: UnknownVariant| e.to_string()))
        .transpose()
}

fn count_column(row: &PgRow, name: &str) -> Result<u32, String> {
    let value: i64 = column(row, name)?;
    u32::try_from(value).map_err(|_| format!("{}: {} out of range", name, value))
}

fn decode_brief(row: &PgRow) -> Result<EventBrief, String> {
    Ok(EventBrief {
        id: column(row, "id")?,
        event_type: enum_column(row, "event_type")?,
        headcount: count_column(row, "headcount")?,
        date_preferred: column(row, "date_preferred")?,
        date_flexible: column(row, "date_flexible")?,
        borough_pref: optional_enum_column(row, "borough_pref")?,
        neighborhood_pref: column(row, "neighborhood_pref")?,
        budget_min: column(row, "budget_min")?,
        budget_max: column(row, "budget_max")?,
        food_bev_level: optional_enum_column(row, "food_bev_level")?.unwrap_or_default(),
        alcohol_level: optional_enum_column(row, "alcohol_level")?.unwrap_or_default(),
        av_needs: optional_enum_column(row, "av_needs")?.unwrap_or_default(),
        accessibility_needs: column(row, "accessibility_needs")?,
        vibe: column(row, "vibe")?,
        notes: column(row, "notes")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn decode_venue(row: &PgRow) -> Result<Venue, String> {
    Ok(Venue {
        id: column(row, "id")?,
        name: column(row, "name")?,
        borough: enum_column(row, "borough")?,
        neighborhood: column(row, "neighborhood")?,
        capacity_min: count_column(row, "capacity_min")?,
        capacity_max: count_column(row, "capacity_max")?,
        base_price: column(row, "base_price")?,
        min_spend: column(row, "min_spend")?,
        amenities: BTreeSet::new(),
        availability: None,
        verification_status: enum_column(row, "verification_status")?,
    })
}

/// Group amenity rows by venue, dropping amenity names the engine does not know
fn group_amenities<I>(rows: I) -> HashMap<VenueId, BTreeSet<Amenity>>
where
    I: IntoIterator<Item = (VenueId, String)>,
{
    let mut grouped: HashMap<VenueId, BTreeSet<Amenity>> = HashMap::new();
    for (venue_id, name) in rows {
        match name.parse::<Amenity>() {
            Ok(amenity) => {
                grouped.entry(venue_id).or_default().insert(amenity);
            }
            Err(e) => tracing::trace!("Venue {}: ignoring amenity ({})", venue_id, e),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_amenities_skips_unknown() {
        let grouped = group_amenities(vec![
            (1, "wifi".to_string()),
            (1, "FULL_BAR".to_string()),
            (1, "helipad".to_string()),
            (2, "kitchen".to_string()),
        ]);

        assert_eq!(grouped[&1], [Amenity::Wifi, Amenity::FullBar].into());
        assert_eq!(grouped[&2], [Amenity::Kitchen].into());
    }

    #[test]
    fn test_undecodable_side_rows_are_skipped() {
        let rows = vec![
            Ok((1, "wifi".to_string())),
            Err(sqlx::Error::ColumnNotFound("amenity_type".to_string())),
            Ok((3, "kitchen".to_string())),
        ];

        let kept = keep_decoded(rows, "venue_amenities");
        assert_eq!(kept, vec![(1, "wifi".to_string()), (3, "kitchen".to_string())]);

        let grouped = group_amenities(kept);
        assert_eq!(grouped.len(), 2);
        assert!(!grouped.contains_key(&2));
    }

    #[test]
    fn test_errors_map_to_collaborator_errors() {
        let catalog: CatalogError = PostgresError::Decode("bad".to_string()).into();
        assert!(matches!(catalog, CatalogError::Unavailable(_)));

        let store: StoreError = PostgresError::Decode("bad".to_string()).into();
        assert!(matches!(store, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL (DATABASE_URL)"]
    async fn test_health_check() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let client = PostgresClient::new(&url, 2, 1, Duration::from_secs(5), Duration::from_secs(60))
            .await
            .expect("Failed to connect");

        assert!(client.health_check().await.unwrap());
    }
}
