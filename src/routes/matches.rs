use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use std::sync::Arc;

use crate::models::{
    BriefId, ComputeMatchesQuery, ErrorResponse, HealthResponse, MatchLookup, MatchState,
    MatchesResponse, RunMode,
};
use crate::services::{MatchError, MatchService, PostgresClient};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MatchService>,
    /// Present when the catalog and store live in PostgreSQL
    pub postgres: Option<Arc<PostgresClient>>,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::resource("/briefs/{brief_id}/matches")
            .route(web::post().to(compute_matches))
            .route(web::get().to(get_matches))
            .route(web::delete().to(invalidate_matches)),
    );
}

/// Map an engine error to its JSON response
pub fn error_response(err: &MatchError) -> HttpResponse {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let message = if err.is_retryable() {
        tracing::error!("Matching failed: {}", err);
        "could not compute matches, retry".to_string()
    } else {
        tracing::info!("Rejected matching request: {}", err);
        err.to_string()
    };

    HttpResponse::build(status).json(ErrorResponse {
        error: err.error_code().to_string(),
        message,
        status_code: status.as_u16(),
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = match &state.postgres {
        Some(postgres) => postgres.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Compute matches endpoint
///
/// POST /api/v1/briefs/{brief_id}/matches[?mode=async]
///
/// Sync mode answers 200 with the stored result set. Async mode checks the
/// brief, registers the run and answers 202; the caller polls the GET endpoint.
async fn compute_matches(
    state: web::Data<AppState>,
    path: web::Path<BriefId>,
    query: web::Query<ComputeMatchesQuery>,
) -> impl Responder {
    let brief_id = path.into_inner();

    match query.mode {
        RunMode::Sync => {
            tracing::info!("Computing matches for brief {}", brief_id);
            match state.service.compute_matches(brief_id).await {
                Ok(set) => HttpResponse::Ok().json(MatchesResponse::available(set)),
                Err(e) => error_response(&e),
            }
        }
        RunMode::Async => match state.service.start_compute(brief_id).await {
            Ok(()) => {
                HttpResponse::Accepted().json(MatchesResponse::pending(brief_id, MatchState::Computing))
            }
            Err(e) => error_response(&e),
        },
    }
}

/// Get matches endpoint
///
/// GET /api/v1/briefs/{brief_id}/matches
///
/// 200 when available, 202 while a run is in flight, 404 when never computed
/// or stale after a brief edit, 503 when the last run failed.
async fn get_matches(state: web::Data<AppState>, path: web::Path<BriefId>) -> impl Responder {
    let brief_id = path.into_inner();

    match state.service.get_matches(brief_id).await {
        Ok(lookup) => {
            let status = match &lookup {
                MatchLookup::Available(_) => StatusCode::OK,
                MatchLookup::Computing => StatusCode::ACCEPTED,
                MatchLookup::NotComputed => StatusCode::NOT_FOUND,
            };
            HttpResponse::build(status).json(MatchesResponse::from_lookup(brief_id, lookup))
        }
        Err(e) => error_response(&e),
    }
}

/// Invalidate matches endpoint
///
/// DELETE /api/v1/briefs/{brief_id}/matches
async fn invalidate_matches(state: web::Data<AppState>, path: web::Path<BriefId>) -> impl Responder {
    let brief_id = path.into_inner();

    match state.service.invalidate(brief_id).await {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}
