use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use venue_match::config::Settings;
use venue_match::core::Matcher;
use venue_match::routes::{self, matches::AppState};
use venue_match::services::{
    CacheManager, CatalogReader, Explainer, HttpExplanationBackend, InMemoryCatalog,
    InMemoryResultStore, MatchResultStore, MatchService, PostgresClient,
};

/// JSON error response for malformed requests
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle query payload errors
fn handle_query_payload_error(err: error::QueryPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("Query error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle path errors, e.g. a non-numeric brief id
fn handle_path_error(err: error::PathError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("Path error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_path".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_tracing(settings: &Settings) {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| settings.logging.level.clone());
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| settings.logging.format.clone());

    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_tracing(&settings);
    info!("Starting venue matching service...");

    // Catalog and store: PostgreSQL when configured, in-memory otherwise
    let (catalog, store, postgres): (
        Arc<dyn CatalogReader>,
        Arc<dyn MatchResultStore>,
        Option<Arc<PostgresClient>>,
    ) = match settings.database.url.as_deref() {
        Some(url) => {
            let client = PostgresClient::from_settings(url, &settings.database)
                .await
                .map_err(|e| startup_error("PostgreSQL connection error", e))?;
            let client = Arc::new(client);
            info!("PostgreSQL client initialized");
            let catalog: Arc<dyn CatalogReader> = client.clone();
            let store: Arc<dyn MatchResultStore> = client.clone();
            (catalog, store, Some(client))
        }
        None => {
            warn!("No database URL configured, using in-memory catalog and match store");
            let catalog: Arc<dyn CatalogReader> = Arc::new(InMemoryCatalog::new());
            let store: Arc<dyn MatchResultStore> = Arc::new(InMemoryResultStore::new());
            (catalog, store, None)
        }
    };

    // Explanation backend (optional - templated explanations otherwise)
    let limits = settings.explainer.limits();
    let explainer = match settings.explainer.active_api_key() {
        Some(api_key) => match HttpExplanationBackend::new(
            &settings.explainer.api_base,
            api_key.to_string(),
            settings.explainer.model.clone(),
            settings.explainer.max_tokens,
            settings.explainer.temperature,
            limits.call_timeout,
        ) {
            Ok(backend) => {
                info!("Explanation backend initialized (model: {})", settings.explainer.model);
                Explainer::new(Arc::new(backend), limits)
            }
            Err(e) => {
                warn!("Explanation backend unavailable ({}), using templated explanations", e);
                Explainer::fallback_only(limits)
            }
        },
        None => {
            info!("Explanation backend disabled, using templated explanations");
            Explainer::fallback_only(limits)
        }
    };

    // Cache (Redis tier is optional)
    let cache = match CacheManager::new(
        settings.cache.redis_url.as_deref(),
        settings.cache.l1_cache_size,
        settings.cache.ttl_secs,
    )
    .await
    {
        Ok(cache) => cache,
        Err(e) => {
            warn!("Failed to connect to Redis ({}), using in-process cache only", e);
            CacheManager::local(settings.cache.l1_cache_size, settings.cache.ttl_secs)
        }
    };
    info!(
        "Cache initialized (L1: {} entries, TTL: {}s, shared tier: {})",
        settings.cache.l1_cache_size,
        settings.cache.ttl_secs,
        cache.has_shared_tier()
    );

    let matcher = Matcher::new(
        settings.weights(),
        settings.scoring.tuning,
        settings.matching.max_results,
    );
    info!("Matcher initialized with weights: {:?}", matcher.weights());

    let service = MatchService::new(catalog, store, explainer, matcher).with_cache(Arc::new(cache));
    let app_state = AppState {
        service: Arc::new(service),
        postgres,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
