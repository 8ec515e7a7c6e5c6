// Route exports
pub mod matches;

use actix_web::web;

/// Version prefix shared by every endpoint
pub const API_PREFIX: &str = "/api/v1";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope(API_PREFIX).configure(matches::configure));
}
