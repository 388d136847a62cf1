//! HTTP handlers and route wiring.

pub mod health;
pub mod items;
pub mod stats;
pub mod tokens;

use actix_web::web;

use crate::beacon::RandomnessBeacon;

/// Register every `/api/v1` route. Generic over the beacon so tests can mount
/// the same routes on an in-process beacon.
pub fn configure<B: RandomnessBeacon>(cfg: &mut web::ServiceConfig) {
    cfg.route("/items", web::post().to(items::create::<B>))
        .route("/items", web::get().to(items::list::<B>))
        .route("/items/batch", web::post().to(items::create_batch::<B>))
        .route("/items/{id}", web::get().to(items::get::<B>))
        .route("/items/{id}", web::delete().to(items::delete::<B>))
        .route("/items/{id}/extend", web::post().to(items::extend::<B>))
        .route("/stats", web::get().to(stats::get::<B>))
        .route("/admin/tokens", web::get().to(tokens::list))
        .route("/admin/tokens", web::post().to(tokens::create))
        .route("/admin/tokens/{token}", web::patch().to(tokens::update))
        .route("/admin/tokens/{token}", web::delete().to(tokens::delete));
}
