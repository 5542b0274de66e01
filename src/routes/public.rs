use crate::{AppState, handlers::public};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Mounted at `/api/public`. Unauthenticated and read-only. Every handler reads
/// through the public surface of the entity service, which drops rows whose
/// `is_active` flag is false.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /home
        // Sliders, latest news, and popular products for the landing page.
        .route("/home", get(public::home))
        // GET /about
        .route("/about", get(public::about))
        // GET /departments, GET /departments/{slug}
        .route("/departments", get(public::departments))
        .route("/departments/{slug}", get(public::department_detail))
        // GET /staff?department_id=...
        .route("/staff", get(public::staff))
        // GET /board
        // Grouped into executive, board, and supervisory.
        .route("/board", get(public::board))
        // GET /products?category=<slug>, GET /products/{slug}
        .route("/products", get(public::products))
        .route("/products/{slug}", get(public::product_detail))
        // GET /downloads?category=...&search=...
        .route("/downloads", get(public::downloads))
        // GET /news, GET /news/{id}
        .route("/news", get(public::news))
        .route("/news/{id}", get(public::news_detail))
}
