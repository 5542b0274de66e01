use crate::{AppState, handlers::admin, schema::EntityKind};
use axum::{
    Extension, Router,
    routing::{get, post},
};

/// entity_routes
///
/// The five CRUD routes for one kind. The kind travels to the generic handlers as a
/// request extension, so every collection shares the same handler functions.
fn entity_routes(kind: EntityKind) -> Router<AppState> {
    let router = Router::new()
        .route("/", get(admin::list_entities).post(admin::create_entity))
        .route(
            "/{id}",
            get(admin::get_entity)
                .put(admin::update_entity)
                .patch(admin::update_entity)
                .delete(admin::delete_entity),
        );

    let router = match kind {
        EntityKind::DownloadableForm => {
            router.route("/{id}/track-download", post(admin::track_download))
        }
        _ => router,
    };
    router.layer(Extension(kind))
}

/// Admin Router Module
///
/// Mounted at `/api/admin` behind the `require_admin` layer: every route here needs
/// a valid access token belonging to an active administrator.
///
/// About sections are addressed by `section_key` rather than id and get their own
/// routes; product features are only reachable through their product.
pub fn admin_routes() -> Router<AppState> {
    let mut router = Router::new()
        // GET /dashboard/stats
        // Row counts per kind plus the latest news and forms.
        .route("/dashboard/stats", get(admin::dashboard_stats))
        // GET /about, GET|PUT|POST|DELETE /about/{section_key}
        .route("/about", get(admin::list_about))
        .route(
            "/about/{section_key}",
            get(admin::get_about)
                .put(admin::upsert_about)
                .post(admin::upsert_about)
                .delete(admin::delete_about),
        );

    // GET|POST /{collection}, GET|PUT|PATCH|DELETE /{collection}/{id}
    for kind in EntityKind::ALL {
        if kind == EntityKind::AboutContent {
            continue;
        }
        if let Some(path) = kind.schema().path {
            router = router.nest(&format!("/{path}"), entity_routes(kind));
        }
    }
    router
}
