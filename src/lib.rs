use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod payload;
pub mod repository;
pub mod schema;
pub mod service;
pub mod storage;

// Route groups (Public, Auth, Admin).
pub mod routes;
use auth::{AuthAdmin, TokenIssuer};
use routes::{admin, auth as auth_routes, public};
use service::EntityService;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{LocalStorage, MockStorageService, StorageState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login, handlers::auth::refresh, handlers::auth::me,
        handlers::auth::logout, handlers::auth::change_password,
        handlers::admin::list_entities, handlers::admin::get_entity,
        handlers::admin::create_entity, handlers::admin::update_entity,
        handlers::admin::delete_entity, handlers::admin::list_about,
        handlers::admin::get_about, handlers::admin::upsert_about,
        handlers::admin::delete_about, handlers::admin::track_download,
        handlers::admin::dashboard_stats,
        handlers::public::home, handlers::public::about, handlers::public::departments,
        handlers::public::department_detail, handlers::public::staff, handlers::public::board,
        handlers::public::products, handlers::public::product_detail,
        handlers::public::downloads, handlers::public::news, handlers::public::news_detail
    ),
    components(
        schemas(
            models::AdminUserView, models::LoginRequest, models::LoginResponse,
            models::RefreshResponse, models::ChangePasswordRequest, models::MessageResponse,
            models::DashboardCounts, models::DashboardStats, models::DownloadTracked,
            models::HomePage, models::AboutPage, models::DepartmentDetail, models::BoardPage,
            models::ProductsPage, models::DownloadsPage, schema::EntityKind,
        )
    ),
    tags(
        (name = "sacco-cms", description = "Cooperative society website CMS API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for every service the handlers need. Cheap to clone:
/// each field is an `Arc` or holds one.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for content and administrator accounts.
    pub repo: RepositoryState,
    /// Where uploaded files are written.
    pub storage: StorageState,
    pub config: AppConfig,
    /// Signs and verifies access and refresh tokens.
    pub tokens: TokenIssuer,
}

impl AppState {
    /// Builds the state, deriving the token issuer from the configuration.
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        let tokens = TokenIssuer::from_config(&config);
        Self {
            repo,
            storage,
            config,
            tokens,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Handlers and extractors pull only the component they need out of AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for TokenIssuer {
    fn from_ref(app_state: &AppState) -> TokenIssuer {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for EntityService {
    fn from_ref(app_state: &AppState) -> EntityService {
        EntityService::new(app_state.repo.clone())
    }
}

/// require_admin
///
/// Gate for the whole admin route group. Extracting `AuthAdmin` verifies the access
/// token and loads the account; a missing, invalid, or expired token is rejected with
/// 401 and a deactivated account with 403 before any handler runs. The resolved
/// admin is stored in the request extensions so handlers do not load it again.
async fn require_admin(admin: AuthAdmin, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(admin);
    next.run(request).await
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// create_router
///
/// Assembles the routing structure, applies the scoped and global middleware, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS, restricted to the configured origins when any are set.
    let cors = cors_layer(&state.config.cors_origins);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let uploads = ServeDir::new(&state.config.upload_dir);
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // GET /health
        .route("/health", axum::routing::get(|| async { "ok" }))
        // Public Routes: No middleware applied.
        .nest("/api/public", public::public_routes())
        // Auth Routes: each handler extracts the token it needs.
        .nest("/api/auth", auth_routes::auth_routes())
        // Admin Routes: every route behind the admin gate.
        .nest(
            "/api/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_admin,
            )),
        )
        // Uploaded files, at the URLs the storage layer hands out.
        .nest_service(storage::UPLOAD_URL_PREFIX, uploads)
        .layer(body_limit)
        // Apply the Unified State to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers (Applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI, and the `x-request-id` header, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
