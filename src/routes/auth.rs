use crate::{AppState, handlers::auth};
use axum::{
    Router,
    routing::{get, post},
};

/// Auth Router Module
///
/// Mounted at `/api/auth`.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        // POST /login
        // Credentials in, access + refresh token pair out.
        .route("/login", post(auth::login))
        // POST /refresh
        // Requires the refresh token as the bearer; returns a new access token.
        .route("/refresh", post(auth::refresh))
        // GET /me
        .route("/me", get(auth::me))
        // POST /logout
        .route("/logout", post(auth::logout))
        // POST /change-password
        .route("/change-password", post(auth::change_password))
}
