use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use crate::{
    AppState,
    auth::{self, AccessClaims, AuthAdmin, RefreshClaims, TokenKind},
    error::AppError,
    models::{
        AdminUserView, ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse,
        RefreshResponse,
    },
};

/// login
///
/// [Public Route] Exchanges credentials for an access/refresh token pair.
///
/// `username` matches either the username or the email. Unknown accounts, wrong
/// passwords, and deactivated accounts all get the same 401 so the response does not
/// reveal which one applied. A successful login stamps `last_login`.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(req) = payload
        .map_err(|_| AppError::Validation("Username and password required".into()))?;
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Username and password required".into()));
    }

    let admin = state
        .repo
        .find_admin_by_login(req.username.trim())
        .await?
        .filter(|admin| admin.is_active && auth::verify_password(&req.password, &admin.password_hash))
        .ok_or(AppError::InvalidCredentials("Invalid username or password"))?;

    state.repo.record_login(admin.id).await?;
    let admin = state.repo.get_admin(admin.id).await?.unwrap_or(admin);

    let access_token = state.tokens.issue(admin.id, TokenKind::Access)?;
    let refresh_token = state.tokens.issue(admin.id, TokenKind::Refresh)?;

    tracing::info!(admin = %admin.username, "admin logged in");

    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        access_token,
        refresh_token,
        user: admin.to_view(false),
    }))
}

/// refresh
///
/// [Refresh Token] Issues a fresh access token. The account must still exist and be
/// active.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Missing, invalid, or expired refresh token"),
        (status = 403, description = "Account missing or deactivated")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    RefreshClaims(claims): RefreshClaims,
) -> Result<Json<RefreshResponse>, AppError> {
    match state.repo.get_admin(claims.sub).await? {
        Some(admin) if admin.is_active => Ok(Json(RefreshResponse {
            access_token: state.tokens.issue(admin.id, TokenKind::Access)?,
        })),
        _ => Err(AppError::Forbidden),
    }
}

/// me
///
/// [Access Token] The calling administrator's own account.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses((status = 200, description = "Current admin", body = AdminUserView))
)]
pub async fn me(AuthAdmin(admin): AuthAdmin) -> Json<AdminUserView> {
    Json(admin.to_view(false))
}

/// logout
///
/// [Access Token] Tokens are stateless, so this only acknowledges; the client
/// discards its tokens.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Logged out", body = MessageResponse))
)]
pub async fn logout(_claims: AccessClaims) -> Json<MessageResponse> {
    Json(MessageResponse::new("Logout successful"))
}

/// change_password
///
/// [Access Token] Replaces the caller's password hash after checking the current one.
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Current password is incorrect")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthAdmin(admin): AuthAdmin,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(req) = payload
        .map_err(|_| AppError::Validation("Old and new passwords required".into()))?;
    if req.old_password.is_empty() || req.new_password.is_empty() {
        return Err(AppError::Validation("Old and new passwords required".into()));
    }
    if !auth::verify_password(&req.old_password, &admin.password_hash) {
        return Err(AppError::InvalidCredentials("Current password is incorrect"));
    }

    let password_hash = auth::hash_password(&req.new_password)?;
    state.repo.set_password_hash(admin.id, &password_hash).await?;

    tracing::info!(admin = %admin.username, "password changed");
    Ok(Json(MessageResponse::new("Password changed successfully")))
}
