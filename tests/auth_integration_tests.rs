mod common;

use common::{ADMIN_EMAIL, ADMIN_PASSWORD, ADMIN_USERNAME, json, spawn_app};
use reqwest::StatusCode;
use sacco_cms::auth::{TokenIssuer, TokenKind};
use serde_json::json;

#[tokio::test]
async fn test_login_returns_token_pair_and_stamps_last_login() {
    let app = spawn_app().await;

    let res = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    let (status, body) = json(res).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["username"], ADMIN_USERNAME);
    assert_eq!(body["user"]["role"], "superadmin");
    assert!(!body["user"]["last_login"].is_null());
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_login_accepts_email_as_identifier() {
    let app = spawn_app().await;
    let res = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_failures_do_not_reveal_which_part_was_wrong() {
    let app = spawn_app().await;

    let wrong_password = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": "nope" }))
        .send()
        .await
        .unwrap();
    let unknown_user = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": "ghost", "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();

    let (status_a, body_a) = json(wrong_password).await;
    let (status_b, body_b) = json(unknown_user).await;
    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_b, StatusCode::UNAUTHORIZED);
    assert_eq!(body_a, body_b);
    assert_eq!(body_a["error"], "invalid_credentials");
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let app = spawn_app().await;
    let res = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME }))
        .send()
        .await
        .unwrap();
    let (status, body) = json(res).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_deactivated_admin_cannot_log_in() {
    let app = spawn_app().await;
    app.repo.set_admin_active(app.admin_id, false).await;

    let res = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_report_why_a_token_was_refused() {
    let app = spawn_app().await;

    let (status, body) = json(app.get("/api/admin/sliders", None).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authorization_required");

    let (status, body) = json(app.get("/api/admin/sliders", Some("not-a-jwt")).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    let expired = TokenIssuer::new(&app.config.jwt_secret, -7200, 0)
        .issue(app.admin_id, TokenKind::Access)
        .unwrap();
    let (status, body) = json(app.get("/api/admin/sliders", Some(&expired)).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token_expired");

    let forged = TokenIssuer::new("some-other-secret", 3600, 3600)
        .issue(app.admin_id, TokenKind::Access)
        .unwrap();
    let (status, body) = json(app.get("/api/admin/sliders", Some(&forged)).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_refresh_token_is_not_accepted_as_access_token() {
    let app = spawn_app().await;
    let (_, refresh) = app.login().await;

    let (status, body) = json(app.get("/api/admin/sliders", Some(&refresh)).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_refresh_issues_working_access_token() {
    let app = spawn_app().await;
    let (access, refresh) = app.login().await;

    // An access token cannot stand in for a refresh token either.
    let res = app
        .client
        .post(app.url("/api/auth/refresh"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .client
        .post(app.url("/api/auth/refresh"))
        .bearer_auth(&refresh)
        .send()
        .await
        .unwrap();
    let (status, body) = json(res).await;
    assert_eq!(status, StatusCode::OK);
    let new_access = body["access_token"].as_str().unwrap();

    let (status, me) = json(app.get("/api/auth/me", Some(new_access)).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], ADMIN_USERNAME);
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn test_deactivated_admin_with_valid_token_is_forbidden() {
    let app = spawn_app().await;
    let (access, refresh) = app.login().await;
    app.repo.set_admin_active(app.admin_id, false).await;

    let (status, body) = json(app.get("/api/admin/sliders", Some(&access)).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "admin_access_required");

    let (status, _) = json(app.get("/api/auth/me", Some(&access)).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let res = app
        .client
        .post(app.url("/api/auth/refresh"))
        .bearer_auth(&refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_token_for_unknown_admin_is_forbidden() {
    let app = spawn_app().await;
    let token = app.tokens().issue(9999, TokenKind::Access).unwrap();
    let (status, body) = json(app.get("/api/admin/dashboard/stats", Some(&token)).await).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "admin_access_required");
}

#[tokio::test]
async fn test_logout_requires_access_token() {
    let app = spawn_app().await;
    let (access, _) = app.login().await;

    let res = app.client.post(app.url("/api/auth/logout")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .client
        .post(app.url("/api/auth/logout"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    let (status, body) = json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logout successful");
}

#[tokio::test]
async fn test_change_password_flow() {
    let app = spawn_app().await;
    let (access, _) = app.login().await;

    let (status, body) = json(
        app.post_json(
            "/api/auth/change-password",
            &access,
            json!({ "old_password": "wrong", "new_password": "n3w-secret" }),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Current password is incorrect");

    let (status, _) = json(
        app.post_json(
            "/api/auth/change-password",
            &access,
            json!({ "current_password": ADMIN_PASSWORD, "new_password": "n3w-secret" }),
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let old = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": "n3w-secret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bootstrap_only_runs_on_empty_store() {
    use sacco_cms::{auth::bootstrap_admin, config::BootstrapAdmin, repository::RepositoryState};

    let app = spawn_app().await;
    let repo = app.repo.clone() as RepositoryState;
    let again = BootstrapAdmin {
        username: "second".into(),
        email: "second@example.com".into(),
        password: "whatever".into(),
    };

    assert!(bootstrap_admin(&repo, &again).await.unwrap().is_none());
    assert_eq!(repo.count_admins().await.unwrap(), 1);
}
