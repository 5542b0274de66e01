#![allow(dead_code)]

use reqwest::{Client, Response, StatusCode};
use sacco_cms::{
    AppConfig, AppState, MemoryRepository, MockStorageService, create_router,
    auth::{TokenIssuer, bootstrap_admin},
    config::BootstrapAdmin,
    repository::RepositoryState,
    storage::StorageState,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "password123";

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub repo: Arc<MemoryRepository>,
    pub storage: MockStorageService,
    pub config: AppConfig,
    pub admin_id: i64,
}

/// Serves the full router on a random port, backed by the in-memory repository and
/// the mock storage, with one bootstrap administrator.
pub async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let storage = MockStorageService::new();
    let config = AppConfig::default();

    let credentials = BootstrapAdmin {
        username: ADMIN_USERNAME.into(),
        email: ADMIN_EMAIL.into(),
        password: ADMIN_PASSWORD.into(),
    };
    let shared = repo.clone() as RepositoryState;
    let admin = bootstrap_admin(&shared, &credentials)
        .await
        .expect("bootstrap failed")
        .expect("store was not empty");

    let state = AppState::new(
        shared,
        Arc::new(storage.clone()) as StorageState,
        config.clone(),
    );
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{port}"),
        client: Client::new(),
        repo,
        storage,
        config,
        admin_id: admin.id,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn tokens(&self) -> TokenIssuer {
        TokenIssuer::from_config(&self.config)
    }

    /// Logs in through the API and returns `(access_token, refresh_token)`.
    pub async fn login(&self) -> (String, String) {
        let res = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&serde_json::json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    pub async fn post_json(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put_json(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str, token: &str) -> Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    /// Creates a row through the admin API and returns its body, asserting 201.
    pub async fn create(&self, token: &str, collection: &str, body: Value) -> Value {
        let res = self
            .post_json(&format!("/api/admin/{collection}"), token, body)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED, "creating {collection}");
        res.json().await.unwrap()
    }
}

pub async fn json(res: Response) -> (StatusCode, Value) {
    let status = res.status();
    (status, res.json().await.unwrap())
}
