//! Exercises `PostgresRepository` against a live database.
//!
//! Requires `TEST_DATABASE_URL` pointing at a disposable Postgres database; the
//! tests create the tables they need. Run with `cargo test -- --ignored`.

use sacco_cms::{
    models::{NewAdminUser, Record},
    repository::{ChildRows, Filter, ListQuery, PostgresRepository, Repository, StoreError},
    schema::{EntityKind, SortKey},
};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn repo() -> PostgresRepository {
    dotenv::dotenv().ok();
    let db_url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .expect("Failed to connect to Postgres in tests");
    let repo = PostgresRepository::new(pool);
    repo.ensure_schema().await.expect("schema creation failed");
    repo
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

/// A unique suffix so repeated runs never collide on unique columns.
fn tag() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

async fn category(repo: &PostgresRepository) -> i64 {
    let name = format!("Loans {}", tag());
    let row = repo
        .insert(
            EntityKind::ProductCategory,
            record(json!({ "name": name, "slug": name.to_lowercase().replace(' ', "-"), "display_order": 0 })),
            Vec::new(),
        )
        .await
        .unwrap();
    row["id"].as_i64().unwrap()
}

fn features(rows: &[&str]) -> Vec<ChildRows> {
    let relation = EntityKind::Product.schema().child("features").unwrap();
    vec![ChildRows {
        relation,
        rows: rows
            .iter()
            .enumerate()
            .map(|(i, text)| record(json!({ "feature_text": text, "display_order": i })))
            .collect(),
    }]
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_insert_returns_typed_row_with_nulls() {
    let repo = repo().await;
    let row = repo
        .insert(
            EntityKind::NewsUpdate,
            record(json!({ "title": "AGM", "publish_date": "2024-05-01", "is_featured": false })),
            Vec::new(),
        )
        .await
        .unwrap();

    assert_eq!(row["title"], "AGM");
    assert_eq!(row["publish_date"], "2024-05-01");
    assert_eq!(row["excerpt"], Value::Null);
    assert!(row["created_at"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_product_with_features_commits_and_cascades() {
    let repo = repo().await;
    let cat = category(&repo).await;
    let slug = format!("saver-{}", tag());

    let product = repo
        .insert(
            EntityKind::Product,
            record(json!({ "name": "Saver", "slug": slug, "product_category_id": cat })),
            features(&["One", "Two"]),
        )
        .await
        .unwrap();
    let id = product["id"].as_i64().unwrap();
    let by_product = [Filter::Eq("product_id", json!(id))];
    assert_eq!(repo.count(EntityKind::ProductFeature, &by_product).await.unwrap(), 2);

    // The category is guarded while the product exists.
    let blocked = repo.delete(EntityKind::ProductCategory, cat).await;
    assert!(matches!(blocked, Err(StoreError::Blocked(_))));

    assert!(repo.delete(EntityKind::Product, id).await.unwrap());
    assert_eq!(repo.count(EntityKind::ProductFeature, &by_product).await.unwrap(), 0);
    assert!(repo.delete(EntityKind::ProductCategory, cat).await.unwrap());
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_duplicate_slug_rolls_back_feature_replacement() {
    let repo = repo().await;
    let cat = category(&repo).await;
    let taken = format!("taken-{}", tag());
    repo.insert(
        EntityKind::Product,
        record(json!({ "name": "A", "slug": taken, "product_category_id": cat })),
        Vec::new(),
    )
    .await
    .unwrap();
    let other = repo
        .insert(
            EntityKind::Product,
            record(json!({ "name": "B", "slug": format!("b-{}", tag()), "product_category_id": cat })),
            features(&["Original"]),
        )
        .await
        .unwrap();
    let id = other["id"].as_i64().unwrap();

    let result = repo
        .update(
            EntityKind::Product,
            id,
            record(json!({ "slug": taken })),
            features(&["Replacement"]),
        )
        .await;
    assert!(matches!(result, Err(StoreError::Duplicate(field)) if field == "slug"));

    let query = ListQuery::new(SortKey::asc("display_order"))
        .filter(Filter::Eq("product_id", json!(id)));
    let kept = repo.list(EntityKind::ProductFeature, &query).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0]["feature_text"], "Original");
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_increment_is_atomic_under_concurrency() {
    let repo = std::sync::Arc::new(repo().await);
    let form = repo
        .insert(
            EntityKind::DownloadableForm,
            record(json!({ "title": "Form", "file_url": "/f.pdf" })),
            Vec::new(),
        )
        .await
        .unwrap();
    let id = form["id"].as_i64().unwrap();
    assert_eq!(form["download_count"], 0);

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let repo = repo.clone();
        set.spawn(async move { repo.increment(EntityKind::DownloadableForm, id, "download_count").await });
    }
    while let Some(result) = set.join_next().await {
        assert!(result.unwrap().unwrap().is_some());
    }

    let row = repo.get(EntityKind::DownloadableForm, id).await.unwrap().unwrap();
    assert_eq!(row["download_count"], 20);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_upsert_by_section_key_updates_in_place() {
    let repo = repo().await;
    let key = format!("section-{}", tag());

    let first = repo
        .upsert_by(
            EntityKind::AboutContent,
            "section_key",
            record(json!({ "section_key": key, "title": "First", "display_order": 0 })),
        )
        .await
        .unwrap();
    let second = repo
        .upsert_by(
            EntityKind::AboutContent,
            "section_key",
            record(json!({ "section_key": key, "content": "Body" })),
        )
        .await
        .unwrap();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["title"], "First");
    assert_eq!(second["content"], "Body");
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_admin_accounts_are_unique_and_findable_by_email() {
    let repo = repo().await;
    let suffix = tag();
    let admin = NewAdminUser {
        username: format!("editor-{suffix}"),
        email: format!("editor-{suffix}@example.com"),
        password_hash: "$argon2id$stub".into(),
        full_name: None,
        role: "admin".into(),
    };

    let created = repo.create_admin(admin.clone()).await.unwrap();
    assert!(created.is_active);

    let duplicate = repo.create_admin(admin.clone()).await;
    assert!(matches!(duplicate, Err(StoreError::Duplicate(_))));

    let found = repo.find_admin_by_login(&admin.email).await.unwrap().unwrap();
    assert_eq!(found.id, created.id);

    repo.record_login(created.id).await.unwrap();
    let reloaded = repo.get_admin(created.id).await.unwrap().unwrap();
    assert!(reloaded.last_login.is_some());
}
