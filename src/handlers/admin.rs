use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::Value;

use crate::{
    AppState,
    auth::AuthAdmin,
    error::AppError,
    models::{DashboardStats, DownloadTracked, MessageResponse, Record},
    payload::EntityPayload,
    schema::{EntityKind, EntitySchema},
    service::{EntityService, Includes, Params, Surface},
    storage::StorageState,
};

/// apply_uploads
///
/// Stores every file part the schema knows about and writes the resulting public URL
/// (plus size and type for forms) into the field map. Unknown file parts are ignored.
/// Returns the fields and the URLs stored for this request.
async fn apply_uploads(
    schema: &EntitySchema,
    mut payload: EntityPayload,
    storage: &StorageState,
) -> Result<(Record, Vec<String>), AppError> {
    let mut fields = std::mem::take(&mut payload.fields);
    let mut stored_urls = Vec::new();
    for upload in schema.uploads {
        let Some(file) = payload.file(upload.part) else {
            continue;
        };
        let stored = match storage.save(upload.folder, &file.file_name, &file.bytes).await {
            Ok(stored) => stored,
            Err(e) => {
                discard_uploads(storage, &stored_urls).await;
                return Err(e.into());
            }
        };
        if let Some((size_field, type_field)) = upload.file_meta {
            fields.insert(size_field.into(), Value::String(stored.display_size()));
            fields.insert(type_field.into(), Value::String(stored.file_type()));
        }
        stored_urls.push(stored.url.clone());
        fields.insert(upload.field.into(), Value::String(stored.url));
    }
    Ok((fields, stored_urls))
}

async fn discard_uploads(storage: &StorageState, urls: &[String]) {
    for url in urls {
        if let Err(e) = storage.remove(url).await {
            tracing::warn!(%url, error = %e, "failed to remove orphaned upload");
        }
    }
}

/// Passes `result` through, removing the request's stored uploads when it failed.
async fn keep_uploads_if_ok<T>(
    storage: &StorageState,
    stored_urls: Vec<String>,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    if result.is_err() {
        discard_uploads(storage, &stored_urls).await;
    }
    result
}

// --- Generic Entity Handlers ---
//
// Each entity router layers `Extension(EntityKind)`, so these five handlers serve
// every admin collection.

/// list_entities
///
/// [Admin Route] Lists all rows of the kind, inactive ones included. Accepts the
/// kind's filter parameters, `search`, `is_active`, `sort`/`order`, and `include_*`.
#[utoipa::path(
    get,
    path = "/api/admin/{entity}",
    params(("entity" = String, Path, description = "Collection, e.g. `sliders` or `product-categories`")),
    responses(
        (status = 200, description = "Rows in list order"),
        (status = 400, description = "Invalid filter or sort parameter")
    )
)]
pub async fn list_entities(
    Extension(kind): Extension<EntityKind>,
    State(service): State<EntityService>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<Record>>, AppError> {
    Ok(Json(service.list(kind, Surface::Admin, &params).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = i64, Path, description = "Row id")
    ),
    responses((status = 200, description = "The row"), (status = 404, description = "Not found"))
)]
pub async fn get_entity(
    Extension(kind): Extension<EntityKind>,
    State(service): State<EntityService>,
    Path(id): Path<i64>,
    Query(params): Query<Params>,
) -> Result<Json<Record>, AppError> {
    let schema = kind.schema();
    let includes = Includes::parse(schema, &params)?.with_parents(schema);
    Ok(Json(service.get(kind, Surface::Admin, id, &includes).await?))
}

/// create_entity
///
/// [Admin Route] Creates a row from a JSON or multipart body. Uploaded files are
/// stored first and their URLs written into the matching fields.
#[utoipa::path(
    post,
    path = "/api/admin/{entity}",
    params(("entity" = String, Path, description = "Collection")),
    responses(
        (status = 201, description = "Created row"),
        (status = 400, description = "Validation error or unique conflict")
    )
)]
pub async fn create_entity(
    Extension(kind): Extension<EntityKind>,
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    payload: EntityPayload,
) -> Result<(StatusCode, Json<Record>), AppError> {
    let schema = kind.schema();
    let (fields, stored_urls) = apply_uploads(schema, payload, &state.storage).await?;
    let result = EntityService::new(state.repo.clone()).create(kind, fields).await;
    let created = keep_uploads_if_ok(&state.storage, stored_urls, result).await?;

    tracing::info!(admin = %admin.username, ?kind, id = ?created.get("id"), "entity created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// update_entity
///
/// [Admin Route] Partial update: only supplied fields change. For products a
/// supplied `features` list replaces the existing one.
#[utoipa::path(
    put,
    path = "/api/admin/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = i64, Path, description = "Row id")
    ),
    responses(
        (status = 200, description = "Updated row"),
        (status = 400, description = "Validation error or unique conflict"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_entity(
    Extension(kind): Extension<EntityKind>,
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: EntityPayload,
) -> Result<Json<Record>, AppError> {
    let schema = kind.schema();
    let (fields, stored_urls) = apply_uploads(schema, payload, &state.storage).await?;
    let result = EntityService::new(state.repo.clone()).update(kind, id, fields).await;
    let updated = keep_uploads_if_ok(&state.storage, stored_urls, result).await?;

    tracing::info!(admin = %admin.username, ?kind, id, "entity updated");
    Ok(Json(updated))
}

/// delete_entity
///
/// [Admin Route] Deletes a row. Refused with a conflict while a restricting relation
/// still has rows (department staff, category products); product features go with
/// their product.
#[utoipa::path(
    delete,
    path = "/api/admin/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Collection"),
        ("id" = i64, Path, description = "Row id")
    ),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 400, description = "Delete blocked by related rows"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_entity(
    Extension(kind): Extension<EntityKind>,
    AuthAdmin(admin): AuthAdmin,
    State(service): State<EntityService>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    service.delete(kind, id).await?;

    tracing::info!(admin = %admin.username, ?kind, id, "entity deleted");
    Ok(Json(MessageResponse::new(format!(
        "{} deleted successfully",
        kind.schema().label
    ))))
}

// --- About Sections (keyed by section_key) ---

const ABOUT: EntityKind = EntityKind::AboutContent;

#[utoipa::path(
    get,
    path = "/api/admin/about",
    responses((status = 200, description = "All about sections"))
)]
pub async fn list_about(
    State(service): State<EntityService>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<Record>>, AppError> {
    Ok(Json(service.list(ABOUT, Surface::Admin, &params).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/about/{section_key}",
    params(("section_key" = String, Path, description = "Section key, e.g. `mission`")),
    responses((status = 200, description = "The section"), (status = 404, description = "Not found"))
)]
pub async fn get_about(
    State(service): State<EntityService>,
    Path(section_key): Path<String>,
) -> Result<Json<Record>, AppError> {
    let section = service
        .get_by(ABOUT, Surface::Admin, "section_key", Value::String(section_key), &Includes::default())
        .await?;
    Ok(Json(section))
}

/// upsert_about
///
/// [Admin Route] Creates the section or updates it in place when the key exists.
#[utoipa::path(
    put,
    path = "/api/admin/about/{section_key}",
    params(("section_key" = String, Path, description = "Section key")),
    responses((status = 200, description = "Stored section"))
)]
pub async fn upsert_about(
    AuthAdmin(admin): AuthAdmin,
    State(state): State<AppState>,
    Path(section_key): Path<String>,
    payload: EntityPayload,
) -> Result<Json<Record>, AppError> {
    let (fields, stored_urls) = apply_uploads(ABOUT.schema(), payload, &state.storage).await?;
    let result = EntityService::new(state.repo.clone())
        .upsert_by(ABOUT, "section_key", &section_key, fields)
        .await;
    let section = keep_uploads_if_ok(&state.storage, stored_urls, result).await?;

    tracing::info!(admin = %admin.username, section_key = %section_key, "about section saved");
    Ok(Json(section))
}

#[utoipa::path(
    delete,
    path = "/api/admin/about/{section_key}",
    params(("section_key" = String, Path, description = "Section key")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_about(
    AuthAdmin(admin): AuthAdmin,
    State(service): State<EntityService>,
    Path(section_key): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    service
        .delete_by(ABOUT, "section_key", Value::String(section_key.clone()))
        .await?;

    tracing::info!(admin = %admin.username, section_key = %section_key, "about section deleted");
    Ok(Json(MessageResponse::new("About section deleted successfully")))
}

// --- Forms & Dashboard ---

#[utoipa::path(
    post,
    path = "/api/admin/forms/{id}/track-download",
    operation_id = "admin_track_download",
    params(("id" = i64, Path, description = "Form id")),
    responses(
        (status = 200, description = "New download count", body = DownloadTracked),
        (status = 404, description = "Not found")
    )
)]
pub async fn track_download(
    State(service): State<EntityService>,
    Path(id): Path<i64>,
) -> Result<Json<DownloadTracked>, AppError> {
    let download_count = service.track_download(id).await?;
    Ok(Json(DownloadTracked {
        message: "Download tracked".into(),
        download_count,
    }))
}

/// dashboard_stats
///
/// [Admin Route] Row counts per content kind and the latest news and forms.
#[utoipa::path(
    get,
    path = "/api/admin/dashboard/stats",
    responses((status = 200, description = "Dashboard statistics", body = DashboardStats))
)]
pub async fn dashboard_stats(
    State(service): State<EntityService>,
) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(service.dashboard().await?))
}
