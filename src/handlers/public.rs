use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::Value;
use std::collections::HashSet;

use crate::{
    error::AppError,
    models::{
        AboutPage, BoardPage, DepartmentDetail, DownloadsPage, HomePage, ProductsPage,
        Record,
    },
    repository::{Filter, ListQuery},
    schema::{EntityKind, SortKey},
    service::{EntityService, Includes, Params, Surface},
};

const PUBLIC: Surface = Surface::Public;

/// A query for `kind` in its default order.
fn ordered(kind: EntityKind) -> ListQuery {
    ListQuery::new(kind.schema().default_sort)
}

/// Turns a missing optional row into `None` instead of a 404.
fn optional(result: Result<Record, AppError>) -> Result<Option<Record>, AppError> {
    match result {
        Ok(record) => Ok(Some(record)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// home
///
/// [Public Route] Landing page bundle: up to five active sliders, the three most
/// recently published news items, and up to three active popular products.
#[utoipa::path(
    get,
    path = "/api/public/home",
    responses((status = 200, description = "Home page data", body = HomePage))
)]
pub async fn home(State(service): State<EntityService>) -> Result<Json<HomePage>, AppError> {
    let sliders = service
        .query(EntityKind::SliderImage, PUBLIC, ordered(EntityKind::SliderImage).limit(5), &Includes::default())
        .await?;
    let news = service
        .query(
            EntityKind::NewsUpdate,
            PUBLIC,
            ListQuery::new(SortKey::desc("publish_date")).limit(3),
            &Includes::default(),
        )
        .await?;
    let product = EntityKind::Product;
    let featured_products = service
        .query(
            product,
            PUBLIC,
            ordered(product)
                .filter(Filter::Eq("is_popular", Value::Bool(true)))
                .limit(3),
            &Includes::defaults(product.schema()),
        )
        .await?;

    Ok(Json(HomePage {
        sliders,
        news,
        featured_products,
    }))
}

/// about
///
/// [Public Route] The `brief`, `mission`, and `vision` sections (each `null` when not
/// yet written) plus all core values and awards.
#[utoipa::path(
    get,
    path = "/api/public/about",
    responses((status = 200, description = "About page data", body = AboutPage))
)]
pub async fn about(State(service): State<EntityService>) -> Result<Json<AboutPage>, AppError> {
    let section = |key: &str| {
        let service = service.clone();
        let key = Value::String(key.to_string());
        async move {
            optional(
                service
                    .get_by(EntityKind::AboutContent, PUBLIC, "section_key", key, &Includes::default())
                    .await,
            )
        }
    };

    Ok(Json(AboutPage {
        about_content: section("brief").await?,
        mission: section("mission").await?,
        vision: section("vision").await?,
        values: service
            .query(EntityKind::CoreValue, PUBLIC, ordered(EntityKind::CoreValue), &Includes::default())
            .await?,
        awards: service
            .query(EntityKind::Award, PUBLIC, ordered(EntityKind::Award), &Includes::default())
            .await?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/public/departments",
    responses((status = 200, description = "Active departments with active staff counts"))
)]
pub async fn departments(
    State(service): State<EntityService>,
) -> Result<Json<Vec<Record>>, AppError> {
    let departments = service
        .query(EntityKind::Department, PUBLIC, ordered(EntityKind::Department), &Includes::default())
        .await?;
    Ok(Json(departments))
}

/// department_detail
///
/// [Public Route] An active department by slug, with its active staff in display
/// order. Inactive or unknown slugs are a 404.
#[utoipa::path(
    get,
    path = "/api/public/departments/{slug}",
    params(("slug" = String, Path, description = "Department slug")),
    responses(
        (status = 200, description = "Department and staff", body = DepartmentDetail),
        (status = 404, description = "Not found")
    )
)]
pub async fn department_detail(
    State(service): State<EntityService>,
    Path(slug): Path<String>,
) -> Result<Json<DepartmentDetail>, AppError> {
    let department = service
        .get_by(EntityKind::Department, PUBLIC, "slug", Value::String(slug), &Includes::default())
        .await?;
    let id = department.get("id").cloned().unwrap_or(Value::Null);

    let staff = service
        .query(
            EntityKind::StaffMember,
            PUBLIC,
            ordered(EntityKind::StaffMember).filter(Filter::Eq("department_id", id)),
            &Includes::default(),
        )
        .await?;

    Ok(Json(DepartmentDetail { department, staff }))
}

/// staff
///
/// [Public Route] Active staff of active departments, optionally narrowed by
/// `department_id`. The department summary is embedded unless
/// `include_department=false`.
#[utoipa::path(
    get,
    path = "/api/public/staff",
    params(("department_id" = Option<i64>, Query, description = "Only staff of this department")),
    responses((status = 200, description = "Active staff members"))
)]
pub async fn staff(
    State(service): State<EntityService>,
    Query(mut params): Query<Params>,
) -> Result<Json<Vec<Record>>, AppError> {
    params
        .entry("include_department".to_string())
        .or_insert_with(|| "true".to_string());
    let departments: HashSet<i64> = service
        .query(
            EntityKind::Department,
            PUBLIC,
            ordered(EntityKind::Department),
            &Includes::default(),
        )
        .await?
        .iter()
        .filter_map(|d| d.get("id").and_then(Value::as_i64))
        .collect();

    let staff = service
        .list(EntityKind::StaffMember, PUBLIC, &params)
        .await?
        .into_iter()
        .filter(|member| {
            member
                .get("department_id")
                .and_then(Value::as_i64)
                .is_some_and(|id| departments.contains(&id))
        })
        .collect();
    Ok(Json(staff))
}

/// board
///
/// [Public Route] Active board members grouped into the `Executive`, `Board`, and
/// `Supervisory` categories. Members with any other category are not listed.
#[utoipa::path(
    get,
    path = "/api/public/board",
    responses((status = 200, description = "Board members by category", body = BoardPage))
)]
pub async fn board(State(service): State<EntityService>) -> Result<Json<BoardPage>, AppError> {
    let group = |category: &'static str| {
        let service = service.clone();
        async move {
            let query = ordered(EntityKind::BoardMember)
                .filter(Filter::Eq("category", Value::String(category.to_string())));
            service
                .query(EntityKind::BoardMember, PUBLIC, query, &Includes::default())
                .await
        }
    };

    Ok(Json(BoardPage {
        executive: group("Executive").await?,
        board: group("Board").await?,
        supervisory: group("Supervisory").await?,
    }))
}

/// products
///
/// [Public Route] All product categories plus the active products, narrowed to one
/// category when `category=<slug>` is given. An unknown slug yields no products.
#[utoipa::path(
    get,
    path = "/api/public/products",
    params(("category" = Option<String>, Query, description = "Category slug")),
    responses((status = 200, description = "Categories and products", body = ProductsPage))
)]
pub async fn products(
    State(service): State<EntityService>,
    Query(params): Query<Params>,
) -> Result<Json<ProductsPage>, AppError> {
    let categories = service
        .query(
            EntityKind::ProductCategory,
            PUBLIC,
            ordered(EntityKind::ProductCategory),
            &Includes::default(),
        )
        .await?;

    let product = EntityKind::Product;
    let includes = Includes::defaults(product.schema());
    let products = match params.get("category").filter(|s| !s.trim().is_empty()) {
        Some(slug) => {
            let category = optional(
                service
                    .get_by(
                        EntityKind::ProductCategory,
                        PUBLIC,
                        "slug",
                        Value::String(slug.clone()),
                        &Includes::default(),
                    )
                    .await,
            )?;
            match category.and_then(|c| c.get("id").cloned()) {
                Some(id) => {
                    let query = ordered(product).filter(Filter::Eq("product_category_id", id));
                    service.query(product, PUBLIC, query, &includes).await?
                }
                None => Vec::new(),
            }
        }
        None => service.query(product, PUBLIC, ordered(product), &includes).await?,
    };

    Ok(Json(ProductsPage { categories, products }))
}

#[utoipa::path(
    get,
    path = "/api/public/products/{slug}",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product with features and category"),
        (status = 404, description = "Not found")
    )
)]
pub async fn product_detail(
    State(service): State<EntityService>,
    Path(slug): Path<String>,
) -> Result<Json<Record>, AppError> {
    let schema = EntityKind::Product.schema();
    let includes = Includes::defaults(schema).with_parents(schema);
    let product = service
        .get_by(EntityKind::Product, PUBLIC, "slug", Value::String(slug), &includes)
        .await?;
    Ok(Json(product))
}

/// downloads
///
/// [Public Route] Active forms (filterable by `category`, searchable by title) and the
/// distinct non-empty categories of all active forms.
#[utoipa::path(
    get,
    path = "/api/public/downloads",
    params(
        ("category" = Option<String>, Query, description = "Form category"),
        ("search" = Option<String>, Query, description = "Case-insensitive title search")
    ),
    responses((status = 200, description = "Forms and categories", body = DownloadsPage))
)]
pub async fn downloads(
    State(service): State<EntityService>,
    Query(params): Query<Params>,
) -> Result<Json<DownloadsPage>, AppError> {
    let kind = EntityKind::DownloadableForm;
    let forms = service.list(kind, PUBLIC, &params).await?;
    let categories = service.distinct(kind, PUBLIC, "category").await?;
    Ok(Json(DownloadsPage { forms, categories }))
}

#[utoipa::path(
    get,
    path = "/api/public/news",
    params(("category" = Option<String>, Query, description = "News category")),
    responses((status = 200, description = "News, newest first"))
)]
pub async fn news(
    State(service): State<EntityService>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<Record>>, AppError> {
    Ok(Json(service.list(EntityKind::NewsUpdate, PUBLIC, &params).await?))
}

#[utoipa::path(
    get,
    path = "/api/public/news/{id}",
    params(("id" = i64, Path, description = "News id")),
    responses((status = 200, description = "The news item"), (status = 404, description = "Not found"))
)]
pub async fn news_detail(
    State(service): State<EntityService>,
    Path(id): Path<i64>,
) -> Result<Json<Record>, AppError> {
    Ok(Json(
        service
            .get(EntityKind::NewsUpdate, PUBLIC, id, &Includes::default())
            .await?,
    ))
}
