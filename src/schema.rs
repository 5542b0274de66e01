use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// --- Entity Catalogue ---

/// EntityKind
///
/// The closed set of content kinds managed by the CMS. Every generic repository,
/// service, and handler operation is parameterized by one of these values; the
/// per-kind behaviour lives entirely in the matching [`EntitySchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    SliderImage,
    NewsUpdate,
    AboutContent,
    CoreValue,
    Award,
    Department,
    StaffMember,
    BoardMember,
    ProductCategory,
    Product,
    ProductFeature,
    DownloadableForm,
}

impl EntityKind {
    /// All kinds, parents before children (the order tables must be created in).
    pub const ALL: [EntityKind; 12] = [
        EntityKind::SliderImage,
        EntityKind::NewsUpdate,
        EntityKind::AboutContent,
        EntityKind::CoreValue,
        EntityKind::Award,
        EntityKind::Department,
        EntityKind::StaffMember,
        EntityKind::BoardMember,
        EntityKind::ProductCategory,
        EntityKind::Product,
        EntityKind::ProductFeature,
        EntityKind::DownloadableForm,
    ];

    pub fn schema(self) -> &'static EntitySchema {
        match self {
            EntityKind::SliderImage => &SLIDER_IMAGE,
            EntityKind::NewsUpdate => &NEWS_UPDATE,
            EntityKind::AboutContent => &ABOUT_CONTENT,
            EntityKind::CoreValue => &CORE_VALUE,
            EntityKind::Award => &AWARD,
            EntityKind::Department => &DEPARTMENT,
            EntityKind::StaffMember => &STAFF_MEMBER,
            EntityKind::BoardMember => &BOARD_MEMBER,
            EntityKind::ProductCategory => &PRODUCT_CATEGORY,
            EntityKind::Product => &PRODUCT,
            EntityKind::ProductFeature => &PRODUCT_FEATURE,
            EntityKind::DownloadableForm => &DOWNLOADABLE_FORM,
        }
    }
}

// --- Schema Vocabulary ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Bool,
    Int,
    /// Calendar date, serialized as `YYYY-MM-DD`.
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Bool(bool),
    Int(i64),
    Text(&'static str),
    /// The current UTC date at creation time.
    Today,
}

impl FieldDefault {
    /// The transport value this default resolves to right now.
    pub fn value(self) -> Value {
        match self {
            FieldDefault::Bool(b) => Value::Bool(b),
            FieldDefault::Int(n) => Value::from(n),
            FieldDefault::Text(s) => Value::from(s),
            FieldDefault::Today => Value::from(Utc::now().date_naive().format(DATE_FORMAT).to_string()),
        }
    }
}

/// Wire and storage format of [`FieldType::Date`] values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// FieldDef
///
/// One scalar column of an entity. System columns (`id`, `created_at`, `updated_at`)
/// are implicit and never listed here.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub unique: bool,
    /// Maintained by the server only; ignored when present in client input.
    pub read_only: bool,
    pub default: Option<FieldDefault>,
}

impl FieldDef {
    const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            unique: false,
            read_only: false,
            default: None,
        }
    }

    const fn required(self) -> Self {
        Self { required: true, ..self }
    }

    const fn unique(self) -> Self {
        Self { unique: true, ..self }
    }

    const fn read_only(self) -> Self {
        Self { read_only: true, ..self }
    }

    const fn default(self, value: FieldDefault) -> Self {
        Self { default: Some(value), ..self }
    }
}

const fn text(name: &'static str) -> FieldDef {
    FieldDef::new(name, FieldType::Text)
}

const fn int(name: &'static str) -> FieldDef {
    FieldDef::new(name, FieldType::Int)
}

const fn flag(name: &'static str, default: bool) -> FieldDef {
    FieldDef::new(name, FieldType::Bool).default(FieldDefault::Bool(default))
}

const fn date(name: &'static str) -> FieldDef {
    FieldDef::new(name, FieldType::Date)
}

const DISPLAY_ORDER: FieldDef = int("display_order").default(FieldDefault::Int(0));
const IS_ACTIVE: FieldDef = flag("is_active", true);

/// Upload
///
/// Maps a multipart file part onto the text field that stores its public URL.
#[derive(Debug)]
pub struct Upload {
    /// Multipart part name, e.g. `image`.
    pub part: &'static str,
    /// Field receiving the stored file's URL.
    pub field: &'static str,
    /// Sub-folder of the upload root.
    pub folder: &'static str,
    /// Fields receiving the human-readable size and the file type, if tracked.
    pub file_meta: Option<(&'static str, &'static str)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Refuse to delete the parent while children exist; carries the refusal message.
    Restrict(&'static str),
    /// Delete children together with the parent.
    Cascade,
}

/// ChildRelation
///
/// A one-to-many relation seen from the parent side.
#[derive(Debug)]
pub struct ChildRelation {
    /// Key under which children are embedded, e.g. `staff_members`.
    pub name: &'static str,
    pub child: EntityKind,
    /// Column on the child pointing at the parent's id.
    pub foreign_key: &'static str,
    pub on_delete: OnDelete,
    /// Computed field carrying the number of children, always serialized.
    pub count_field: Option<&'static str>,
    /// Query flag that embeds the children, e.g. `include_staff`.
    pub include_param: &'static str,
    pub include_by_default: bool,
    /// Children written through the parent as a list of strings stored in this field.
    pub owned_text_field: Option<&'static str>,
}

/// ParentRelation
///
/// A many-to-one relation seen from the child side.
#[derive(Debug)]
pub struct ParentRelation {
    /// Key under which the parent summary is embedded, e.g. `department`.
    pub name: &'static str,
    pub parent: EntityKind,
    pub foreign_key: &'static str,
    pub include_param: &'static str,
    /// Parent fields copied into the embedded summary.
    pub summary: &'static [&'static str],
}

/// Maps a query-string parameter to an equality filter on a field.
#[derive(Debug)]
pub struct FilterParam {
    pub param: &'static str,
    pub field: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub descending: bool,
}

impl SortKey {
    pub const fn asc(field: &'static str) -> Self {
        Self { field, descending: false }
    }

    pub const fn desc(field: &'static str) -> Self {
        Self { field, descending: true }
    }
}

/// EntitySchema
///
/// The complete description of one entity kind: storage table, admin route segment,
/// scalar fields, relations, default ordering, and the query parameters it accepts.
/// The repository, service, and handler layers are written once against this type.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    /// Human-readable name used in messages.
    pub label: &'static str,
    pub table: &'static str,
    /// Segment under `/api/admin`; `None` for kinds only written through a parent.
    pub path: Option<&'static str>,
    pub fields: &'static [FieldDef],
    pub default_sort: SortKey,
    pub filters: &'static [FilterParam],
    /// Fields matched case-insensitively by the `search` parameter.
    pub search: &'static [&'static str],
    pub uploads: &'static [Upload],
    pub children: &'static [ChildRelation],
    pub parents: &'static [ParentRelation],
    /// Field from which a missing `slug` is derived on create.
    pub slug_source: Option<&'static str>,
}

/// Columns present on every table and managed by the store.
pub const SYSTEM_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether rows of this kind can be hidden from the public surface.
    pub fn has_active_flag(&self) -> bool {
        self.field("is_active").is_some()
    }

    /// Resolves a client-supplied sort key to a static column name.
    pub fn sortable(&self, name: &str) -> Option<&'static str> {
        SYSTEM_COLUMNS
            .iter()
            .copied()
            .find(|c| *c == name)
            .or_else(|| self.field(name).map(|f| f.name))
    }

    pub fn child(&self, name: &str) -> Option<&'static ChildRelation> {
        self.children.iter().find(|c| c.name == name)
    }

    /// The relation through which this kind's children are written, if any.
    pub fn owned_children(&self) -> impl Iterator<Item = &'static ChildRelation> {
        self.children.iter().filter(|c| c.owned_text_field.is_some())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this kind.
    pub fn ddl(&self) -> String {
        let mut columns = vec!["id BIGSERIAL PRIMARY KEY".to_string()];

        for field in self.fields {
            let mut def = format!("{} {}", field.name, sql_type(field.ty));
            if field.required {
                def.push_str(" NOT NULL");
            }
            if field.unique {
                def.push_str(" UNIQUE");
            }
            if let Some(default) = field.default {
                def.push_str(" DEFAULT ");
                def.push_str(&sql_default(default));
            }
            if let Some(parent) = self.parents.iter().find(|p| p.foreign_key == field.name) {
                let parent_schema = parent.parent.schema();
                let action = parent_schema
                    .children
                    .iter()
                    .find(|c| c.child == self.kind && c.foreign_key == field.name)
                    .map(|c| match c.on_delete {
                        OnDelete::Restrict(_) => "RESTRICT",
                        OnDelete::Cascade => "CASCADE",
                    })
                    .unwrap_or("RESTRICT");
                def.push_str(&format!(
                    " REFERENCES {}(id) ON DELETE {}",
                    parent_schema.table, action
                ));
            }
            columns.push(def);
        }

        columns.push("created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()".to_string());
        columns.push("updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()".to_string());

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            columns.join(",\n    ")
        )
    }
}

fn sql_type(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Text => "TEXT",
        FieldType::Bool => "BOOLEAN",
        FieldType::Int => "BIGINT",
        FieldType::Date => "DATE",
    }
}

fn sql_default(default: FieldDefault) -> String {
    match default {
        FieldDefault::Bool(b) => if b { "TRUE" } else { "FALSE" }.to_string(),
        FieldDefault::Int(n) => n.to_string(),
        FieldDefault::Text(s) => format!("'{}'", s.replace('\'', "''")),
        FieldDefault::Today => "CURRENT_DATE".to_string(),
    }
}

/// DDL for every content table, in creation order.
pub fn ddl_statements() -> Vec<String> {
    EntityKind::ALL.iter().map(|k| k.schema().ddl()).collect()
}

// --- Per-Kind Descriptions ---

const SUMMARY: &[&str] = &["id", "name", "slug"];

static SLIDER_IMAGE: EntitySchema = EntitySchema {
    kind: EntityKind::SliderImage,
    label: "Slider",
    table: "slider_images",
    path: Some("sliders"),
    fields: &[
        text("image_url").required(),
        text("title"),
        text("subtitle"),
        text("link_url"),
        DISPLAY_ORDER,
        IS_ACTIVE,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[],
    search: &["title"],
    uploads: &[Upload { part: "image", field: "image_url", folder: "slider", file_meta: None }],
    children: &[],
    parents: &[],
    slug_source: None,
};

static NEWS_UPDATE: EntitySchema = EntitySchema {
    kind: EntityKind::NewsUpdate,
    label: "News",
    table: "news_updates",
    path: Some("news"),
    fields: &[
        text("title").required(),
        text("category"),
        text("featured_image"),
        text("excerpt"),
        text("content"),
        text("author"),
        date("publish_date").default(FieldDefault::Today),
        flag("is_featured", false),
    ],
    default_sort: SortKey::desc("publish_date"),
    filters: &[FilterParam { param: "category", field: "category" }],
    search: &["title", "excerpt"],
    uploads: &[Upload {
        part: "featured_image",
        field: "featured_image",
        folder: "news",
        file_meta: None,
    }],
    children: &[],
    parents: &[],
    slug_source: None,
};

static ABOUT_CONTENT: EntitySchema = EntitySchema {
    kind: EntityKind::AboutContent,
    label: "About section",
    table: "about_content",
    path: Some("about"),
    fields: &[
        text("section_key").required().unique(),
        text("title"),
        text("content"),
        text("image_url"),
        text("video_url"),
        DISPLAY_ORDER,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[],
    search: &[],
    uploads: &[Upload { part: "image", field: "image_url", folder: "about", file_meta: None }],
    children: &[],
    parents: &[],
    slug_source: None,
};

static CORE_VALUE: EntitySchema = EntitySchema {
    kind: EntityKind::CoreValue,
    label: "Value",
    table: "core_values",
    path: Some("values"),
    fields: &[
        text("title").required(),
        text("description"),
        text("icon_class"),
        DISPLAY_ORDER,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[],
    search: &[],
    uploads: &[],
    children: &[],
    parents: &[],
    slug_source: None,
};

static AWARD: EntitySchema = EntitySchema {
    kind: EntityKind::Award,
    label: "Award",
    table: "awards",
    path: Some("awards"),
    fields: &[
        text("title").required(),
        int("year"),
        text("description"),
        text("icon_url"),
        DISPLAY_ORDER,
    ],
    default_sort: SortKey::desc("year"),
    filters: &[FilterParam { param: "year", field: "year" }],
    search: &[],
    uploads: &[Upload { part: "icon", field: "icon_url", folder: "awards", file_meta: None }],
    children: &[],
    parents: &[],
    slug_source: None,
};

static DEPARTMENT: EntitySchema = EntitySchema {
    kind: EntityKind::Department,
    label: "Department",
    table: "departments",
    path: Some("departments"),
    fields: &[
        text("name").required().unique(),
        text("slug").unique(),
        text("description"),
        text("key_responsibilities"),
        text("icon_class"),
        DISPLAY_ORDER,
        IS_ACTIVE,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[],
    search: &["name"],
    uploads: &[],
    children: &[ChildRelation {
        name: "staff_members",
        child: EntityKind::StaffMember,
        foreign_key: "department_id",
        on_delete: OnDelete::Restrict("Cannot delete department with staff members"),
        count_field: Some("staff_count"),
        include_param: "include_staff",
        include_by_default: false,
        owned_text_field: None,
    }],
    parents: &[],
    slug_source: Some("name"),
};

static STAFF_MEMBER: EntitySchema = EntitySchema {
    kind: EntityKind::StaffMember,
    label: "Staff member",
    table: "staff_members",
    path: Some("staff"),
    fields: &[
        int("department_id").required(),
        text("full_name").required(),
        text("position"),
        text("photo_url"),
        text("email"),
        text("phone"),
        text("education"),
        text("bio"),
        DISPLAY_ORDER,
        IS_ACTIVE,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[FilterParam { param: "department_id", field: "department_id" }],
    search: &["full_name", "position"],
    uploads: &[Upload { part: "photo", field: "photo_url", folder: "staff", file_meta: None }],
    children: &[],
    parents: &[ParentRelation {
        name: "department",
        parent: EntityKind::Department,
        foreign_key: "department_id",
        include_param: "include_department",
        summary: SUMMARY,
    }],
    slug_source: None,
};

static BOARD_MEMBER: EntitySchema = EntitySchema {
    kind: EntityKind::BoardMember,
    label: "Board member",
    table: "board_members",
    path: Some("board"),
    fields: &[
        text("full_name").required(),
        text("position"),
        text("category"),
        text("photo_url"),
        text("email"),
        text("phone"),
        text("education"),
        text("bio"),
        DISPLAY_ORDER,
        IS_ACTIVE,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[FilterParam { param: "category", field: "category" }],
    search: &["full_name", "position"],
    uploads: &[Upload { part: "photo", field: "photo_url", folder: "board", file_meta: None }],
    children: &[],
    parents: &[],
    slug_source: None,
};

static PRODUCT_CATEGORY: EntitySchema = EntitySchema {
    kind: EntityKind::ProductCategory,
    label: "Product category",
    table: "product_categories",
    path: Some("product-categories"),
    fields: &[
        text("name").required().unique(),
        text("slug").unique(),
        text("description"),
        DISPLAY_ORDER,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[],
    search: &["name"],
    uploads: &[],
    children: &[ChildRelation {
        name: "products",
        child: EntityKind::Product,
        foreign_key: "product_category_id",
        on_delete: OnDelete::Restrict("Cannot delete category with products"),
        count_field: Some("product_count"),
        include_param: "include_products",
        include_by_default: false,
        owned_text_field: None,
    }],
    parents: &[],
    slug_source: Some("name"),
};

static PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::Product,
    label: "Product",
    table: "products",
    path: Some("products"),
    fields: &[
        int("product_category_id").required(),
        text("name").required(),
        text("slug").unique(),
        text("max_amount"),
        text("description"),
        text("repayment_period"),
        text("interest_rate"),
        text("icon_class"),
        flag("is_popular", false),
        DISPLAY_ORDER,
        IS_ACTIVE,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[FilterParam { param: "category_id", field: "product_category_id" }],
    search: &["name"],
    uploads: &[],
    children: &[ChildRelation {
        name: "features",
        child: EntityKind::ProductFeature,
        foreign_key: "product_id",
        on_delete: OnDelete::Cascade,
        count_field: None,
        include_param: "include_features",
        include_by_default: true,
        owned_text_field: Some("feature_text"),
    }],
    parents: &[ParentRelation {
        name: "category",
        parent: EntityKind::ProductCategory,
        foreign_key: "product_category_id",
        include_param: "include_category",
        summary: SUMMARY,
    }],
    slug_source: Some("name"),
};

static PRODUCT_FEATURE: EntitySchema = EntitySchema {
    kind: EntityKind::ProductFeature,
    label: "Product feature",
    table: "product_features",
    path: None,
    fields: &[
        int("product_id").required(),
        text("feature_text").required(),
        DISPLAY_ORDER,
    ],
    default_sort: SortKey::asc("display_order"),
    filters: &[],
    search: &[],
    uploads: &[],
    children: &[],
    parents: &[ParentRelation {
        name: "product",
        parent: EntityKind::Product,
        foreign_key: "product_id",
        include_param: "include_product",
        summary: SUMMARY,
    }],
    slug_source: None,
};

static DOWNLOADABLE_FORM: EntitySchema = EntitySchema {
    kind: EntityKind::DownloadableForm,
    label: "Form",
    table: "downloadable_forms",
    path: Some("forms"),
    fields: &[
        text("title").required(),
        text("category"),
        text("file_url").required(),
        text("file_size"),
        text("file_type"),
        int("download_count").default(FieldDefault::Int(0)).read_only(),
        date("upload_date").default(FieldDefault::Today),
        IS_ACTIVE,
    ],
    default_sort: SortKey::desc("upload_date"),
    filters: &[FilterParam { param: "category", field: "category" }],
    search: &["title"],
    uploads: &[Upload {
        part: "file",
        field: "file_url",
        folder: "forms",
        file_meta: Some(("file_size", "file_type")),
    }],
    children: &[],
    parents: &[],
    slug_source: None,
};

/// Every upload folder referenced by any schema, deduplicated.
pub fn upload_folders() -> Vec<&'static str> {
    let mut folders: Vec<&'static str> = EntityKind::ALL
        .iter()
        .flat_map(|k| k.schema().uploads.iter().map(|u| u.folder))
        .collect();
    folders.sort_unstable();
    folders.dedup();
    folders
}
