use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;

use crate::{
    error::AppError,
    models::{DashboardCounts, DashboardStats, Record},
    repository::{ChildRows, Filter, ListQuery, RepositoryState},
    schema::{
        ChildRelation, DATE_FORMAT, EntityKind, EntitySchema, FieldDef, FieldType, ParentRelation,
        SortKey,
    },
};

/// Raw query-string parameters of a list or detail request.
pub type Params = HashMap<String, String>;

/// Which surface a read is served to. The public surface never sees rows whose
/// `is_active` flag is false, and its computed counts and embedded children only
/// cover active rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Admin,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Create,
    Update,
}

// --- Input Coercion ---

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok().or_else(|| {
        // Accept a full ISO datetime and keep its date part.
        raw.get(..10)
            .filter(|_| raw.as_bytes().get(10) == Some(&b'T'))
            .and_then(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).ok())
    })
}

/// coerce
///
/// Converts one input value to the field's type. Multipart submissions deliver every
/// value as text, so strings are parsed for non-text fields; an empty string there
/// means `null`.
fn coerce(field: &FieldDef, value: Value) -> Result<Value, AppError> {
    let invalid = |what: &str| AppError::Validation(format!("{} must be {what}", field.name));

    match (field.ty, value) {
        (_, Value::Null) => Ok(Value::Null),

        (FieldType::Text, Value::String(s)) => Ok(Value::String(s)),
        (FieldType::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (FieldType::Text, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (FieldType::Text, _) => Err(invalid("text")),

        (_, Value::String(s)) if s.trim().is_empty() => Ok(Value::Null),

        (FieldType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (FieldType::Bool, Value::String(s)) => {
            parse_bool(&s).map(Value::Bool).ok_or_else(|| invalid("a boolean"))
        }
        (FieldType::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(invalid("a boolean")),
        },

        (FieldType::Int, Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .map(Value::from)
            .ok_or_else(|| invalid("an integer")),
        (FieldType::Int, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid("an integer")),

        (FieldType::Date, Value::String(s)) => parse_date(&s)
            .map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
            .ok_or_else(|| invalid("a date in YYYY-MM-DD format")),

        _ => Err(invalid(match field.ty {
            FieldType::Bool => "a boolean",
            FieldType::Int => "an integer",
            _ => "a date in YYYY-MM-DD format",
        })),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// slugify
///
/// Lower-cases and joins alphanumeric runs with single hyphens:
/// `"Loans & Savings"` becomes `"loans-savings"`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Parses the text list written through an owned child relation. Accepts a JSON
/// array, a string holding a JSON array (multipart), or a single string.
fn owned_rows(relation: &'static ChildRelation, value: Value) -> Result<ChildRows, AppError> {
    let text_field = relation.owned_text_field.unwrap_or("text");
    let items = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Array(items)) => items,
            _ if s.trim().is_empty() => Vec::new(),
            _ => vec![Value::String(s)],
        },
        _ => {
            return Err(AppError::Validation(format!(
                "{} must be a list of strings",
                relation.name
            )));
        }
    };

    let mut rows = Vec::new();
    for (position, item) in items.into_iter().enumerate() {
        let text = match item {
            Value::String(s) => s,
            Value::Object(mut obj) => match obj.remove(text_field) {
                Some(Value::String(s)) => s,
                _ => continue,
            },
            _ => {
                return Err(AppError::Validation(format!(
                    "{} must be a list of strings",
                    relation.name
                )));
            }
        };
        // Blank entries are skipped but still consume their position.
        if text.trim().is_empty() {
            continue;
        }
        let mut row = Record::new();
        row.insert(text_field.into(), Value::String(text.trim().to_string()));
        row.insert("display_order".into(), Value::from(position as i64));
        rows.push(row);
    }
    Ok(ChildRows { relation, rows })
}

/// prepare
///
/// Filters client input down to the writable schema fields and coerces each value.
/// On create, required fields must be present and defaults fill the gaps; on
/// update, only supplied fields are kept but a required one cannot be cleared.
/// Unknown keys, system columns, and read-only fields are ignored.
fn prepare(schema: &EntitySchema, input: &Record, mode: Mode) -> Result<Record, AppError> {
    let mut fields = Record::new();

    for field in schema.fields.iter().filter(|f| !f.read_only) {
        let Some(raw) = input.get(field.name) else {
            continue;
        };
        let value = coerce(field, raw.clone())?;
        if field.required && is_blank(Some(&value)) {
            return Err(AppError::Validation(format!("{} is required", field.name)));
        }
        fields.insert(field.name.into(), value);
    }

    if mode == Mode::Create {
        for field in schema.fields.iter().filter(|f| !f.read_only) {
            if fields.contains_key(field.name) && !is_blank(fields.get(field.name)) {
                continue;
            }
            if field.required {
                return Err(AppError::Validation(format!("{} is required", field.name)));
            }
            if let Some(default) = field.default {
                fields.insert(field.name.into(), default.value());
            }
        }
    }
    Ok(fields)
}

fn id_of(record: &Record) -> i64 {
    record.get("id").and_then(Value::as_i64).unwrap_or_default()
}

// --- Query Construction ---

/// Filters that hide inactive rows from the public surface.
fn visibility(schema: &EntitySchema, surface: Surface) -> Vec<Filter> {
    if surface == Surface::Public && schema.has_active_flag() {
        vec![Filter::Eq("is_active", Value::Bool(true))]
    } else {
        Vec::new()
    }
}

fn is_visible(schema: &EntitySchema, surface: Surface, record: &Record) -> bool {
    surface == Surface::Admin
        || !schema.has_active_flag()
        || record.get("is_active") == Some(&Value::Bool(true))
}

/// Builds a list query from the schema's filter parameters plus `is_active` (admin
/// only), `search`, `sort`, and `order`. Visibility is added by the caller.
fn list_query(schema: &EntitySchema, surface: Surface, params: &Params) -> Result<ListQuery, AppError> {
    let mut query = ListQuery::new(schema.default_sort);

    for param in schema.filters {
        let Some(raw) = params.get(param.param).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let value = match schema.field(param.field) {
            Some(field) => coerce(field, Value::String(raw.clone()))?,
            None => Value::String(raw.clone()),
        };
        query.filters.push(Filter::Eq(param.field, value));
    }

    if surface == Surface::Admin && schema.has_active_flag() {
        if let Some(raw) = params.get("is_active").filter(|v| !v.trim().is_empty()) {
            let active = parse_bool(raw)
                .ok_or_else(|| AppError::Validation("is_active must be a boolean".into()))?;
            query.filters.push(Filter::Eq("is_active", Value::Bool(active)));
        }
    }

    if let Some(term) = params.get("search").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !schema.search.is_empty() {
            query.filters.push(Filter::Contains(schema.search, term.to_string()));
        }
    }

    if let Some(sort) = params.get("sort").filter(|s| !s.is_empty()) {
        let field = schema
            .sortable(sort)
            .ok_or_else(|| AppError::Validation(format!("Invalid sort field: {sort}")))?;
        query.sort = SortKey { field, descending: false };
    }
    if let Some(order) = params.get("order").filter(|s| !s.is_empty()) {
        query.sort.descending = match order.to_ascii_lowercase().as_str() {
            "asc" => false,
            "desc" => true,
            _ => {
                return Err(AppError::Validation(format!(
                    "Invalid sort order: {order} (expected asc or desc)"
                )));
            }
        };
    }

    Ok(query)
}

/// Which relations to embed, resolved from `include_*` parameters and defaults.
#[derive(Debug, Default)]
pub struct Includes {
    enabled: Vec<&'static str>,
}

impl Includes {
    pub fn defaults(schema: &EntitySchema) -> Self {
        Self {
            enabled: schema
                .children
                .iter()
                .filter(|c| c.include_by_default)
                .map(|c| c.include_param)
                .collect(),
        }
    }

    pub fn parse(schema: &EntitySchema, params: &Params) -> Result<Self, AppError> {
        let mut includes = Self::defaults(schema);
        let flags = schema
            .children
            .iter()
            .map(|c| c.include_param)
            .chain(schema.parents.iter().map(|p| p.include_param));

        for flag in flags {
            let Some(raw) = params.get(flag) else {
                continue;
            };
            let on = parse_bool(raw)
                .ok_or_else(|| AppError::Validation(format!("{flag} must be a boolean")))?;
            includes.enabled.retain(|f| *f != flag);
            if on {
                includes.enabled.push(flag);
            }
        }
        Ok(includes)
    }

    /// Includes every parent summary on top of the defaults.
    pub fn with_parents(mut self, schema: &EntitySchema) -> Self {
        for parent in schema.parents {
            if !self.enabled.contains(&parent.include_param) {
                self.enabled.push(parent.include_param);
            }
        }
        self
    }

    fn child(&self, relation: &ChildRelation) -> bool {
        self.enabled.contains(&relation.include_param)
    }

    fn parent(&self, relation: &ParentRelation) -> bool {
        self.enabled.contains(&relation.include_param)
    }
}

// --- Service ---

/// EntityService
///
/// The entity access and serialization contract, written once over [`EntitySchema`].
/// Handlers for every entity kind go through here: it validates and coerces input,
/// enforces public visibility, checks references, and projects stored rows into
/// their transport form with counts and requested relations.
#[derive(Clone)]
pub struct EntityService {
    repo: RepositoryState,
}

impl EntityService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    // --- Reads ---

    pub async fn list(
        &self,
        kind: EntityKind,
        surface: Surface,
        params: &Params,
    ) -> Result<Vec<Record>, AppError> {
        let schema = kind.schema();
        let query = list_query(schema, surface, params)?;
        let includes = Includes::parse(schema, params)?;
        self.query(kind, surface, query, &includes).await
    }

    /// Runs a prepared query with the surface's visibility filters added.
    pub async fn query(
        &self,
        kind: EntityKind,
        surface: Surface,
        mut query: ListQuery,
        includes: &Includes,
    ) -> Result<Vec<Record>, AppError> {
        query.filters.extend(visibility(kind.schema(), surface));
        let rows = self.repo.list(kind, &query).await?;

        let mut projected = Vec::with_capacity(rows.len());
        for row in rows {
            projected.push(self.project(kind, surface, row, includes).await?);
        }
        Ok(projected)
    }

    pub async fn get(
        &self,
        kind: EntityKind,
        surface: Surface,
        id: i64,
        includes: &Includes,
    ) -> Result<Record, AppError> {
        self.get_by(kind, surface, "id", Value::from(id), includes).await
    }

    /// Looks a row up by any column (`id`, `slug`, `section_key`). Rows hidden from
    /// the surface are reported as not found.
    pub async fn get_by(
        &self,
        kind: EntityKind,
        surface: Surface,
        field: &'static str,
        value: Value,
        includes: &Includes,
    ) -> Result<Record, AppError> {
        let schema = kind.schema();
        let row = self
            .repo
            .find_by(kind, field, &value)
            .await?
            .filter(|row| is_visible(schema, surface, row))
            .ok_or_else(|| AppError::not_found(schema.label))?;
        self.project(kind, surface, row, includes).await
    }

    pub async fn distinct(
        &self,
        kind: EntityKind,
        surface: Surface,
        field: &'static str,
    ) -> Result<Vec<String>, AppError> {
        let filters = visibility(kind.schema(), surface);
        Ok(self.repo.distinct(kind, field, &filters).await?)
    }

    /// project
    ///
    /// Adds computed child counts, embedded children, and parent summaries to a
    /// stored row. Every schema field is already present (as `null` when unset).
    async fn project(
        &self,
        kind: EntityKind,
        surface: Surface,
        mut record: Record,
        includes: &Includes,
    ) -> Result<Record, AppError> {
        let schema = kind.schema();
        let id = id_of(&record);

        for relation in schema.children {
            let child = relation.child.schema();
            let mut filters = vec![Filter::Eq(relation.foreign_key, Value::from(id))];
            filters.extend(visibility(child, surface));

            if let Some(count_field) = relation.count_field {
                let count = self.repo.count(relation.child, &filters).await?;
                record.insert(count_field.into(), Value::from(count));
            }
            if includes.child(relation) {
                let query = ListQuery {
                    filters,
                    sort: child.default_sort,
                    limit: None,
                };
                let children = self.repo.list(relation.child, &query).await?;
                record.insert(
                    relation.name.into(),
                    Value::Array(children.into_iter().map(Value::Object).collect()),
                );
            }
        }

        for relation in schema.parents.iter().filter(|p| includes.parent(p)) {
            let summary = match record.get(relation.foreign_key).and_then(Value::as_i64) {
                Some(parent_id) => self
                    .repo
                    .get(relation.parent, parent_id)
                    .await?
                    .filter(|parent| is_visible(relation.parent.schema(), surface, parent))
                    .map(|parent| {
                        relation
                            .summary
                            .iter()
                            .map(|f| (f.to_string(), parent.get(*f).cloned().unwrap_or(Value::Null)))
                            .collect::<Record>()
                    }),
                None => None,
            };
            record.insert(
                relation.name.into(),
                summary.map(Value::Object).unwrap_or(Value::Null),
            );
        }

        Ok(record)
    }

    // --- Writes ---

    async fn check_references(&self, schema: &EntitySchema, fields: &Record) -> Result<(), AppError> {
        for relation in schema.parents {
            if let Some(parent_id) = fields.get(relation.foreign_key).and_then(Value::as_i64) {
                if self.repo.get(relation.parent, parent_id).await?.is_none() {
                    return Err(AppError::Validation(format!(
                        "{} not found for {}",
                        relation.parent.schema().label,
                        relation.foreign_key
                    )));
                }
            }
        }
        Ok(())
    }

    fn owned_children(schema: &EntitySchema, input: &Record) -> Result<Vec<ChildRows>, AppError> {
        schema
            .owned_children()
            .filter_map(|relation| input.get(relation.name).map(|v| (relation, v.clone())))
            .map(|(relation, value)| owned_rows(relation, value))
            .collect()
    }

    pub async fn create(&self, kind: EntityKind, input: Record) -> Result<Record, AppError> {
        let schema = kind.schema();
        let mut fields = prepare(schema, &input, Mode::Create)?;

        if let Some(source) = schema.slug_source {
            if is_blank(fields.get("slug")) {
                let base = fields.get(source).and_then(Value::as_str).unwrap_or_default();
                fields.insert("slug".into(), Value::String(slugify(base)));
            }
        }

        self.check_references(schema, &fields).await?;
        let children = Self::owned_children(schema, &input)?;

        let row = self.repo.insert(kind, fields, children).await?;
        self.project(kind, Surface::Admin, row, &Includes::defaults(schema))
            .await
    }

    /// update
    ///
    /// Merges only the supplied fields. A supplied owned-children list replaces the
    /// existing one in the same transaction; an absent one leaves it untouched.
    pub async fn update(&self, kind: EntityKind, id: i64, input: Record) -> Result<Record, AppError> {
        let schema = kind.schema();
        let current = self
            .repo
            .get(kind, id)
            .await?
            .ok_or_else(|| AppError::not_found(schema.label))?;

        let mut fields = prepare(schema, &input, Mode::Update)?;
        if let Some(source) = schema.slug_source {
            if fields.contains_key("slug") && is_blank(fields.get("slug")) {
                let base = fields
                    .get(source)
                    .or_else(|| current.get(source))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                fields.insert("slug".into(), Value::String(slugify(base)));
            }
        }

        self.check_references(schema, &fields).await?;
        let children = Self::owned_children(schema, &input)?;

        let row = self
            .repo
            .update(kind, id, fields, children)
            .await?
            .ok_or_else(|| AppError::not_found(schema.label))?;
        self.project(kind, Surface::Admin, row, &Includes::defaults(schema))
            .await
    }

    /// upsert_by
    ///
    /// Writes the row identified by a unique `key` column: a partial update when it
    /// exists, a full create otherwise.
    pub async fn upsert_by(
        &self,
        kind: EntityKind,
        key: &'static str,
        key_value: &str,
        mut input: Record,
    ) -> Result<Record, AppError> {
        let schema = kind.schema();
        input.insert(key.into(), Value::String(key_value.to_string()));

        let exists = self
            .repo
            .find_by(kind, key, &Value::String(key_value.to_string()))
            .await?
            .is_some();
        let mode = if exists { Mode::Update } else { Mode::Create };
        let fields = prepare(schema, &input, mode)?;

        let row = self.repo.upsert_by(kind, key, fields).await?;
        self.project(kind, Surface::Admin, row, &Includes::defaults(schema))
            .await
    }

    pub async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), AppError> {
        if self.repo.delete(kind, id).await? {
            Ok(())
        } else {
            Err(AppError::not_found(kind.schema().label))
        }
    }

    pub async fn delete_by(
        &self,
        kind: EntityKind,
        field: &'static str,
        value: Value,
    ) -> Result<(), AppError> {
        let row = self
            .repo
            .find_by(kind, field, &value)
            .await?
            .ok_or_else(|| AppError::not_found(kind.schema().label))?;
        self.delete(kind, id_of(&row)).await
    }

    /// track_download
    ///
    /// Increments a form's `download_count` once, atomically in the store, and
    /// returns the new count.
    pub async fn track_download(&self, id: i64) -> Result<i64, AppError> {
        let kind = EntityKind::DownloadableForm;
        self.repo
            .increment(kind, id, "download_count")
            .await?
            .ok_or_else(|| AppError::not_found(kind.schema().label))
    }

    /// Row counts per kind plus the five most recently created news items and forms.
    pub async fn dashboard(&self) -> Result<DashboardStats, AppError> {
        let count = |kind| async move { self.repo.count(kind, &[]).await };
        let stats = DashboardCounts {
            total_products: count(EntityKind::Product).await?,
            total_staff: count(EntityKind::StaffMember).await?,
            total_board_members: count(EntityKind::BoardMember).await?,
            total_departments: count(EntityKind::Department).await?,
            total_downloads: count(EntityKind::DownloadableForm).await?,
            total_news: count(EntityKind::NewsUpdate).await?,
            total_sliders: count(EntityKind::SliderImage).await?,
        };

        let recent = ListQuery::new(SortKey::desc("created_at")).limit(5);
        let recent_news = self
            .query(EntityKind::NewsUpdate, Surface::Admin, recent.clone(), &Includes::default())
            .await?;
        let recent_downloads = self
            .query(EntityKind::DownloadableForm, Surface::Admin, recent, &Includes::default())
            .await?;

        Ok(DashboardStats {
            stats,
            recent_news,
            recent_downloads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(schema: EntityKind, name: &str) -> &'static FieldDef {
        schema.schema().field(name).unwrap()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn multipart_text_is_coerced_per_field_type() {
        let active = field(EntityKind::SliderImage, "is_active");
        assert_eq!(coerce(active, json!("on")).unwrap(), json!(true));
        assert_eq!(coerce(active, json!("0")).unwrap(), json!(false));
        assert_eq!(coerce(active, json!("")).unwrap(), Value::Null);
        assert!(coerce(active, json!("maybe")).is_err());

        let order = field(EntityKind::SliderImage, "display_order");
        assert_eq!(coerce(order, json!(" 7 ")).unwrap(), json!(7));
        assert_eq!(coerce(order, json!(3.0)).unwrap(), json!(3));
        assert!(coerce(order, json!("seven")).is_err());
        assert!(coerce(order, json!(2.5)).is_err());

        let date = field(EntityKind::NewsUpdate, "publish_date");
        assert_eq!(coerce(date, json!("2024-03-01")).unwrap(), json!("2024-03-01"));
        assert_eq!(coerce(date, json!("2024-03-01T10:00:00Z")).unwrap(), json!("2024-03-01"));
        assert!(coerce(date, json!("01/03/2024")).is_err());
    }

    #[test]
    fn create_requires_fields_and_applies_defaults() {
        let schema = EntityKind::SliderImage.schema();
        let err = prepare(schema, &record(json!({ "title": "x" })), Mode::Create).unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m == "image_url is required"));

        let fields = prepare(schema, &record(json!({ "image_url": "/a.png" })), Mode::Create).unwrap();
        assert_eq!(fields["display_order"], json!(0));
        assert_eq!(fields["is_active"], json!(true));
    }

    #[test]
    fn update_keeps_only_supplied_and_rejects_clearing_required() {
        let schema = EntityKind::SliderImage.schema();
        let fields = prepare(schema, &record(json!({ "title": "C", "bogus": 1 })), Mode::Update).unwrap();
        assert_eq!(fields, record(json!({ "title": "C" })));

        let err = prepare(schema, &record(json!({ "image_url": "" })), Mode::Update).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn read_only_and_system_fields_are_ignored() {
        let schema = EntityKind::DownloadableForm.schema();
        let input = record(json!({
            "id": 99, "created_at": "x", "download_count": 500,
            "title": "Loan form", "file_url": "/f.pdf"
        }));
        let fields = prepare(schema, &input, Mode::Create).unwrap();
        assert!(!fields.contains_key("id"));
        assert!(!fields.contains_key("created_at"));
        assert!(!fields.contains_key("download_count"));
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Loans & Savings"), "loans-savings");
        assert_eq!(slugify("  Credit  Dept. "), "credit-dept");
    }

    #[test]
    fn features_skip_blanks_but_keep_positions() {
        let relation = EntityKind::Product.schema().child("features").unwrap();
        let rows = owned_rows(relation, json!(["Fast", " ", "Cheap"])).unwrap().rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["feature_text"], json!("Cheap"));
        assert_eq!(rows[1]["display_order"], json!(2));

        let from_multipart = owned_rows(relation, json!("[\"One\",\"Two\"]")).unwrap().rows;
        assert_eq!(from_multipart.len(), 2);
    }

    #[test]
    fn unknown_sort_key_and_order_are_rejected() {
        let schema = EntityKind::NewsUpdate.schema();
        let params: Params = [("sort".to_string(), "password".to_string())].into();
        assert!(list_query(schema, Surface::Admin, &params).is_err());

        let params: Params = [("order".to_string(), "sideways".to_string())].into();
        assert!(list_query(schema, Surface::Admin, &params).is_err());

        let params: Params = [
            ("sort".to_string(), "title".to_string()),
            ("order".to_string(), "DESC".to_string()),
        ]
        .into();
        let query = list_query(schema, Surface::Admin, &params).unwrap();
        assert_eq!(query.sort, SortKey::desc("title"));
    }

    #[test]
    fn public_surface_hides_inactive_rows() {
        let departments = EntityKind::Department.schema();
        assert_eq!(
            visibility(departments, Surface::Public),
            vec![Filter::Eq("is_active", Value::Bool(true))]
        );
        assert!(visibility(departments, Surface::Admin).is_empty());
        assert!(visibility(EntityKind::NewsUpdate.schema(), Surface::Public).is_empty());
    }

    #[test]
    fn integers_beyond_i64_are_rejected() {
        let year = field(EntityKind::Award, "year");
        let huge: Value = serde_json::from_str("18446744073709551615").unwrap();
        let err = coerce(year, huge).unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m.contains("an integer")));
        assert!(coerce(year, json!(1e30)).is_err());
        assert!(coerce(year, json!("99999999999999999999")).is_err());
    }

    #[tokio::test]
    async fn hidden_parent_summary_is_null_on_public_surface() {
        let service = EntityService::new(std::sync::Arc::new(crate::MemoryRepository::new()));
        let dept = service
            .create(
                EntityKind::Department,
                record(json!({ "name": "Secret Dept", "is_active": false })),
            )
            .await
            .unwrap();
        let member = service
            .create(
                EntityKind::StaffMember,
                record(json!({ "full_name": "Ann", "department_id": dept["id"] })),
            )
            .await
            .unwrap();
        let id = id_of(&member);
        let staff = EntityKind::StaffMember.schema();
        let includes = Includes::default().with_parents(staff);

        let public = service
            .get(EntityKind::StaffMember, Surface::Public, id, &includes)
            .await
            .unwrap();
        assert_eq!(public["department"], Value::Null);

        let admin = service
            .get(EntityKind::StaffMember, Surface::Admin, id, &includes)
            .await
            .unwrap();
        assert_eq!(admin["department"]["slug"], json!("secret-dept"));
    }

    #[test]
    fn filter_params_map_to_schema_fields() {
        let schema = EntityKind::Product.schema();
        let params: Params = [("category_id".to_string(), "3".to_string())].into();
        let query = list_query(schema, Surface::Public, &params).unwrap();
        assert_eq!(query.filters, vec![Filter::Eq("product_category_id", json!(3))]);
    }
}
