use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    models::{AdminUser, NewAdminUser, Record},
    schema::{ChildRelation, EntityKind, SortKey},
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// StoreError
///
/// Failures raised by a [`Repository`] implementation. Constraint violations are
/// classified so the HTTP layer can tell a client mistake from a storage fault.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column already holds the submitted value.
    #[error("duplicate value for {0}")]
    Duplicate(String),
    /// A foreign key points at a row that does not exist.
    #[error("missing reference for {0}")]
    MissingReference(String),
    /// A restricting relation prevents deleting the row.
    #[error("{0}")]
    Blocked(&'static str),
    #[error("database: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let classified = err.as_database_error().and_then(|db| {
            let field = constraint_field(db.constraint().unwrap_or_default());
            match db.code().as_deref() {
                Some("23505") => Some(StoreError::Duplicate(field)),
                Some("23503") => Some(StoreError::MissingReference(field)),
                _ => None,
            }
        });
        classified.unwrap_or(StoreError::Database(err))
    }
}

/// Recovers the column name from a Postgres-generated constraint name such as
/// `departments_slug_key` or `staff_members_department_id_fkey`.
fn constraint_field(constraint: &str) -> String {
    let stem = constraint
        .strip_suffix("_fkey")
        .or_else(|| constraint.strip_suffix("_key"))
        .unwrap_or(constraint);

    let known = EntityKind::ALL
        .iter()
        .flat_map(|k| k.schema().fields.iter().map(|f| f.name))
        .chain(["username", "email"]);

    known
        .filter(|name| stem.ends_with(&format!("_{name}")))
        .max_by_key(|name| name.len())
        .unwrap_or(stem)
        .to_string()
}

/// Filter
///
/// A predicate over one entity kind. Field names are always `'static` so they can only
/// originate from the schema description, never from request input.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Exact match on a column.
    Eq(&'static str, Value),
    /// Case-insensitive substring match on any of the listed columns.
    Contains(&'static [&'static str], String),
}

/// ListQuery
///
/// Everything a `list` call needs. Rows are ordered by `sort`, ties broken by ascending id.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub sort: SortKey,
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn new(sort: SortKey) -> Self {
        Self { filters: Vec::new(), sort, limit: None }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// ChildRows
///
/// The complete replacement set of owned children for one relation. Rows carry only
/// the child's own fields; the store fills in the foreign key.
#[derive(Debug, Clone)]
pub struct ChildRows {
    pub relation: &'static ChildRelation,
    pub rows: Vec<Record>,
}

/// Repository Trait
///
/// The persistence contract, written once for every entity kind. Implementations must
/// make each mutating call atomic: the entity row and any owned child rows commit
/// together or not at all.
///
/// `fields` maps handed to `insert`/`update`/`upsert_by` are already validated and
/// coerced to the schema's types; system columns in them are ignored.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Creates any missing tables.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    // --- Generic Entity Access ---
    async fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Record>, StoreError>;
    async fn get(&self, kind: EntityKind, id: i64) -> Result<Option<Record>, StoreError>;
    /// First row (by ascending id) whose `field` equals `value`.
    async fn find_by(
        &self,
        kind: EntityKind,
        field: &'static str,
        value: &Value,
    ) -> Result<Option<Record>, StoreError>;
    async fn count(&self, kind: EntityKind, filters: &[Filter]) -> Result<i64, StoreError>;
    /// Distinct non-empty text values of `field` among rows matching `filters`, sorted.
    async fn distinct(
        &self,
        kind: EntityKind,
        field: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<String>, StoreError>;

    async fn insert(
        &self,
        kind: EntityKind,
        fields: Record,
        children: Vec<ChildRows>,
    ) -> Result<Record, StoreError>;
    /// Merges `fields` into the row and replaces each listed child set.
    /// Returns `None` when the row does not exist.
    async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        fields: Record,
        children: Vec<ChildRows>,
    ) -> Result<Option<Record>, StoreError>;
    /// Inserts, or merges `fields` into the row whose unique `key` column matches.
    async fn upsert_by(
        &self,
        kind: EntityKind,
        key: &'static str,
        fields: Record,
    ) -> Result<Record, StoreError>;
    /// Deletes the row and its cascading children. Returns `false` when absent and
    /// `StoreError::Blocked` when a restricting relation still has rows.
    async fn delete(&self, kind: EntityKind, id: i64) -> Result<bool, StoreError>;
    /// Atomically adds one to an integer column and returns the new value.
    async fn increment(
        &self,
        kind: EntityKind,
        id: i64,
        field: &'static str,
    ) -> Result<Option<i64>, StoreError>;

    // --- Credential Store ---
    /// Matches `identifier` against username or email.
    async fn find_admin_by_login(&self, identifier: &str) -> Result<Option<AdminUser>, StoreError>;
    async fn get_admin(&self, id: i64) -> Result<Option<AdminUser>, StoreError>;
    async fn create_admin(&self, admin: NewAdminUser) -> Result<AdminUser, StoreError>;
    /// Stamps `last_login` with the current time.
    async fn record_login(&self, id: i64) -> Result<(), StoreError>;
    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), StoreError>;
    async fn count_admins(&self) -> Result<i64, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Transport form of a timestamp column.
pub(crate) fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_names_resolve_to_columns() {
        assert_eq!(constraint_field("departments_slug_key"), "slug");
        assert_eq!(constraint_field("about_content_section_key_key"), "section_key");
        assert_eq!(
            constraint_field("staff_members_department_id_fkey"),
            "department_id"
        );
        assert_eq!(constraint_field("admin_users_username_key"), "username");
    }
}
