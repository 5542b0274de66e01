use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};
use tokio::sync::Mutex;

use super::{ChildRows, Filter, ListQuery, Repository, StoreError, timestamp};
use crate::{
    models::{AdminUser, NewAdminUser, Record},
    schema::{EntityKind, EntitySchema, OnDelete, SYSTEM_COLUMNS, SortKey},
};

#[derive(Default)]
struct Tables {
    rows: HashMap<EntityKind, Vec<Record>>,
    next_ids: HashMap<EntityKind, i64>,
    admins: Vec<AdminUser>,
}

/// MemoryRepository
///
/// A `Repository` held entirely in process memory. Used by the integration tests and
/// for running the API without a database.
///
/// Every call takes the single mutex for its full duration, and each mutation checks
/// all constraints before touching any table, so a failed call leaves no trace.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn id_of(record: &Record) -> i64 {
    record.get("id").and_then(Value::as_i64).unwrap_or_default()
}

fn matches(record: &Record, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(field, expected) => record.get(*field).unwrap_or(&Value::Null) == expected,
        Filter::Contains(fields, term) => {
            let term = term.to_lowercase();
            fields.is_empty()
                || fields.iter().any(|f| {
                    record
                        .get(*f)
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.to_lowercase().contains(&term))
                })
        }
    }
}

/// Orders two column values the way Postgres does: nulls sort after everything when
/// ascending and before everything when descending.
fn compare(a: &Value, b: &Value, descending: bool) -> Ordering {
    let ordering = match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => return if descending { Ordering::Less } else { Ordering::Greater },
        (_, Value::Null) => return if descending { Ordering::Greater } else { Ordering::Less },
        (Value::Number(x), Value::Number(y)) => x
            .as_i64()
            .unwrap_or_default()
            .cmp(&y.as_i64().unwrap_or_default()),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    };
    if descending { ordering.reverse() } else { ordering }
}

fn sort_rows(rows: &mut [Record], sort: SortKey) {
    rows.sort_by(|a, b| {
        let av = a.get(sort.field).unwrap_or(&Value::Null);
        let bv = b.get(sort.field).unwrap_or(&Value::Null);
        compare(av, bv, sort.descending).then_with(|| id_of(a).cmp(&id_of(b)))
    });
}

impl Tables {
    fn table(&self, kind: EntityKind) -> &[Record] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    fn table_mut(&mut self, kind: EntityKind) -> &mut Vec<Record> {
        self.rows.entry(kind).or_default()
    }

    fn next_id(&mut self, kind: EntityKind) -> i64 {
        let next = self.next_ids.entry(kind).or_insert(0);
        *next += 1;
        *next
    }

    fn exists(&self, kind: EntityKind, id: i64) -> bool {
        self.table(kind).iter().any(|r| id_of(r) == id)
    }

    /// Builds a full row from writable input, applying column defaults.
    fn materialize(schema: &EntitySchema, id: i64, fields: &Record) -> Record {
        let now = timestamp(Utc::now());
        let mut row = Record::new();
        row.insert("id".into(), Value::from(id));
        for field in schema.fields {
            let value = fields
                .get(field.name)
                .cloned()
                .or_else(|| field.default.map(|d| d.value()))
                .unwrap_or(Value::Null);
            row.insert(field.name.into(), value);
        }
        row.insert("created_at".into(), now.clone());
        row.insert("updated_at".into(), now);
        row
    }

    /// Unique and foreign-key checks for a candidate row.
    fn check(&self, schema: &EntitySchema, row: &Record) -> Result<(), StoreError> {
        let id = id_of(row);
        for field in schema.fields.iter().filter(|f| f.unique) {
            let value = row.get(field.name).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            let taken = self
                .table(schema.kind)
                .iter()
                .any(|other| id_of(other) != id && other.get(field.name) == Some(value));
            if taken {
                return Err(StoreError::Duplicate(field.name.to_string()));
            }
        }

        for parent in schema.parents {
            match row.get(parent.foreign_key).and_then(Value::as_i64) {
                Some(parent_id) if self.exists(parent.parent, parent_id) => {}
                Some(_) => return Err(StoreError::MissingReference(parent.foreign_key.to_string())),
                None => {}
            }
        }
        Ok(())
    }

    /// Materializes replacement children without applying them.
    fn stage_children(
        &mut self,
        parent_id: i64,
        children: &[ChildRows],
    ) -> Vec<(&'static str, EntityKind, Vec<Record>)> {
        let mut staged = Vec::new();
        for set in children {
            let schema = set.relation.child.schema();
            let mut rows: Vec<Record> = Vec::new();
            for input in &set.rows {
                let mut input = input.clone();
                input.insert(set.relation.foreign_key.into(), Value::from(parent_id));
                rows.push(Self::materialize(schema, self.next_id(schema.kind), &input));
            }
            staged.push((set.relation.foreign_key, schema.kind, rows));
        }
        staged
    }

    fn apply_children(&mut self, parent_id: i64, staged: Vec<(&'static str, EntityKind, Vec<Record>)>) {
        for (foreign_key, kind, rows) in staged {
            let table = self.table_mut(kind);
            table.retain(|r| r.get(foreign_key).and_then(Value::as_i64) != Some(parent_id));
            table.extend(rows);
        }
    }

    /// Fails with `Blocked` if any restricting relation below `kind/id` still has rows.
    fn check_delete(&self, kind: EntityKind, id: i64) -> Result<(), StoreError> {
        for relation in kind.schema().children {
            let children: Vec<i64> = self
                .table(relation.child)
                .iter()
                .filter(|r| r.get(relation.foreign_key).and_then(Value::as_i64) == Some(id))
                .map(id_of)
                .collect();
            match relation.on_delete {
                OnDelete::Restrict(message) if !children.is_empty() => {
                    return Err(StoreError::Blocked(message));
                }
                OnDelete::Restrict(_) => {}
                OnDelete::Cascade => {
                    for child_id in children {
                        self.check_delete(relation.child, child_id)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn remove(&mut self, kind: EntityKind, id: i64) {
        for relation in kind.schema().children {
            if relation.on_delete == OnDelete::Cascade {
                let children: Vec<i64> = self
                    .table(relation.child)
                    .iter()
                    .filter(|r| r.get(relation.foreign_key).and_then(Value::as_i64) == Some(id))
                    .map(id_of)
                    .collect();
                for child_id in children {
                    self.remove(relation.child, child_id);
                }
            }
        }
        self.table_mut(kind).retain(|r| id_of(r) != id);
    }

    fn admin_taken(&self, admin: &NewAdminUser) -> Option<&'static str> {
        if self.admins.iter().any(|a| a.username == admin.username) {
            Some("username")
        } else if self.admins.iter().any(|a| a.email == admin.email) {
            Some("email")
        } else {
            None
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Record> = tables
            .table(kind)
            .iter()
            .filter(|r| query.filters.iter().all(|f| matches(r, f)))
            .cloned()
            .collect();
        sort_rows(&mut rows, query.sort);
        if let Some(limit) = query.limit {
            rows.truncate(usize::try_from(limit).unwrap_or_default());
        }
        Ok(rows)
    }

    async fn get(&self, kind: EntityKind, id: i64) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.table(kind).iter().find(|r| id_of(r) == id).cloned())
    }

    async fn find_by(
        &self,
        kind: EntityKind,
        field: &'static str,
        value: &Value,
    ) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.lock().await;
        let filter = Filter::Eq(field, value.clone());
        Ok(tables
            .table(kind)
            .iter()
            .filter(|r| matches(r, &filter))
            .min_by_key(|r| id_of(r))
            .cloned())
    }

    async fn count(&self, kind: EntityKind, filters: &[Filter]) -> Result<i64, StoreError> {
        let tables = self.tables.lock().await;
        let count = tables
            .table(kind)
            .iter()
            .filter(|r| filters.iter().all(|f| matches(r, f)))
            .count();
        Ok(count as i64)
    }

    async fn distinct(
        &self,
        kind: EntityKind,
        field: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.lock().await;
        let mut values: Vec<String> = tables
            .table(kind)
            .iter()
            .filter(|r| filters.iter().all(|f| matches(r, f)))
            .filter_map(|r| r.get(field).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        values.sort();
        values.dedup();
        Ok(values)
    }

    async fn insert(
        &self,
        kind: EntityKind,
        fields: Record,
        children: Vec<ChildRows>,
    ) -> Result<Record, StoreError> {
        let schema = kind.schema();
        let mut tables = self.tables.lock().await;

        // Ids consumed by a failed insert are not reused, as with a sequence.
        let id = tables.next_id(kind);
        let row = Tables::materialize(schema, id, &fields);
        tables.check(schema, &row)?;
        let staged = tables.stage_children(id, &children);

        tables.table_mut(kind).push(row.clone());
        tables.apply_children(id, staged);
        Ok(row)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        fields: Record,
        children: Vec<ChildRows>,
    ) -> Result<Option<Record>, StoreError> {
        let schema = kind.schema();
        let mut tables = self.tables.lock().await;

        let Some(current) = tables.table(kind).iter().find(|r| id_of(r) == id).cloned() else {
            return Ok(None);
        };

        let mut row = current;
        for (name, value) in fields {
            if schema.field(&name).is_some() && !SYSTEM_COLUMNS.contains(&name.as_str()) {
                row.insert(name, value);
            }
        }
        row.insert("updated_at".into(), timestamp(Utc::now()));

        tables.check(schema, &row)?;
        let staged = tables.stage_children(id, &children);

        if let Some(slot) = tables.table_mut(kind).iter_mut().find(|r| id_of(r) == id) {
            *slot = row.clone();
        }
        tables.apply_children(id, staged);
        Ok(Some(row))
    }

    async fn upsert_by(
        &self,
        kind: EntityKind,
        key: &'static str,
        fields: Record,
    ) -> Result<Record, StoreError> {
        let existing = {
            let tables = self.tables.lock().await;
            let key_value = fields.get(key).cloned().unwrap_or(Value::Null);
            tables
                .table(kind)
                .iter()
                .find(|r| r.get(key) == Some(&key_value))
                .map(id_of)
        };
        // The lock is re-taken below; the key column is unique, so a racing insert
        // surfaces as `Duplicate` instead of a second row.
        match existing {
            Some(id) => self
                .update(kind, id, fields, Vec::new())
                .await?
                .ok_or_else(|| StoreError::Duplicate(key.to_string())),
            None => self.insert(kind, fields, Vec::new()).await,
        }
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.exists(kind, id) {
            return Ok(false);
        }
        tables.check_delete(kind, id)?;
        tables.remove(kind, id);
        Ok(true)
    }

    async fn increment(
        &self,
        kind: EntityKind,
        id: i64,
        field: &'static str,
    ) -> Result<Option<i64>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables.table_mut(kind).iter_mut().find(|r| id_of(r) == id) else {
            return Ok(None);
        };
        let next = row.get(field).and_then(Value::as_i64).unwrap_or_default() + 1;
        row.insert(field.into(), Value::from(next));
        Ok(Some(next))
    }

    async fn find_admin_by_login(&self, identifier: &str) -> Result<Option<AdminUser>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .admins
            .iter()
            .find(|a| a.username == identifier || a.email == identifier)
            .cloned())
    }

    async fn get_admin(&self, id: i64) -> Result<Option<AdminUser>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.admins.iter().find(|a| a.id == id).cloned())
    }

    async fn create_admin(&self, admin: NewAdminUser) -> Result<AdminUser, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(field) = tables.admin_taken(&admin) {
            return Err(StoreError::Duplicate(field.to_string()));
        }
        let now = Utc::now();
        let created = AdminUser {
            id: tables.admins.iter().map(|a| a.id).max().unwrap_or_default() + 1,
            username: admin.username,
            email: admin.email,
            password_hash: admin.password_hash,
            full_name: admin.full_name,
            role: admin.role,
            last_login: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.admins.push(created.clone());
        Ok(created)
    }

    async fn record_login(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(admin) = tables.admins.iter_mut().find(|a| a.id == id) {
            admin.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(admin) = tables.admins.iter_mut().find(|a| a.id == id) {
            admin.password_hash = password_hash.to_string();
            admin.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn count_admins(&self) -> Result<i64, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.admins.len() as i64)
    }
}

impl MemoryRepository {
    /// Flips an administrator's `is_active` flag. There is no HTTP surface for this;
    /// it exists for tests and seeding.
    pub async fn set_admin_active(&self, id: i64, active: bool) {
        let mut tables = self.tables.lock().await;
        if let Some(admin) = tables.admins.iter_mut().find(|a| a.id == id) {
            admin.is_active = active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SortKey;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn list_sorts_nulls_last_ascending_and_breaks_ties_by_id() {
        let repo = MemoryRepository::new();
        for (title, order) in [("b", json!(1)), ("a", json!(null)), ("c", json!(1)), ("d", json!(0))] {
            repo.insert(
                EntityKind::CoreValue,
                record(json!({ "title": title, "display_order": order })),
                vec![],
            )
            .await
            .unwrap();
        }

        let rows = repo
            .list(EntityKind::CoreValue, &ListQuery::new(SortKey::asc("display_order")))
            .await
            .unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r["title"].as_str().unwrap()).collect();
        assert_eq!(titles, ["d", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn insert_rejects_unknown_parent() {
        let repo = MemoryRepository::new();
        let err = repo
            .insert(
                EntityKind::StaffMember,
                record(json!({ "department_id": 99, "full_name": "Jane" })),
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(f) if f == "department_id"));
    }

    #[tokio::test]
    async fn increment_on_missing_row_is_none() {
        let repo = MemoryRepository::new();
        let next = repo
            .increment(EntityKind::DownloadableForm, 7, "download_count")
            .await
            .unwrap();
        assert_eq!(next, None);
    }
}
