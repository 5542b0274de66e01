use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use super::{ChildRows, Filter, ListQuery, Repository, StoreError, timestamp};
use crate::{
    models::{AdminUser, NewAdminUser, Record},
    schema::{self, DATE_FORMAT, EntityKind, EntitySchema, FieldType, OnDelete, SYSTEM_COLUMNS},
};

const ADMIN_USERS_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS admin_users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        full_name TEXT,
        role TEXT NOT NULL DEFAULT 'editor',
        last_login TIMESTAMPTZ,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const ADMIN_COLUMNS: &str = "id, username, email, password_hash, full_name, role, last_login, \
                             is_active, created_at, updated_at";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// All SQL is assembled with `QueryBuilder`: identifiers come from the static schema
/// description and every value is a bound parameter.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// --- Row <-> Record Mapping ---

fn column_type(schema: &EntitySchema, column: &str) -> FieldType {
    match column {
        "id" => FieldType::Int,
        _ => schema.field(column).map(|f| f.ty).unwrap_or(FieldType::Text),
    }
}

/// Binds a record value as the column's SQL type. Values are pre-coerced by the
/// service layer, so a mismatch can only mean `NULL`.
fn push_typed(builder: &mut QueryBuilder<'_, Postgres>, ty: FieldType, value: &Value) {
    match ty {
        FieldType::Text => builder.push_bind(value.as_str().map(str::to_owned)),
        FieldType::Bool => builder.push_bind(value.as_bool()),
        FieldType::Int => builder.push_bind(value.as_i64()),
        FieldType::Date => builder.push_bind(
            value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok()),
        ),
    };
}

fn decode_row(schema: &EntitySchema, row: &PgRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();
    record.insert("id".into(), Value::from(row.try_get::<i64, _>("id")?));

    for field in schema.fields {
        let value = match field.ty {
            FieldType::Text => row
                .try_get::<Option<String>, _>(field.name)?
                .map(Value::String),
            FieldType::Bool => row.try_get::<Option<bool>, _>(field.name)?.map(Value::Bool),
            FieldType::Int => row.try_get::<Option<i64>, _>(field.name)?.map(Value::from),
            FieldType::Date => row
                .try_get::<Option<NaiveDate>, _>(field.name)?
                .map(|d| Value::String(d.format(DATE_FORMAT).to_string())),
        };
        record.insert(field.name.into(), value.unwrap_or(Value::Null));
    }

    for column in ["created_at", "updated_at"] {
        let at: DateTime<Utc> = row.try_get(column)?;
        record.insert(column.into(), timestamp(at));
    }
    Ok(record)
}

/// Writable schema columns present in `fields`, in schema order.
fn writable<'r>(
    schema: &'static EntitySchema,
    fields: &'r Record,
) -> Vec<(&'static str, FieldType, &'r Value)> {
    schema
        .fields
        .iter()
        .filter(|f| !SYSTEM_COLUMNS.contains(&f.name))
        .filter_map(|f| fields.get(f.name).map(|v| (f.name, f.ty, v)))
        .collect()
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, schema: &EntitySchema, filters: &[Filter]) {
    builder.push(" WHERE TRUE");
    for filter in filters {
        match filter {
            Filter::Eq(field, Value::Null) => {
                builder.push(format!(" AND {field} IS NULL"));
            }
            Filter::Eq(field, value) => {
                builder.push(format!(" AND {field} = "));
                push_typed(builder, column_type(schema, field), value);
            }
            Filter::Contains(fields, term) if !fields.is_empty() => {
                let pattern = format!("%{}%", term);
                builder.push(" AND (");
                let mut separated = builder.separated(" OR ");
                for field in fields.iter() {
                    separated.push(format!("{field} ILIKE "));
                    separated.push_bind_unseparated(pattern.clone());
                }
                builder.push(")");
            }
            Filter::Contains(..) => {}
        }
    }
}

fn insert_statement(schema: &'static EntitySchema, fields: &Record) -> QueryBuilder<'static, Postgres> {
    let columns = writable(schema, fields);
    if columns.is_empty() {
        return QueryBuilder::new(format!("INSERT INTO {} DEFAULT VALUES", schema.table));
    }

    let names: Vec<&str> = columns.iter().map(|(name, _, _)| *name).collect();
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES (",
        schema.table,
        names.join(", ")
    ));
    for (i, (_, ty, value)) in columns.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        push_typed(&mut builder, *ty, value);
    }
    builder.push(")");
    builder
}

async fn insert_children(
    tx: &mut sqlx::PgConnection,
    parent_id: i64,
    children: &[ChildRows],
) -> Result<(), StoreError> {
    for set in children {
        let child = set.relation.child.schema();
        for row in &set.rows {
            let mut row = row.clone();
            row.insert(set.relation.foreign_key.into(), Value::from(parent_id));
            insert_statement(child, &row).build().execute(&mut *tx).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    /// ensure_schema
    ///
    /// Applies the generated DDL, parents first. Every statement is idempotent.
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for ddl in schema::ddl_statements() {
            sqlx::query(&ddl).execute(&mut *tx).await?;
        }
        sqlx::query(ADMIN_USERS_DDL).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Record>, StoreError> {
        let schema = kind.schema();
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT * FROM {}", schema.table));
        push_filters(&mut builder, schema, &query.filters);

        let direction = if query.sort.descending { "DESC" } else { "ASC" };
        builder.push(format!(" ORDER BY {} {}, id ASC", query.sort.field, direction));
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| decode_row(schema, row).map_err(StoreError::from))
            .collect()
    }

    async fn get(&self, kind: EntityKind, id: i64) -> Result<Option<Record>, StoreError> {
        self.find_by(kind, "id", &Value::from(id)).await
    }

    async fn find_by(
        &self,
        kind: EntityKind,
        field: &'static str,
        value: &Value,
    ) -> Result<Option<Record>, StoreError> {
        let schema = kind.schema();
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT * FROM {}", schema.table));
        push_filters(&mut builder, schema, &[Filter::Eq(field, value.clone())]);
        builder.push(" ORDER BY id ASC LIMIT 1");

        let row = builder.build().fetch_optional(&self.pool).await?;
        Ok(row.map(|r| decode_row(schema, &r)).transpose()?)
    }

    async fn count(&self, kind: EntityKind, filters: &[Filter]) -> Result<i64, StoreError> {
        let schema = kind.schema();
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", schema.table));
        push_filters(&mut builder, schema, filters);

        let count: i64 = builder.build().fetch_one(&self.pool).await?.try_get(0)?;
        Ok(count)
    }

    async fn distinct(
        &self,
        kind: EntityKind,
        field: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<String>, StoreError> {
        let schema = kind.schema();
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT DISTINCT {field} FROM {}", schema.table));
        push_filters(&mut builder, schema, filters);
        builder.push(format!(" AND {field} IS NOT NULL AND {field} <> '' ORDER BY {field}"));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>(0).map_err(StoreError::from))
            .collect()
    }

    /// insert
    ///
    /// Inserts the row and its owned children inside one transaction. Dropping the
    /// transaction on an early `?` return rolls everything back.
    async fn insert(
        &self,
        kind: EntityKind,
        fields: Record,
        children: Vec<ChildRows>,
    ) -> Result<Record, StoreError> {
        let schema = kind.schema();
        let mut tx = self.pool.begin().await?;

        let mut builder = insert_statement(schema, &fields);
        builder.push(" RETURNING *");
        let row = builder.build().fetch_one(&mut *tx).await?;
        let record = decode_row(schema, &row)?;

        let id = record.get("id").and_then(Value::as_i64).unwrap_or_default();
        insert_children(&mut *tx, id, &children).await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        fields: Record,
        children: Vec<ChildRows>,
    ) -> Result<Option<Record>, StoreError> {
        let schema = kind.schema();
        let mut tx = self.pool.begin().await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET updated_at = NOW()", schema.table));
        for (name, ty, value) in writable(schema, &fields) {
            builder.push(format!(", {name} = "));
            push_typed(&mut builder, ty, value);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING *");

        let Some(row) = builder.build().fetch_optional(&mut *tx).await? else {
            return Ok(None);
        };
        let record = decode_row(schema, &row)?;

        for set in &children {
            let child = set.relation.child.schema();
            sqlx::query(&format!(
                "DELETE FROM {} WHERE {} = $1",
                child.table, set.relation.foreign_key
            ))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        insert_children(&mut *tx, id, &children).await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    /// upsert_by
    ///
    /// `INSERT .. ON CONFLICT (key) DO UPDATE`, touching only the supplied columns.
    async fn upsert_by(
        &self,
        kind: EntityKind,
        key: &'static str,
        fields: Record,
    ) -> Result<Record, StoreError> {
        let schema = kind.schema();
        let updates: Vec<String> = writable(schema, &fields)
            .iter()
            .filter(|(name, _, _)| *name != key)
            .map(|(name, _, _)| format!("{name} = EXCLUDED.{name}"))
            .chain(std::iter::once("updated_at = NOW()".to_string()))
            .collect();

        let mut builder = insert_statement(schema, &fields);
        builder.push(format!(
            " ON CONFLICT ({key}) DO UPDATE SET {} RETURNING *",
            updates.join(", ")
        ));

        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(decode_row(schema, &row)?)
    }

    /// delete
    ///
    /// Checks restricting relations, removes cascading children, then the row, all
    /// in one transaction.
    async fn delete(&self, kind: EntityKind, id: i64) -> Result<bool, StoreError> {
        let schema = kind.schema();
        let mut tx = self.pool.begin().await?;

        for relation in schema.children {
            let child = relation.child.schema();
            match relation.on_delete {
                OnDelete::Restrict(message) => {
                    let blocked: bool = sqlx::query_scalar(&format!(
                        "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
                        child.table, relation.foreign_key
                    ))
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
                    if blocked {
                        return Err(StoreError::Blocked(message));
                    }
                }
                OnDelete::Cascade => {
                    sqlx::query(&format!(
                        "DELETE FROM {} WHERE {} = $1",
                        child.table, relation.foreign_key
                    ))
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", schema.table))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// increment
    ///
    /// A single `UPDATE .. SET x = x + 1 RETURNING x`; row locking makes concurrent
    /// increments serialize without lost updates.
    async fn increment(
        &self,
        kind: EntityKind,
        id: i64,
        field: &'static str,
    ) -> Result<Option<i64>, StoreError> {
        let schema = kind.schema();
        let value: Option<i64> = sqlx::query_scalar(&format!(
            "UPDATE {table} SET {field} = COALESCE({field}, 0) + 1 WHERE id = $1 RETURNING {field}",
            table = schema.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn find_admin_by_login(&self, identifier: &str) -> Result<Option<AdminUser>, StoreError> {
        let admin = sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users WHERE username = $1 OR email = $1 \
             ORDER BY id ASC LIMIT 1"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn get_admin(&self, id: i64) -> Result<Option<AdminUser>, StoreError> {
        let admin = sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn create_admin(&self, admin: NewAdminUser) -> Result<AdminUser, StoreError> {
        let created = sqlx::query_as::<_, AdminUser>(&format!(
            "INSERT INTO admin_users (username, email, password_hash, full_name, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ADMIN_COLUMNS}"
        ))
        .bind(admin.username)
        .bind(admin.email)
        .bind(admin.password_hash)
        .bind(admin.full_name)
        .bind(admin.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn record_login(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE admin_users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE admin_users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_admins(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
