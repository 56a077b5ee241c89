// SqlxAdapter: the core Adapter trait over a `sqlx::Any` pool.
//
// Every operation is written once against `&mut AnyConnection`; the pool
// adapter hands in a pooled connection and the transaction adapter hands in
// its open transaction. Rows are decoded with the schema so booleans and
// JSON columns round-trip as the same JSON the memory backend returns.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, AnyPool, Column, Row};

use edustore_core::db::adapter::{
    Adapter, AdapterResult, FindManyQuery, SchemaStatus, TransactionAdapter, WhereClause,
};
use edustore_core::db::schema::{FieldType, Schema, Table};
use edustore_core::error::EduStoreError;

use crate::query_builder::{self, quote_identifier};
use crate::schema;
use crate::transaction::SqlxTransactionAdapter;

/// SQLx-based database adapter.
#[derive(Debug, Clone)]
pub struct SqlxAdapter {
    pool: AnyPool,
    schema: Arc<Schema>,
}

impl SqlxAdapter {
    /// Wrap an existing pool; rows are decoded with the EduStore schema.
    pub fn new(pool: AnyPool) -> Self {
        Self::with_schema(pool, Schema::edustore())
    }

    pub fn with_schema(pool: AnyPool, schema: Schema) -> Self {
        Self {
            pool,
            schema: Arc::new(schema),
        }
    }

    /// Connect to a database URL (`sqlite://...`, `postgres://...`).
    pub async fn connect(url: &str) -> Result<Self, EduStoreError> {
        sqlx::any::install_default_drivers();

        // Each connection to an in-memory SQLite database is a separate
        // database, so the pool must never open a second one.
        let pool = if url.contains(":memory:") || url.contains("mode=memory") {
            AnyPoolOptions::new().max_connections(1).connect(url).await
        } else {
            AnyPool::connect(url).await
        }
        .map_err(|e| EduStoreError::Database(format!("Database connection failed: {e}")))?;

        tracing::debug!(url = %redact_url(url), "database pool ready");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn acquire(&self) -> AdapterResult<sqlx::pool::PoolConnection<Any>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| EduStoreError::Database(format!("Cannot acquire connection: {e}")))
    }
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => format!("{}://***{}", &url[..scheme], &url[at..]),
        _ => url.to_string(),
    }
}

// ─── Error mapping ───────────────────────────────────────────────

/// Map a sqlx error, turning constraint failures into
/// [`EduStoreError::UniqueViolation`] and [`EduStoreError::ForeignKeyViolation`].
pub(crate) fn query_error(model: &str, err: sqlx::Error) -> EduStoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return EduStoreError::UniqueViolation {
                model: model.to_string(),
                field: unique_field(model, db.message(), db.constraint()),
            };
        }
        if db.is_foreign_key_violation() {
            return EduStoreError::ForeignKeyViolation {
                model: model.to_string(),
                referenced_by: db.constraint().unwrap_or("unknown").to_string(),
            };
        }
    }
    EduStoreError::Database(format!("Query failed: {err}"))
}

/// Column named by a unique-violation error.
///
/// SQLite reports `UNIQUE constraint failed: order.orderNumber`; Postgres
/// reports the constraint name (`order_orderNumber_key`, `order_pkey`).
fn unique_field(model: &str, message: &str, constraint: Option<&str>) -> String {
    if let Some(rest) = message.split("failed: ").nth(1) {
        if let Some(column) = rest.split(',').next().and_then(|c| c.trim().rsplit('.').next()) {
            return column.to_string();
        }
    }
    if let Some(name) = constraint {
        let name = name.strip_prefix(&format!("{model}_")).unwrap_or(name);
        if name == "pkey" {
            return "id".to_string();
        }
        return name.strip_suffix("_key").unwrap_or(name).to_string();
    }
    "unknown".to_string()
}

// ─── Row decoding ────────────────────────────────────────────────

/// Convert an `AnyRow` into a JSON object.
///
/// Columns known to `table` are decoded by their declared type. Anything
/// else is tried in the order text, integer, float.
pub(crate) fn row_to_json(row: &AnyRow, table: Option<&Table>) -> Value {
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        let field_type = table.and_then(|t| t.get(name)).map(|f| f.field_type);
        map.insert(name.to_string(), decode_column(row, name, field_type));
    }
    Value::Object(map)
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn decode_column(row: &AnyRow, name: &str, field_type: Option<FieldType>) -> Value {
    match field_type {
        Some(FieldType::String) => row
            .try_get::<Option<String>, _>(name)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        Some(FieldType::Json) => match row.try_get::<Option<String>, _>(name).ok().flatten() {
            Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            None => Value::Null,
        },
        Some(FieldType::Number) => match row.try_get::<Option<f64>, _>(name) {
            Ok(v) => v.map(float_value).unwrap_or(Value::Null),
            Err(_) => row
                .try_get::<Option<i64>, _>(name)
                .ok()
                .flatten()
                .map(|i| float_value(i as f64))
                .unwrap_or(Value::Null),
        },
        Some(FieldType::Boolean) => match row.try_get::<Option<i64>, _>(name) {
            Ok(v) => v.map(|i| Value::Bool(i != 0)).unwrap_or(Value::Null),
            Err(_) => row
                .try_get::<Option<bool>, _>(name)
                .ok()
                .flatten()
                .map(Value::Bool)
                .unwrap_or(Value::Null),
        },
        Some(FieldType::Integer) | Some(FieldType::Timestamp) => row
            .try_get::<Option<i64>, _>(name)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        None => {
            if let Ok(Some(v)) = row.try_get::<Option<String>, _>(name) {
                Value::String(v)
            } else if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(name) {
                Value::from(v)
            } else if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(name) {
                float_value(v)
            } else {
                Value::Null
            }
        }
    }
}

// ─── Statement execution ─────────────────────────────────────────

/// Typed bind value to avoid lifetime issues with sqlx.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

pub(crate) fn json_to_bind(v: &Value) -> BindValue {
    match v {
        Value::String(s) => BindValue::Text(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BindValue::Int(i)
            } else if let Some(f) = n.as_f64() {
                BindValue::Float(f)
            } else {
                BindValue::Text(n.to_string())
            }
        }
        Value::Bool(b) => BindValue::Int(i64::from(*b)),
        Value::Null => BindValue::Null,
        // Arrays and objects live in TEXT columns.
        _ => BindValue::Text(v.to_string()),
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    binds: &[Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in binds {
        query = match json_to_bind(value) {
            BindValue::Text(s) => query.bind(s),
            BindValue::Int(i) => query.bind(i),
            BindValue::Float(f) => query.bind(f),
            BindValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

pub(crate) async fn fetch_all(
    conn: &mut AnyConnection,
    model: &str,
    sql: &str,
    binds: &[Value],
) -> AdapterResult<Vec<AnyRow>> {
    tracing::trace!(%sql, "fetch_all");
    bind_all(sqlx::query(sql), binds)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| query_error(model, e))
}

pub(crate) async fn fetch_optional(
    conn: &mut AnyConnection,
    model: &str,
    sql: &str,
    binds: &[Value],
) -> AdapterResult<Option<AnyRow>> {
    tracing::trace!(%sql, "fetch_optional");
    bind_all(sqlx::query(sql), binds)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| query_error(model, e))
}

pub(crate) async fn execute(
    conn: &mut AnyConnection,
    model: &str,
    sql: &str,
    binds: &[Value],
) -> AdapterResult<u64> {
    tracing::trace!(%sql, "execute");
    let result = bind_all(sqlx::query(sql), binds)
        .execute(&mut *conn)
        .await
        .map_err(|e| query_error(model, e))?;
    Ok(result.rows_affected())
}

pub(crate) fn is_postgres(conn: &AnyConnection) -> bool {
    conn.backend_name().to_ascii_lowercase().starts_with("postgres")
}

// ─── Operations shared by the pool and transaction adapters ──────

async fn select_by_id(
    conn: &mut AnyConnection,
    schema: &Schema,
    model: &str,
    id: &Value,
) -> AdapterResult<Option<Value>> {
    let sql = format!("SELECT * FROM {} WHERE \"id\" = $1", quote_identifier(model));
    let row = fetch_optional(conn, model, &sql, std::slice::from_ref(id)).await?;
    Ok(row.map(|r| row_to_json(&r, schema.get(model))))
}

/// Id of the first row matching `where_clauses`.
async fn first_id(
    conn: &mut AnyConnection,
    model: &str,
    where_clauses: &[WhereClause],
) -> AdapterResult<Option<Value>> {
    let where_frag = query_builder::build_where(where_clauses, 0);
    let sql = format!(
        "SELECT \"id\" FROM {}{} LIMIT 1",
        quote_identifier(model),
        where_frag.sql
    );
    let row = fetch_optional(conn, model, &sql, &where_frag.binds).await?;
    Ok(row.and_then(|r| r.try_get::<String, _>("id").ok()).map(Value::String))
}

pub(crate) async fn insert(
    conn: &mut AnyConnection,
    schema: &Schema,
    model: &str,
    data: Value,
) -> AdapterResult<Value> {
    let frag = query_builder::build_insert(model, &data);
    execute(conn, model, &frag.sql, &frag.binds).await?;

    // No RETURNING through sqlx::Any; read the row back by id.
    match data.get("id") {
        Some(id) => Ok(select_by_id(conn, schema, model, id).await?.unwrap_or(data)),
        None => Ok(data),
    }
}

pub(crate) async fn insert_unless_exists(
    conn: &mut AnyConnection,
    schema: &Schema,
    model: &str,
    conflict: &[WhereClause],
    data: Value,
) -> AdapterResult<Option<Value>> {
    // Under READ COMMITTED two `NOT EXISTS` checks can both pass. A
    // self-conflicting table lock serializes them until commit.
    if is_postgres(conn) {
        let lock = format!(
            "LOCK TABLE {} IN SHARE ROW EXCLUSIVE MODE",
            quote_identifier(model)
        );
        execute(conn, model, &lock, &[]).await?;
    }

    let frag = query_builder::build_insert_unless_exists(model, &data, conflict);
    if execute(conn, model, &frag.sql, &frag.binds).await? == 0 {
        return Ok(None);
    }
    match data.get("id") {
        Some(id) => select_by_id(conn, schema, model, id).await,
        None => Ok(Some(data)),
    }
}

pub(crate) async fn find_one(
    conn: &mut AnyConnection,
    schema: &Schema,
    model: &str,
    where_clauses: &[WhereClause],
) -> AdapterResult<Option<Value>> {
    let where_frag = query_builder::build_where(where_clauses, 0);
    let sql = format!(
        "SELECT * FROM {}{} LIMIT 1",
        quote_identifier(model),
        where_frag.sql
    );
    let row = fetch_optional(conn, model, &sql, &where_frag.binds).await?;
    Ok(row.map(|r| row_to_json(&r, schema.get(model))))
}

pub(crate) async fn find_many(
    conn: &mut AnyConnection,
    schema: &Schema,
    model: &str,
    query: &FindManyQuery,
) -> AdapterResult<Vec<Value>> {
    let where_frag = query_builder::build_where(&query.where_clauses, 0);
    let sql = format!(
        "SELECT * FROM {}{}{}{}",
        quote_identifier(model),
        where_frag.sql,
        query_builder::build_order_by(query),
        query_builder::build_limit_offset(query)
    );
    let rows = fetch_all(conn, model, &sql, &where_frag.binds).await?;
    let table = schema.get(model);
    Ok(rows.iter().map(|r| row_to_json(r, table)).collect())
}

pub(crate) async fn count(
    conn: &mut AnyConnection,
    model: &str,
    where_clauses: &[WhereClause],
) -> AdapterResult<i64> {
    let where_frag = query_builder::build_where(where_clauses, 0);
    let sql = format!(
        "SELECT COUNT(*) AS count FROM {}{}",
        quote_identifier(model),
        where_frag.sql
    );
    let row = fetch_optional(conn, model, &sql, &where_frag.binds).await?;
    Ok(row.and_then(|r| r.try_get::<i64, _>("count").ok()).unwrap_or(0))
}

pub(crate) async fn update_one(
    conn: &mut AnyConnection,
    schema: &Schema,
    model: &str,
    where_clauses: &[WhereClause],
    data: Value,
) -> AdapterResult<Option<Value>> {
    let Some(id) = first_id(conn, model, where_clauses).await? else {
        return Ok(None);
    };

    // Re-apply the caller's filter next to the id so a row changed since
    // the lookup is left alone ("consume if unused" depends on it).
    if execute_update(conn, model, Some(&id), where_clauses, &data).await? == 0 {
        return Ok(None);
    }
    select_by_id(conn, schema, model, &id).await
}

pub(crate) async fn update_many(
    conn: &mut AnyConnection,
    model: &str,
    where_clauses: &[WhereClause],
    data: &Value,
) -> AdapterResult<i64> {
    Ok(execute_update(conn, model, None, where_clauses, data).await? as i64)
}

async fn execute_update(
    conn: &mut AnyConnection,
    model: &str,
    id: Option<&Value>,
    where_clauses: &[WhereClause],
    data: &Value,
) -> AdapterResult<u64> {
    let set_frag = query_builder::build_update_set(data, 0);
    if set_frag.sql.is_empty() {
        return Ok(0);
    }
    let mut sql = format!("UPDATE {} SET {}", quote_identifier(model), set_frag.sql);
    let mut binds = set_frag.binds;

    let mut conditions = Vec::new();
    if let Some(id) = id {
        binds.push(id.clone());
        conditions.push(format!("\"id\" = ${}", binds.len()));
    }
    let where_frag = query_builder::build_where(where_clauses, binds.len());
    if !where_frag.sql.is_empty() {
        conditions.push(format!("({})", where_frag.sql.trim_start_matches(" WHERE ")));
        binds.extend(where_frag.binds);
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    execute(conn, model, &sql, &binds).await
}

pub(crate) async fn delete_one(
    conn: &mut AnyConnection,
    model: &str,
    where_clauses: &[WhereClause],
) -> AdapterResult<()> {
    if let Some(id) = first_id(conn, model, where_clauses).await? {
        let sql = format!("DELETE FROM {} WHERE \"id\" = $1", quote_identifier(model));
        execute(conn, model, &sql, &[id]).await?;
    }
    Ok(())
}

pub(crate) async fn delete_many(
    conn: &mut AnyConnection,
    model: &str,
    where_clauses: &[WhereClause],
) -> AdapterResult<i64> {
    let where_frag = query_builder::build_where(where_clauses, 0);
    let sql = format!("DELETE FROM {}{}", quote_identifier(model), where_frag.sql);
    Ok(execute(conn, model, &sql, &where_frag.binds).await? as i64)
}

#[async_trait]
impl Adapter for SqlxAdapter {
    async fn create(&self, model: &str, data: Value) -> AdapterResult<Value> {
        let mut conn = self.acquire().await?;
        insert(&mut conn, &self.schema, model, data).await
    }

    async fn create_unless_exists(
        &self,
        model: &str,
        conflict: &[WhereClause],
        data: Value,
    ) -> AdapterResult<Option<Value>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EduStoreError::Database(format!("Failed to begin transaction: {e}")))?;
        let created = insert_unless_exists(&mut tx, &self.schema, model, conflict, data).await?;
        tx.commit()
            .await
            .map_err(|e| EduStoreError::Database(format!("Commit failed: {e}")))?;
        Ok(created)
    }

    async fn find_one(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<Option<Value>> {
        let mut conn = self.acquire().await?;
        find_one(&mut conn, &self.schema, model, where_clauses).await
    }

    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<Value>> {
        let mut conn = self.acquire().await?;
        find_many(&mut conn, &self.schema, model, &query).await
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let mut conn = self.acquire().await?;
        count(&mut conn, model, where_clauses).await
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: Value,
    ) -> AdapterResult<Option<Value>> {
        let mut conn = self.acquire().await?;
        update_one(&mut conn, &self.schema, model, where_clauses, data).await
    }

    async fn update_many(&self, model: &str, where_clauses: &[WhereClause], data: Value) -> AdapterResult<i64> {
        let mut conn = self.acquire().await?;
        update_many(&mut conn, model, where_clauses, &data).await
    }

    async fn delete(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<()> {
        let mut conn = self.acquire().await?;
        delete_one(&mut conn, model, where_clauses).await
    }

    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let mut conn = self.acquire().await?;
        delete_many(&mut conn, model, where_clauses).await
    }

    async fn create_schema(&self, schema: &Schema) -> AdapterResult<SchemaStatus> {
        let mut conn = self.acquire().await?;
        schema::apply(&mut conn, schema).await
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EduStoreError::Database(format!("Failed to begin transaction: {e}")))?;
        Ok(Box::new(SqlxTransactionAdapter::new(tx, self.schema.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unique_field_sqlite_message() {
        assert_eq!(
            unique_field("order", "UNIQUE constraint failed: order.orderNumber", None),
            "orderNumber"
        );
        assert_eq!(
            unique_field("user", "UNIQUE constraint failed: user.email, user.phone", None),
            "email"
        );
    }

    #[test]
    fn test_unique_field_postgres_constraint() {
        assert_eq!(
            unique_field("download", "duplicate key value", Some("download_downloadId_key")),
            "downloadId"
        );
        assert_eq!(unique_field("order", "duplicate key value", Some("order_pkey")), "id");
        assert_eq!(unique_field("order", "duplicate key value", None), "unknown");
    }

    #[test]
    fn test_json_to_bind() {
        assert_eq!(json_to_bind(&json!(true)), BindValue::Int(1));
        assert_eq!(json_to_bind(&json!(12)), BindValue::Int(12));
        assert_eq!(json_to_bind(&json!(12.5)), BindValue::Float(12.5));
        assert_eq!(json_to_bind(&json!(null)), BindValue::Null);
        assert_eq!(json_to_bind(&json!(["a"])), BindValue::Text("[\"a\"]".into()));
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("postgres://user:pw@db:5432/edu"),
            "postgres://***@db:5432/edu"
        );
        assert_eq!(redact_url("sqlite::memory:"), "sqlite::memory:");
    }
}
