// DDL generation from the core schema DSL.
//
// Tables are created with `CREATE TABLE IF NOT EXISTS` in declaration order,
// which lists parents before children.

use sqlx::AnyConnection;

use edustore_core::db::adapter::{AdapterResult, SchemaStatus};
use edustore_core::db::schema::{FieldType, Schema, SchemaField, Table};

use crate::adapter::{execute, fetch_optional, is_postgres};
use crate::query_builder::quote_identifier;

/// Column type for a schema field, valid on both SQLite and Postgres.
///
/// Booleans are stored as 0/1 integers and JSON as text so both backends
/// decode them through the same `sqlx::Any` types.
pub fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String | FieldType::Json => "TEXT",
        FieldType::Number => "DOUBLE PRECISION",
        FieldType::Integer | FieldType::Boolean | FieldType::Timestamp => "BIGINT",
    }
}

fn column_definition(name: &str, field: &SchemaField) -> String {
    let mut def = format!("{} {}", quote_identifier(name), column_type(field.field_type));
    if name == "id" {
        def.push_str(" PRIMARY KEY");
    } else {
        if field.required {
            def.push_str(" NOT NULL");
        }
        if field.unique {
            def.push_str(" UNIQUE");
        }
    }
    if let Some(fk) = &field.references {
        def.push_str(&format!(
            " REFERENCES {}({})",
            quote_identifier(&fk.table),
            quote_identifier(&fk.field)
        ));
        if let Some(action) = &fk.on_delete {
            def.push_str(&format!(" ON DELETE {action}"));
        }
    }
    def
}

/// `CREATE TABLE IF NOT EXISTS` for one table.
pub fn create_table_sql(table: &Table) -> String {
    let columns: Vec<String> = table
        .fields
        .iter()
        .map(|(name, field)| format!("    {}", column_definition(name, field)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote_identifier(&table.name),
        columns.join(",\n")
    )
}

/// Statements creating every table of `schema`, in order.
pub fn create_statements(schema: &Schema) -> Vec<String> {
    schema.tables.iter().map(create_table_sql).collect()
}

async fn table_exists(conn: &mut AnyConnection, name: &str) -> AdapterResult<bool> {
    let sql = if is_postgres(conn) {
        "SELECT COUNT(*) AS count FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1"
    } else {
        "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = $1"
    };
    let row = fetch_optional(conn, name, sql, &[serde_json::Value::from(name)]).await?;
    let count = row
        .and_then(|r| sqlx::Row::try_get::<i64, _>(&r, "count").ok())
        .unwrap_or(0);
    Ok(count > 0)
}

/// Create the tables of `schema` that do not exist yet.
pub(crate) async fn apply(conn: &mut AnyConnection, schema: &Schema) -> AdapterResult<SchemaStatus> {
    let mut applied = Vec::new();
    for table in &schema.tables {
        if table_exists(conn, &table.name).await? {
            continue;
        }
        let sql = create_table_sql(table);
        execute(conn, &table.name, &sql, &[]).await?;
        tracing::info!(table = %table.name, "created table");
        applied.push(sql);
    }

    if applied.is_empty() {
        Ok(SchemaStatus::UpToDate)
    } else {
        Ok(SchemaStatus::Applied { statements: applied })
    }
}
