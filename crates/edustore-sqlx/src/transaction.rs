// Transaction adapter: wraps sqlx::Transaction to implement Adapter + TransactionAdapter.
//
// Uses tokio::sync::Mutex to hold the transaction across async boundaries.
// Dropping the adapter without commit rolls the transaction back.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::AnyConnection;
use tokio::sync::Mutex;

use edustore_core::db::adapter::{
    Adapter, AdapterResult, FindManyQuery, SchemaStatus, TransactionAdapter, WhereClause,
};
use edustore_core::db::schema::Schema;
use edustore_core::error::EduStoreError;

use crate::adapter;
use crate::schema;

/// Transaction-scoped adapter. Every operation runs inside the transaction.
pub struct SqlxTransactionAdapter {
    tx: Mutex<Option<sqlx::Transaction<'static, sqlx::Any>>>,
    schema: Arc<Schema>,
}

impl std::fmt::Debug for SqlxTransactionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxTransactionAdapter").finish()
    }
}

impl SqlxTransactionAdapter {
    pub fn new(tx: sqlx::Transaction<'static, sqlx::Any>, schema: Arc<Schema>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            schema,
        }
    }
}

fn consumed() -> EduStoreError {
    EduStoreError::Database("Transaction already consumed".into())
}

/// Lock the transaction and run `$body` with `$conn` bound to its connection.
macro_rules! with_tx {
    ($self:ident, $conn:ident => $body:expr) => {{
        let mut guard = $self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(consumed)?;
        let $conn: &mut AnyConnection = &mut **tx;
        $body
    }};
}

#[async_trait]
impl Adapter for SqlxTransactionAdapter {
    async fn create(&self, model: &str, data: Value) -> AdapterResult<Value> {
        with_tx!(self, conn => adapter::insert(conn, &self.schema, model, data).await)
    }

    async fn create_unless_exists(
        &self,
        model: &str,
        conflict: &[WhereClause],
        data: Value,
    ) -> AdapterResult<Option<Value>> {
        with_tx!(self, conn => {
            adapter::insert_unless_exists(conn, &self.schema, model, conflict, data).await
        })
    }

    async fn find_one(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<Option<Value>> {
        with_tx!(self, conn => adapter::find_one(conn, &self.schema, model, where_clauses).await)
    }

    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<Value>> {
        with_tx!(self, conn => adapter::find_many(conn, &self.schema, model, &query).await)
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        with_tx!(self, conn => adapter::count(conn, model, where_clauses).await)
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: Value,
    ) -> AdapterResult<Option<Value>> {
        with_tx!(self, conn => {
            adapter::update_one(conn, &self.schema, model, where_clauses, data).await
        })
    }

    async fn update_many(&self, model: &str, where_clauses: &[WhereClause], data: Value) -> AdapterResult<i64> {
        with_tx!(self, conn => adapter::update_many(conn, model, where_clauses, &data).await)
    }

    async fn delete(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<()> {
        with_tx!(self, conn => adapter::delete_one(conn, model, where_clauses).await)
    }

    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        with_tx!(self, conn => adapter::delete_many(conn, model, where_clauses).await)
    }

    async fn create_schema(&self, schema: &Schema) -> AdapterResult<SchemaStatus> {
        with_tx!(self, conn => schema::apply(conn, schema).await)
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        Err(EduStoreError::Database(
            "Nested transactions are not supported".into(),
        ))
    }
}

#[async_trait]
impl TransactionAdapter for SqlxTransactionAdapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(consumed)?;
        tx.commit()
            .await
            .map_err(|e| EduStoreError::Database(format!("Commit failed: {e}")))
    }

    async fn rollback(self: Box<Self>) -> AdapterResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(consumed)?;
        tx.rollback()
            .await
            .map_err(|e| EduStoreError::Database(format!("Rollback failed: {e}")))
    }
}
