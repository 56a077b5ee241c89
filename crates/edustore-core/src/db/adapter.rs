// Storage adapter trait: the abstraction every EduStore backend implements.
//
// Rows travel as `serde_json::Value` objects so backends stay schema-agnostic;
// the typed store in the `edustore` crate converts between models and rows.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::schema::Schema;
use crate::error::EduStoreError;

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, EduStoreError>;

// ─── Where Clause ────────────────────────────────────────────────

/// Comparison operators for WHERE clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Value is in the given list.
    In,
}

/// A single WHERE condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereClause {
    pub field: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub operator: Operator,
    /// Connector to the next clause. `None` means AND.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<Connector>,
}

/// Logical connector between WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    And,
    Or,
}

impl WhereClause {
    fn with_operator(
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
        operator: Operator,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator,
            connector: None,
        }
    }

    /// Simple equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::with_operator(field, value, Operator::Eq)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::with_operator(field, value, Operator::Ne)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::with_operator(field, value, Operator::Lt)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::with_operator(field, value, Operator::Gt)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::with_operator(field, value, Operator::Gte)
    }

    /// Membership filter; `values` must serialize to a JSON array.
    pub fn is_in(field: impl Into<String>, values: impl Into<serde_json::Value>) -> Self {
        Self::with_operator(field, values, Operator::In)
    }

    /// Add an AND connector.
    pub fn and(mut self) -> Self {
        self.connector = Some(Connector::And);
        self
    }

    /// Add an OR connector.
    pub fn or(mut self) -> Self {
        self.connector = Some(Connector::Or);
        self
    }
}

// ─── Sort / Pagination ───────────────────────────────────────────

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification (field + direction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: SortDirection,
}

impl SortBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }
}

/// Query parameters for `find_many`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyQuery {
    pub where_clauses: Vec<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
}

impl FindManyQuery {
    pub fn filtered(where_clauses: Vec<WhereClause>) -> Self {
        Self {
            where_clauses,
            ..Default::default()
        }
    }

    pub fn sorted(mut self, sort_by: SortBy) -> Self {
        self.sort_by = Some(sort_by);
        self
    }

    pub fn paged(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

// ─── Schema Status ───────────────────────────────────────────────

/// Result of `create_schema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaStatus {
    /// Nothing had to change.
    UpToDate,
    /// The listed statements were executed.
    Applied { statements: Vec<String> },
}

// ─── Adapter Trait ───────────────────────────────────────────────

/// The storage adapter trait.
///
/// Every backend (SQLx, Memory) implements this. Rows are JSON objects keyed
/// by the camelCase field names declared in [`Schema::edustore`].
#[async_trait]
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Insert a record and return it as stored.
    ///
    /// Fails with [`EduStoreError::UniqueViolation`] when a unique field
    /// collides with an existing row.
    async fn create(&self, model: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value>;

    /// Insert `data` only if no row of `model` matches `conflict`.
    ///
    /// The check and the insert are one atomic step: two concurrent callers
    /// with overlapping conditions never both insert. Returns `None` when a
    /// conflicting row exists.
    async fn create_unless_exists(
        &self,
        model: &str,
        conflict: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Find a single record matching the WHERE clauses.
    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Find multiple records matching the query parameters.
    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<serde_json::Value>>;

    /// Count records matching the WHERE clauses.
    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64>;

    /// Update the first record matching the WHERE clauses.
    /// Returns the updated record, or `None` if nothing matched.
    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Update every matching record. Returns the number of affected rows.
    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<i64>;

    /// Delete the first matching record.
    async fn delete(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<()>;

    /// Delete every matching record. Returns the number of deleted rows.
    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64>;

    /// Create missing tables and constraints for `schema`.
    async fn create_schema(&self, schema: &Schema) -> AdapterResult<SchemaStatus>;

    /// Begin a transaction. Writes become visible to other callers only on commit.
    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>>;
}

/// Extension of [`Adapter`] for transaction contexts.
#[async_trait]
pub trait TransactionAdapter: Adapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()>;

    /// Discard every write made through this adapter. Dropping without
    /// commit has the same effect.
    async fn rollback(self: Box<Self>) -> AdapterResult<()>;
}
