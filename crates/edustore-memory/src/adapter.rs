// In-memory storage adapter: a HashMap of tables implementing the core Adapter trait.
//
// Rows are kept as `serde_json::Value` objects keyed by table name, behind a
// `tokio::sync::RwLock`. Unique fields registered through `create_schema` (or
// `with_schema`) are enforced on insert and update. Foreign keys are enforced
// on delete the way SQL does it: a referenced row cannot be removed unless
// the reference cascades, in which case the referencing rows go with it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};

use edustore_core::db::adapter::{
    Adapter, AdapterResult, Connector, FindManyQuery, Operator, SchemaStatus, SortDirection,
    TransactionAdapter, WhereClause,
};
use edustore_core::db::schema::Schema;
use edustore_core::error::EduStoreError;

/// Table name → rows.
type Tables = HashMap<String, Vec<Value>>;

/// Table name → fields that must be unique.
type UniqueIndex = HashMap<String, Vec<String>>;

/// Referenced table name → foreign keys pointing at it.
type ReferenceIndex = HashMap<String, Vec<IncomingReference>>;

/// A foreign key seen from the referenced side.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IncomingReference {
    table: String,
    field: String,
    target_field: String,
    cascade: bool,
}

/// In-memory storage adapter.
///
/// Cloning shares the same underlying tables. Data is lost when the last
/// clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<RwLock<Tables>>,
    unique: Arc<RwLock<UniqueIndex>>,
    references: Arc<RwLock<ReferenceIndex>>,
}

impl MemoryAdapter {
    /// An empty adapter without constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty adapter enforcing the unique fields of `schema`.
    pub fn with_schema(schema: &Schema) -> Self {
        Self {
            store: Arc::default(),
            unique: Arc::new(RwLock::new(unique_index(schema))),
            references: Arc::new(RwLock::new(reference_index(schema))),
        }
    }

    /// Copy of all data (for debugging/testing).
    pub async fn snapshot(&self) -> Tables {
        self.store.read().await.clone()
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    /// Row count of one table.
    pub async fn model_count(&self, model: &str) -> usize {
        self.store.read().await.get(model).map_or(0, Vec::len)
    }
}

fn unique_index(schema: &Schema) -> UniqueIndex {
    schema
        .tables
        .iter()
        .map(|t| {
            let fields = t.unique_fields().into_iter().map(String::from).collect();
            (t.name.clone(), fields)
        })
        .collect()
}

fn reference_index(schema: &Schema) -> ReferenceIndex {
    let mut index = ReferenceIndex::new();
    for table in &schema.tables {
        for (name, field) in &table.fields {
            if let Some(fk) = &field.references {
                index.entry(fk.table.clone()).or_default().push(IncomingReference {
                    table: table.name.clone(),
                    field: name.clone(),
                    target_field: fk.field.clone(),
                    cascade: fk
                        .on_delete
                        .as_deref()
                        .is_some_and(|action| action.eq_ignore_ascii_case("CASCADE")),
                });
            }
        }
    }
    index
}

// ─── Row matching ────────────────────────────────────────────────

/// Check if a record matches a set of WHERE clauses, evaluated left to right.
fn matches_where(record: &Value, clauses: &[WhereClause]) -> bool {
    let mut result = true;
    let mut pending_or = false;

    for (i, clause) in clauses.iter().enumerate() {
        let field_val = record.get(&clause.field).unwrap_or(&Value::Null);
        let clause_match = match_operator(field_val, &clause.value, &clause.operator);

        result = if i == 0 {
            clause_match
        } else if pending_or {
            result || clause_match
        } else {
            result && clause_match
        };

        pending_or = matches!(clause.connector, Some(Connector::Or));
    }

    result
}

fn match_operator(field_val: &Value, target: &Value, op: &Operator) -> bool {
    match op {
        Operator::Eq => field_val == target || numbers_equal(field_val, target),
        Operator::Ne => !(field_val == target || numbers_equal(field_val, target)),
        Operator::Lt => compare_json(field_val, target) == Some(Ordering::Less),
        Operator::Lte => matches!(
            compare_json(field_val, target),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => compare_json(field_val, target) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            compare_json(field_val, target),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::In => match target {
            Value::Array(arr) => arr.contains(field_val),
            single => field_val == single,
        },
    }
}

// 20 and 20.0 are the same amount.
fn numbers_equal(a: &Value, b: &Value) -> bool {
    compare_json(a, b) == Some(Ordering::Equal) && a.is_number()
}

/// Compare two JSON values numerically or lexicographically.
fn compare_json(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(an), Value::Number(bn)) => an.as_f64()?.partial_cmp(&bn.as_f64()?),
        (Value::String(a_s), Value::String(b_s)) => Some(a_s.cmp(b_s)),
        (Value::Bool(a_b), Value::Bool(b_b)) => Some(a_b.cmp(b_b)),
        _ => None,
    }
}

fn sort_records(records: &mut [Value], query: &FindManyQuery) {
    if let Some(ref sort) = query.sort_by {
        records.sort_by(|a, b| {
            let cmp = match (a.get(&sort.field), b.get(&sort.field)) {
                (Some(av), Some(bv)) => compare_json(av, bv).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            match sort.direction {
                SortDirection::Asc => cmp,
                SortDirection::Desc => cmp.reverse(),
            }
        });
    }
}

fn merge_update(record: &mut Value, data: &Value) {
    if let (Some(rec_obj), Some(data_obj)) = (record.as_object_mut(), data.as_object()) {
        for (k, v) in data_obj {
            rec_obj.insert(k.clone(), v.clone());
        }
    }
}

// ─── Table operations ────────────────────────────────────────────
//
// Shared by the adapter (under its lock) and by transactions (on staged tables).

/// Reject `candidate` if one of its unique fields collides with a row other
/// than the one at `skip`.
fn check_unique(
    rows: &[Value],
    fields: &[String],
    model: &str,
    candidate: &Value,
    skip: Option<usize>,
) -> AdapterResult<()> {
    for field in fields {
        let value = match candidate.get(field) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        let clash = rows
            .iter()
            .enumerate()
            .any(|(i, row)| Some(i) != skip && row.get(field) == Some(value));
        if clash {
            return Err(EduStoreError::UniqueViolation {
                model: model.to_string(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

fn insert(tables: &mut Tables, unique: &UniqueIndex, model: &str, data: Value) -> AdapterResult<Value> {
    let mut record = data;
    let obj = record
        .as_object_mut()
        .ok_or_else(|| EduStoreError::Serialization(format!("{model}: row must be a JSON object")))?;
    if obj.get("id").map_or(true, Value::is_null) {
        obj.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
    }

    let rows = tables.entry(model.to_string()).or_default();
    if let Some(fields) = unique.get(model) {
        check_unique(rows, fields, model, &record, None)?;
    } else {
        check_unique(rows, &["id".to_string()], model, &record, None)?;
    }
    rows.push(record.clone());
    Ok(record)
}

fn find_one(tables: &Tables, model: &str, where_clauses: &[WhereClause]) -> Option<Value> {
    tables
        .get(model)?
        .iter()
        .find(|r| matches_where(r, where_clauses))
        .cloned()
}

fn find_many(tables: &Tables, model: &str, query: FindManyQuery) -> Vec<Value> {
    let mut result: Vec<Value> = tables
        .get(model)
        .map(|rows| {
            rows.iter()
                .filter(|r| matches_where(r, &query.where_clauses))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    sort_records(&mut result, &query);

    let offset = query.offset.unwrap_or(0).max(0) as usize;
    let limit = query.limit.map_or(usize::MAX, |l| l.max(0) as usize);
    result.into_iter().skip(offset).take(limit).collect()
}

fn count(tables: &Tables, model: &str, where_clauses: &[WhereClause]) -> i64 {
    tables.get(model).map_or(0, |rows| {
        rows.iter().filter(|r| matches_where(r, where_clauses)).count() as i64
    })
}

fn update(
    tables: &mut Tables,
    unique: &UniqueIndex,
    model: &str,
    where_clauses: &[WhereClause],
    data: &Value,
    limit_one: bool,
) -> AdapterResult<Vec<Value>> {
    let rows = match tables.get_mut(model) {
        Some(rows) => rows,
        None => return Ok(Vec::new()),
    };
    let fields = unique.get(model).cloned().unwrap_or_default();

    let targets: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| matches_where(r, where_clauses))
        .map(|(i, _)| i)
        .take(if limit_one { 1 } else { usize::MAX })
        .collect();

    // Validate every change before applying any of them.
    let mut updated = Vec::with_capacity(targets.len());
    for &i in &targets {
        let mut candidate = rows[i].clone();
        merge_update(&mut candidate, data);
        check_unique(rows, &fields, model, &candidate, Some(i))?;
        updated.push((i, candidate));
    }
    Ok(updated
        .into_iter()
        .map(|(i, candidate)| {
            rows[i] = candidate.clone();
            candidate
        })
        .collect())
}

fn delete(
    tables: &mut Tables,
    references: &ReferenceIndex,
    model: &str,
    where_clauses: &[WhereClause],
    limit_one: bool,
) -> AdapterResult<i64> {
    let doomed: Vec<Value> = match tables.get(model) {
        Some(rows) => rows
            .iter()
            .filter(|r| matches_where(r, where_clauses))
            .take(if limit_one { 1 } else { usize::MAX })
            .cloned()
            .collect(),
        None => return Ok(0),
    };
    let removed = doomed.len() as i64;
    if doomed.is_empty() {
        return Ok(0);
    }

    // Work on a copy so a refused delete leaves every table untouched.
    let mut staged = tables.clone();
    remove_rows(&mut staged, references, model, &doomed)?;
    *tables = staged;
    Ok(removed)
}

/// Remove `doomed` from `model`, following the references that point at it.
fn remove_rows(
    tables: &mut Tables,
    references: &ReferenceIndex,
    model: &str,
    doomed: &[Value],
) -> AdapterResult<()> {
    let ids: Vec<&Value> = doomed.iter().filter_map(|r| r.get("id")).collect();
    if let Some(rows) = tables.get_mut(model) {
        rows.retain(|r| r.get("id").map_or(true, |id| !ids.contains(&id)));
    }

    for fk in references.get(model).into_iter().flatten() {
        let keys: Vec<&Value> = doomed
            .iter()
            .filter_map(|r| r.get(&fk.target_field))
            .filter(|v| !v.is_null())
            .collect();
        let children: Vec<Value> = tables
            .get(&fk.table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get(&fk.field).is_some_and(|v| keys.contains(&v)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if children.is_empty() {
            continue;
        }
        if !fk.cascade {
            return Err(EduStoreError::ForeignKeyViolation {
                model: model.to_string(),
                referenced_by: format!("{}.{}", fk.table, fk.field),
            });
        }
        remove_rows(tables, references, &fk.table, &children)?;
    }
    Ok(())
}

fn create_unless_exists(
    tables: &mut Tables,
    unique: &UniqueIndex,
    model: &str,
    conflict: &[WhereClause],
    data: Value,
) -> AdapterResult<Option<Value>> {
    if find_one(tables, model, conflict).is_some() {
        return Ok(None);
    }
    insert(tables, unique, model, data).map(Some)
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn create(&self, model: &str, data: Value) -> AdapterResult<Value> {
        let unique = self.unique.read().await;
        let mut store = self.store.write().await;
        insert(&mut store, &unique, model, data)
    }

    async fn create_unless_exists(
        &self,
        model: &str,
        conflict: &[WhereClause],
        data: Value,
    ) -> AdapterResult<Option<Value>> {
        let unique = self.unique.read().await;
        let mut store = self.store.write().await;
        create_unless_exists(&mut store, &unique, model, conflict, data)
    }

    async fn find_one(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<Option<Value>> {
        Ok(find_one(&*self.store.read().await, model, where_clauses))
    }

    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<Value>> {
        Ok(find_many(&*self.store.read().await, model, query))
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        Ok(count(&*self.store.read().await, model, where_clauses))
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: Value,
    ) -> AdapterResult<Option<Value>> {
        let unique = self.unique.read().await;
        let mut store = self.store.write().await;
        Ok(update(&mut store, &unique, model, where_clauses, &data, true)?
            .into_iter()
            .next())
    }

    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: Value,
    ) -> AdapterResult<i64> {
        let unique = self.unique.read().await;
        let mut store = self.store.write().await;
        Ok(update(&mut store, &unique, model, where_clauses, &data, false)?.len() as i64)
    }

    async fn delete(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<()> {
        let references = self.references.read().await;
        delete(&mut *self.store.write().await, &references, model, where_clauses, true)?;
        Ok(())
    }

    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let references = self.references.read().await;
        delete(&mut *self.store.write().await, &references, model, where_clauses, false)
    }

    async fn create_schema(&self, schema: &Schema) -> AdapterResult<SchemaStatus> {
        let mut unique = self.unique.write().await;
        let mut references = self.references.write().await;
        let wanted = (unique_index(schema), reference_index(schema));
        if *unique == wanted.0 && *references == wanted.1 {
            return Ok(SchemaStatus::UpToDate);
        }
        *unique = wanted.0;
        *references = wanted.1;
        tracing::debug!(tables = schema.tables.len(), "registered in-memory constraints");
        Ok(SchemaStatus::Applied { statements: Vec::new() })
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        let unique = self.unique.read().await.clone();
        let references = self.references.read().await.clone();
        let guard = self.store.clone().write_owned().await;
        let staging = guard.clone();
        Ok(Box::new(MemoryTransactionAdapter {
            state: Mutex::new(TxState {
                guard: Some(guard),
                staging,
            }),
            unique,
            references,
        }))
    }
}

// ─── Transaction Adapter ─────────────────────────────────────────

/// In-memory transaction.
///
/// Holds the parent's write lock for its whole lifetime, so transactions are
/// serialized with every other access. Writes go to a staged copy that
/// replaces the tables on commit; rollback or drop discards it. Using the
/// parent adapter from the task that owns an open transaction deadlocks.
struct MemoryTransactionAdapter {
    state: Mutex<TxState>,
    unique: UniqueIndex,
    references: ReferenceIndex,
}

struct TxState {
    guard: Option<OwnedRwLockWriteGuard<Tables>>,
    staging: Tables,
}

impl std::fmt::Debug for MemoryTransactionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransactionAdapter").finish()
    }
}

#[async_trait]
impl Adapter for MemoryTransactionAdapter {
    async fn create(&self, model: &str, data: Value) -> AdapterResult<Value> {
        let mut state = self.state.lock().await;
        insert(&mut state.staging, &self.unique, model, data)
    }

    async fn create_unless_exists(
        &self,
        model: &str,
        conflict: &[WhereClause],
        data: Value,
    ) -> AdapterResult<Option<Value>> {
        let mut state = self.state.lock().await;
        create_unless_exists(&mut state.staging, &self.unique, model, conflict, data)
    }

    async fn find_one(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<Option<Value>> {
        Ok(find_one(&self.state.lock().await.staging, model, where_clauses))
    }

    async fn find_many(&self, model: &str, query: FindManyQuery) -> AdapterResult<Vec<Value>> {
        Ok(find_many(&self.state.lock().await.staging, model, query))
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        Ok(count(&self.state.lock().await.staging, model, where_clauses))
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: Value,
    ) -> AdapterResult<Option<Value>> {
        let mut state = self.state.lock().await;
        Ok(update(&mut state.staging, &self.unique, model, where_clauses, &data, true)?
            .into_iter()
            .next())
    }

    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: Value,
    ) -> AdapterResult<i64> {
        let mut state = self.state.lock().await;
        Ok(update(&mut state.staging, &self.unique, model, where_clauses, &data, false)?.len() as i64)
    }

    async fn delete(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<()> {
        let mut state = self.state.lock().await;
        delete(&mut state.staging, &self.references, model, where_clauses, true)?;
        Ok(())
    }

    async fn delete_many(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let mut state = self.state.lock().await;
        delete(&mut state.staging, &self.references, model, where_clauses, false)
    }

    async fn create_schema(&self, _schema: &Schema) -> AdapterResult<SchemaStatus> {
        Err(EduStoreError::Database(
            "schema changes are not allowed inside a transaction".into(),
        ))
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        Err(EduStoreError::Database("nested transactions are not supported".into()))
    }
}

#[async_trait]
impl TransactionAdapter for MemoryTransactionAdapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()> {
        let TxState { guard, staging } = self.state.into_inner();
        match guard {
            Some(mut guard) => {
                *guard = staging;
                Ok(())
            }
            None => Err(EduStoreError::Database("transaction already finished".into())),
        }
    }

    async fn rollback(self: Box<Self>) -> AdapterResult<()> {
        // Dropping the guard releases the lock; staged writes are discarded.
        drop(self.state.into_inner());
        Ok(())
    }
}
