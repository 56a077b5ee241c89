// Query builder: converts core adapter types into SQL fragments.
//
// Generates dynamic SQL with positional bind parameters ($1, $2, ...) for
// `sqlx::query()`. Identifiers are always double-quoted, which both SQLite
// and Postgres accept (and which makes the `order` table name legal).

use edustore_core::db::adapter::{Connector, FindManyQuery, Operator, SortDirection, WhereClause};

/// A built SQL fragment with its bind values.
#[derive(Debug, Clone)]
pub struct SqlFragment {
    /// The SQL string with $N placeholders.
    pub sql: String,
    /// The bind values in order.
    pub binds: Vec<serde_json::Value>,
}

impl SqlFragment {
    pub fn empty() -> Self {
        Self {
            sql: String::new(),
            binds: Vec::new(),
        }
    }
}

/// Build a WHERE clause from a slice of `WhereClause`.
///
/// Returns a fragment starting with " WHERE ..." (empty for an empty slice).
/// Placeholders are numbered from `bind_offset + 1`.
pub fn build_where(clauses: &[WhereClause], bind_offset: usize) -> SqlFragment {
    if clauses.is_empty() {
        return SqlFragment::empty();
    }

    let mut sql = String::from(" WHERE ");
    let mut binds = Vec::new();
    let mut param_idx = bind_offset + 1;

    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            // The connector is set on the *previous* clause.
            match clauses[i - 1].connector.unwrap_or(Connector::And) {
                Connector::And => sql.push_str(" AND "),
                Connector::Or => sql.push_str(" OR "),
            }
        }

        let field = quote_identifier(&clause.field);
        let mut push_cmp = |op: &str, sql: &mut String| {
            sql.push_str(&format!("{field} {op} ${param_idx}"));
            binds.push(clause.value.clone());
            param_idx += 1;
        };

        match clause.operator {
            Operator::Eq if clause.value.is_null() => sql.push_str(&format!("{field} IS NULL")),
            Operator::Ne if clause.value.is_null() => {
                sql.push_str(&format!("{field} IS NOT NULL"))
            }
            Operator::Eq => push_cmp("=", &mut sql),
            Operator::Ne => push_cmp("!=", &mut sql),
            Operator::Lt => push_cmp("<", &mut sql),
            Operator::Lte => push_cmp("<=", &mut sql),
            Operator::Gt => push_cmp(">", &mut sql),
            Operator::Gte => push_cmp(">=", &mut sql),
            Operator::In => match clause.value.as_array() {
                // `IN ()` is a syntax error; an empty list matches nothing.
                Some(arr) if arr.is_empty() => sql.push_str("1 = 0"),
                Some(arr) => {
                    let placeholders: Vec<String> = arr
                        .iter()
                        .map(|v| {
                            let p = format!("${param_idx}");
                            binds.push(v.clone());
                            param_idx += 1;
                            p
                        })
                        .collect();
                    sql.push_str(&format!("{field} IN ({})", placeholders.join(", ")));
                }
                None => push_cmp("=", &mut sql),
            },
        }
    }

    SqlFragment { sql, binds }
}

/// Build an ORDER BY clause from a `FindManyQuery`.
pub fn build_order_by(query: &FindManyQuery) -> String {
    match &query.sort_by {
        Some(sort) => {
            let dir = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!(" ORDER BY {} {}", quote_identifier(&sort.field), dir)
        }
        None => String::new(),
    }
}

/// Build LIMIT and OFFSET clauses.
pub fn build_limit_offset(query: &FindManyQuery) -> String {
    let mut sql = String::new();
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit.max(0)));
    } else if query.offset.is_some() {
        // SQLite requires LIMIT before OFFSET. Use -1 for unlimited.
        sql.push_str(" LIMIT -1");
    }
    if let Some(offset) = query.offset {
        sql.push_str(&format!(" OFFSET {}", offset.max(0)));
    }
    sql
}

/// Columns and values of an insert, skipping nulls so absent columns fall
/// back to NULL without a typed null bind.
fn insert_columns(data: &serde_json::Value) -> (Vec<String>, Vec<serde_json::Value>) {
    data.as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (quote_identifier(k), v.clone()))
                .unzip()
        })
        .unwrap_or_default()
}

fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build an INSERT statement.
pub fn build_insert(table: &str, data: &serde_json::Value) -> SqlFragment {
    let (columns, binds) = insert_columns(data);
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        columns.join(", "),
        placeholders(1, binds.len())
    );
    SqlFragment { sql, binds }
}

/// Build `INSERT .. SELECT .. WHERE NOT EXISTS (..)`: one statement that
/// inserts only when no row matches `conflict`.
pub fn build_insert_unless_exists(
    table: &str,
    data: &serde_json::Value,
    conflict: &[WhereClause],
) -> SqlFragment {
    let (columns, mut binds) = insert_columns(data);
    let where_frag = build_where(conflict, binds.len());
    let sql = format!(
        "INSERT INTO {t} ({cols}) SELECT {vals} WHERE NOT EXISTS (SELECT 1 FROM {t}{cond})",
        t = quote_identifier(table),
        cols = columns.join(", "),
        vals = placeholders(1, binds.len()),
        cond = where_frag.sql,
    );
    binds.extend(where_frag.binds);
    SqlFragment { sql, binds }
}

/// Build an UPDATE SET clause from a JSON object.
///
/// Nulls become literal `NULL` assignments; everything else is bound.
pub fn build_update_set(data: &serde_json::Value, bind_offset: usize) -> SqlFragment {
    let obj = match data.as_object() {
        Some(o) => o,
        None => return SqlFragment::empty(),
    };

    let mut set_parts = Vec::new();
    let mut binds = Vec::new();
    let mut param_idx = bind_offset + 1;

    for (key, value) in obj {
        if value.is_null() {
            set_parts.push(format!("{} = NULL", quote_identifier(key)));
            continue;
        }
        set_parts.push(format!("{} = ${}", quote_identifier(key), param_idx));
        binds.push(value.clone());
        param_idx += 1;
    }

    SqlFragment {
        sql: set_parts.join(", "),
        binds,
    }
}

/// Quote a SQL identifier (table/column name).
pub fn quote_identifier(name: &str) -> String {
    let clean = name.replace('"', "");
    format!("\"{}\"", clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_where_empty() {
        let frag = build_where(&[], 0);
        assert!(frag.sql.is_empty());
        assert!(frag.binds.is_empty());
    }

    #[test]
    fn test_build_where_and_chain() {
        let clauses = vec![
            WhereClause::eq("email", "a@x.io").and(),
            WhereClause::eq("used", false).and(),
            WhereClause::gt("expiresAt", 1000),
        ];
        let frag = build_where(&clauses, 0);
        assert_eq!(
            frag.sql,
            " WHERE \"email\" = $1 AND \"used\" = $2 AND \"expiresAt\" > $3"
        );
        assert_eq!(frag.binds, vec![json!("a@x.io"), json!(false), json!(1000)]);
    }

    #[test]
    fn test_build_where_null_and_offset() {
        let clauses = vec![
            WhereClause::eq("completedAt", serde_json::Value::Null).and(),
            WhereClause::eq("id", "o1"),
        ];
        let frag = build_where(&clauses, 2);
        assert_eq!(frag.sql, " WHERE \"completedAt\" IS NULL AND \"id\" = $3");
        assert_eq!(frag.binds.len(), 1);
    }

    #[test]
    fn test_build_where_in_and_or() {
        let clauses = vec![
            WhereClause::is_in("id", json!(["a", "b"])).or(),
            WhereClause::eq("status", "PENDING"),
        ];
        let frag = build_where(&clauses, 0);
        assert_eq!(frag.sql, " WHERE \"id\" IN ($1, $2) OR \"status\" = $3");
    }

    #[test]
    fn test_build_where_empty_in_matches_nothing() {
        let frag = build_where(&[WhereClause::is_in("id", json!([]))], 0);
        assert_eq!(frag.sql, " WHERE 1 = 0");
        assert!(frag.binds.is_empty());
    }

    #[test]
    fn test_build_insert_skips_nulls() {
        let frag = build_insert("order", &json!({"id": "o1", "completedAt": null}));
        assert_eq!(frag.sql, "INSERT INTO \"order\" (\"id\") VALUES ($1)");
        assert_eq!(frag.binds, vec![json!("o1")]);
    }

    #[test]
    fn test_build_insert_unless_exists() {
        let frag = build_insert_unless_exists(
            "otp_code",
            &json!({"code": "123456", "id": "c1"}),
            &[WhereClause::eq("email", "a@x.io").and(), WhereClause::eq("used", false)],
        );
        assert_eq!(
            frag.sql,
            "INSERT INTO \"otp_code\" (\"code\", \"id\") SELECT $1, $2 \
             WHERE NOT EXISTS (SELECT 1 FROM \"otp_code\" WHERE \"email\" = $3 AND \"used\" = $4)"
        );
        assert_eq!(frag.binds.len(), 4);
    }

    #[test]
    fn test_build_update_set_null_literal() {
        let frag = build_update_set(&json!({"completedAt": null, "status": "PENDING"}), 0);
        assert_eq!(frag.sql, "\"completedAt\" = NULL, \"status\" = $1");
        assert_eq!(frag.binds, vec![json!("PENDING")]);
    }

    #[test]
    fn test_limit_offset() {
        let q = FindManyQuery::default().paged(10, 20);
        assert_eq!(build_limit_offset(&q), " LIMIT 10 OFFSET 20");
        let only_offset = FindManyQuery {
            offset: Some(5),
            ..Default::default()
        };
        assert_eq!(build_limit_offset(&only_offset), " LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_quote_identifier_strips_quotes() {
        assert_eq!(quote_identifier("order"), "\"order\"");
        assert_eq!(quote_identifier("a\"b"), "\"ab\"");
    }
}
