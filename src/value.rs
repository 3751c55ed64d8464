//! Value-level SQL literals.
//!
//! Identifiers (tables, columns) are trusted and spliced as-is. Values are
//! not: every value goes through [`SqlValue`] and is rendered as a quoted
//! literal, so a stray quote in test data cannot change the statement shape.

use std::fmt;

/// Trait for rendering a value as SQL text.
pub trait ToSql {
    /// Convert this value to SQL text.
    fn to_sql(&self) -> String;
}

/// Dynamic scalar used in predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl SqlValue {
    /// Convert a JSON scalar (e.g. the `id` of a fetched row).
    ///
    /// Arrays and objects have no literal form and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(SqlValue::Null),
            serde_json::Value::Bool(b) => Some(SqlValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(SqlValue::Int)
                .or_else(|| n.as_f64().map(SqlValue::Float)),
            serde_json::Value::String(s) => Some(SqlValue::String(s.clone())),
            _ => None,
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::Float(f) if f.is_finite() => f.to_string(),
            SqlValue::Float(_) => "NULL".to_string(),
            SqlValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

/// An unexecuted `SELECT` embedded verbatim by `IN (...)` / `EXISTS (...)`.
///
/// Built from another chain with [`crate::query::EntityQuery::subquery`], or
/// from hand-written SQL with [`Subquery::raw`] when the filter must refer to
/// the outer query:
///
/// ```rust,ignore
/// let commented = Subquery::raw("SELECT 1 FROM comments WHERE comments.user_id = users.id");
/// let user = fixtures.table("users").exists(commented).get_random_entity()?;
/// ```
///
/// Plain `&str`/`String` values passed to `id_in` stay quoted literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subquery(String);

impl Subquery {
    pub(crate) fn new(sql: String) -> Self {
        Self(sql)
    }

    /// Wrap hand-written SQL. Nothing is escaped.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToSql for Subquery {
    fn to_sql(&self) -> String {
        // Blank lines keep nested queries readable in verbose logs.
        format!("\n\n{}\n\n", self.0)
    }
}

/// Right-hand side of an `IN` / `NOT IN` predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum InValues {
    Scalar(SqlValue),
    List(Vec<SqlValue>),
    Subquery(Subquery),
}

impl ToSql for InValues {
    fn to_sql(&self) -> String {
        match self {
            InValues::Scalar(v) => v.to_sql(),
            InValues::List(values) => values
                .iter()
                .map(ToSql::to_sql)
                .collect::<Vec<_>>()
                .join(","),
            InValues::Subquery(q) => q.to_sql(),
        }
    }
}

macro_rules! scalar_in_values {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for InValues {
                fn from(v: $ty) -> Self {
                    InValues::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_in_values!(bool, i32, i64, u32, f64, &str, String, SqlValue);

impl<T: Into<SqlValue>> From<Vec<T>> for InValues {
    fn from(values: Vec<T>) -> Self {
        InValues::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue> + Clone> From<&[T]> for InValues {
    fn from(values: &[T]) -> Self {
        InValues::List(values.iter().cloned().map(Into::into).collect())
    }
}

impl From<Subquery> for InValues {
    fn from(q: Subquery) -> Self {
        InValues::Subquery(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_rendering() {
        assert_eq!(SqlValue::from(42).to_sql(), "42");
        assert_eq!(SqlValue::from(true).to_sql(), "true");
        assert_eq!(SqlValue::Null.to_sql(), "NULL");
        assert_eq!(SqlValue::from("O'Brien").to_sql(), "'O''Brien'");
    }

    #[test]
    fn test_quote_cannot_escape_literal() {
        let v = SqlValue::from("1'); DROP TABLE users; --");
        assert_eq!(v.to_sql(), "'1''); DROP TABLE users; --'");
    }

    #[test]
    fn test_in_values() {
        assert_eq!(InValues::from(7).to_sql(), "7");
        assert_eq!(InValues::from(vec![1, 2, 3]).to_sql(), "1,2,3");
        assert_eq!(InValues::from(&["a", "b"][..]).to_sql(), "'a','b'");

        let sub = Subquery::new("SELECT id FROM users\nWHERE 1 = 1".to_string());
        assert_eq!(
            InValues::from(sub).to_sql(),
            "\n\nSELECT id FROM users\nWHERE 1 = 1\n\n"
        );
    }

    #[test]
    fn test_raw_subquery_is_verbatim_but_str_is_literal() {
        let sql = "SELECT user_id FROM comments WHERE comments.user_id = users.id";
        assert_eq!(
            InValues::from(Subquery::raw(sql)).to_sql(),
            format!("\n\n{}\n\n", sql)
        );
        assert_eq!(
            InValues::from(sql).to_sql(),
            "'SELECT user_id FROM comments WHERE comments.user_id = users.id'"
        );
    }

    #[test]
    fn test_from_json() {
        assert_eq!(SqlValue::from_json(&json!(5)), Some(SqlValue::Int(5)));
        assert_eq!(
            SqlValue::from_json(&json!("abc")),
            Some(SqlValue::String("abc".to_string()))
        );
        assert_eq!(SqlValue::from_json(&json!([1])), None);
    }
}
