//! WHERE-clause builder for listing queries
//!
//! Conditions are AND-combined. Every value travels as a bound parameter;
//! only column names and placeholders are spliced into the SQL text.

use chrono::{DateTime, Utc};
use sqlx::{
    mysql::MySqlArguments, query::Query, sqlite::SqliteArguments, MySql, Sqlite,
};

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    conditions: Vec<String>,
    params: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition whose `?` placeholders match `params` in order
    pub fn push(
        &mut self,
        condition: impl Into<String>,
        params: impl IntoIterator<Item = SqlValue>,
    ) -> &mut Self {
        self.conditions.push(condition.into());
        self.params.extend(params);
        self
    }

    /// Add a condition without parameters
    pub fn push_raw(&mut self, condition: impl Into<String>) -> &mut Self {
        self.conditions.push(condition.into());
        self
    }

    /// Case-insensitive substring match against any of `columns`
    ///
    /// SQLite's `LOWER()` only folds ASCII, so each column is compared twice:
    /// once with the same SQL folding on both sides, and once against the
    /// needle lowercased in full Unicode.
    pub fn push_search(&mut self, columns: &[&str], needle: &str) -> &mut Self {
        if columns.is_empty() {
            return self;
        }
        let pattern = like_pattern(needle);
        let folded = pattern.to_lowercase();
        let condition = columns
            .iter()
            .map(|col| {
                format!(
                    "LOWER({col}) LIKE LOWER(?) ESCAPE '!' OR LOWER({col}) LIKE ? ESCAPE '!'"
                )
            })
            .collect::<Vec<_>>()
            .join(" OR ");
        let params = columns
            .iter()
            .flat_map(|_| [SqlValue::Text(pattern.clone()), SqlValue::Text(folded.clone())])
            .collect::<Vec<_>>();
        self.push(format!("({})", condition), params)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `" WHERE a AND b"`, or an empty string when there are no conditions
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

/// `%needle%` with LIKE wildcards escaped by `!`
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '!') {
            pattern.push('!');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// `?, ?, ?` for an IN list of `n` items
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub(crate) fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param.clone() {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Timestamp(v) => query.bind(v),
        };
    }
    query
}

pub(crate) fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param.clone() {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Timestamp(v) => query.bind(v),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_clause() {
        let clause = WhereClause::new();
        assert!(clause.is_empty());
        assert_eq!(clause.sql(), "");
        assert!(clause.params().is_empty());
    }

    #[test]
    fn test_conditions_and_combine() {
        let mut clause = WhereClause::new();
        clause
            .push_raw("p.deleted_at IS NULL")
            .push("p.author_id = ?", [SqlValue::Int(3)]);

        assert_eq!(clause.sql(), " WHERE p.deleted_at IS NULL AND p.author_id = ?");
        assert_eq!(clause.params(), &[SqlValue::Int(3)]);
    }

    #[test]
    fn test_search_is_or_group() {
        let mut clause = WhereClause::new();
        clause.push("p.status = ?", [SqlValue::from("published")]);
        clause.push_search(&["p.title", "p.content"], "Rust");

        assert_eq!(
            clause.sql(),
            " WHERE p.status = ? AND (\
             LOWER(p.title) LIKE LOWER(?) ESCAPE '!' OR LOWER(p.title) LIKE ? ESCAPE '!' OR \
             LOWER(p.content) LIKE LOWER(?) ESCAPE '!' OR LOWER(p.content) LIKE ? ESCAPE '!')"
        );
        assert_eq!(clause.params().len(), 5);
        assert_eq!(clause.params()[1], SqlValue::Text("%Rust%".to_string()));
        assert_eq!(clause.params()[2], SqlValue::Text("%rust%".to_string()));
    }

    #[test]
    fn test_search_keeps_needle_case_for_sql_folding() {
        let mut clause = WhereClause::new();
        clause.push_search(&["p.title"], "Éclair");

        assert_eq!(
            clause.params(),
            &[
                SqlValue::Text("%Éclair%".to_string()),
                SqlValue::Text("%éclair%".to_string()),
            ]
        );
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), "%100!%%");
        assert_eq!(like_pattern("a_b"), "%a!_b%");
        assert_eq!(like_pattern("hey!"), "%hey!!%");
        assert_eq!(like_pattern("Café"), "%Café%");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }
}
