//! Query state and SQL fragment rendering.
//!
//! [`QueryState`] accumulates the pieces of one chain (select list, FROM/JOIN
//! text, WHERE predicates) and renders them into the statement shapes used by
//! [`crate::query::EntityQuery`]. Nothing here talks to a database.
//!
//! ```text
//! SELECT <cols> FROM <table|joins>
//! WHERE 1 = 1 AND <pred> AND <pred> [ORDER BY <expr>] [LIMIT <n>];
//! ```

use std::fmt;

/// Number of rows capped by the accelerated random pick.
pub const RANDOM_LIMIT: u64 = 1000;

/// Default `ORDER BY` expression.
pub const RANDOM_ORDER: &str = "RANDOM()";

/// Argument of a `LIMIT` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    All,
    Count(u64),
}

impl Default for Limit {
    fn default() -> Self {
        Limit::Count(1)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::All => f.write_str("ALL"),
            Limit::Count(n) => write!(f, "{}", n),
        }
    }
}

impl From<u64> for Limit {
    fn from(n: u64) -> Self {
        Limit::Count(n)
    }
}

/// How a joined table participates in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Rows with a match in the joined table.
    Inner,
    /// Rows with no match: `LEFT JOIN` plus `IS NULL` on the joined key.
    Anti,
}

impl JoinKind {
    pub fn from_matched(matched: bool) -> Self {
        if matched { JoinKind::Inner } else { JoinKind::Anti }
    }
}

/// Mutable state of one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    /// Table that receives predicates; the last joined one.
    current_table: String,
    /// Root table of the chain.
    main_table: String,
    from: String,
    where_clause: String,
    what: String,
    join_count: usize,
}

impl QueryState {
    /// Start a new chain rooted at `table`.
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            current_table: table.clone(),
            main_table: table.clone(),
            from: table,
            where_clause: Self::new_where(),
            what: "*".to_string(),
            join_count: 0,
        }
    }

    /// Re-root the chain. Predicates and join bookkeeping are discarded.
    pub fn reset(&mut self, table: impl Into<String>) {
        *self = Self::new(table);
    }

    // The always-true seed lets every predicate be appended with AND.
    fn new_where() -> String {
        "\nWHERE 1 = 1".to_string()
    }

    pub fn current_table(&self) -> &str {
        &self.current_table
    }

    pub fn main_table(&self) -> &str {
        &self.main_table
    }

    pub fn join_count(&self) -> usize {
        self.join_count
    }

    pub fn set_current_table(&mut self, table: impl Into<String>) {
        self.current_table = table.into();
    }

    /// Override the select list.
    pub fn set_fields(&mut self, what: impl Into<String>) {
        self.what = what.into();
    }

    /// Append ` AND <predicate>` to the WHERE clause.
    pub fn push_predicate(&mut self, predicate: &str) {
        self.where_clause.push_str(" AND ");
        self.where_clause.push_str(predicate);
    }

    /// `SELECT <what>`
    pub fn select(&self) -> String {
        format!("SELECT {}", self.what)
    }

    /// ` FROM <from>`, or ` FROM (<from>) AS foo` when the FROM content is
    /// itself a query.
    pub fn from(&self, aliased: bool) -> String {
        if aliased {
            format!(" FROM ({}) AS foo", self.from)
        } else {
            format!(" FROM {}", self.from)
        }
    }

    pub fn where_clause(&self) -> &str {
        &self.where_clause
    }

    pub fn order(&self, expr: &str) -> String {
        format!(" ORDER BY {}", expr)
    }

    /// ` LIMIT <n>`; nothing for [`Limit::All`], which SQLite has no
    /// keyword for.
    pub fn limit(&self, limit: Limit) -> String {
        match limit {
            Limit::All => String::new(),
            Limit::Count(n) => format!(" LIMIT {}", n),
        }
    }

    pub fn delete_from(&self) -> String {
        format!("DELETE FROM {}", self.from)
    }

    pub fn semicolon(&self) -> &'static str {
        ";"
    }

    /// `SELECT <what> FROM <from> WHERE 1 = 1 ...` without a terminator.
    pub fn select_from_where(&self) -> String {
        let mut sql = self.select();
        sql.push_str(&self.from(false));
        sql.push_str(self.where_clause());
        sql
    }

    /// Pick one random row out of the first [`RANDOM_LIMIT`] rows of `query`.
    ///
    /// A plain `ORDER BY RANDOM() LIMIT 1` sorts the whole candidate set;
    /// capping first bounds the sort to a thousand rows.
    pub fn accelerated_random(&self, query: &str) -> String {
        let mut outer = QueryState::new(format!(
            "\n\n{}{}\n\n",
            query,
            self.limit(Limit::Count(RANDOM_LIMIT))
        ));
        outer.what = "*".to_string();

        let mut sql = outer.select();
        sql.push_str(&outer.from(true));
        sql.push_str(&outer.order(RANDOM_ORDER));
        sql.push_str(&outer.limit(Limit::default()));
        sql.push_str(outer.semicolon());
        sql
    }

    /// Render `JOIN t2 ON t1.f1 = t2.f2`.
    ///
    /// The first join of a chain also selects `<main>.id AS id`, so that
    /// `id` in a joined row always means the root entity.
    pub fn join(&mut self, t1: &str, t2: &str, field1: &str, field2: &str) -> String {
        if self.join_count == 0 {
            self.what
                .push_str(&format!(", {}.id AS id", self.main_table));
        }
        self.join_count += 1;

        format!("\nJOIN {} ON {}.{} = {}.{}", t2, t1, field1, t2, field2)
    }

    /// Join `t2` and make it the current table.
    ///
    /// With [`JoinKind::Anti`] only rows of `t1` without a counterpart in
    /// `t2` survive.
    pub fn push_join(&mut self, t1: &str, t2: &str, field1: &str, field2: &str, kind: JoinKind) {
        self.current_table = t2.to_string();
        let join = self.join(t1, t2, field1, field2);

        match kind {
            JoinKind::Inner => self.from.push_str(&join),
            JoinKind::Anti => {
                self.from.push_str("\nLEFT");
                self.from.push_str(&join);
                self.push_predicate(&format!("{}.{} IS NULL", t2, field2));
            }
        }
    }
}
