//! Fluent fixture queries.
//!
//! A chain describes the entity a test needs and ends with a terminal call
//! that runs it:
//!
//! ```rust,ignore
//! let fixtures = Fixtures::new(DbGateway::connect(url)?);
//!
//! // a random visible photo nobody has used yet
//! let photo = fixtures.entity("photo").is("is_hidden", false).get_random_entity()?;
//!
//! // review 666
//! let review = fixtures.entity("review").with_id(666).get_random_entity()?;
//!
//! // users without any comment
//! let lonely = fixtures
//!     .table("users")
//!     .smart_join("users", "comments", "id", "user_id", false)
//!     .get_rows(Limit::All)?;
//!
//! // filter by another chain
//! let ids = fixtures.table("photos").fields("photos.user_id").subquery();
//! let authors = fixtures.table("users").id_in(ids).get_rows(Limit::Count(5))?;
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::MetaEntity;
use crate::engine::{Gateway, Row};
use crate::error::{DbError, DbResult};
use crate::registry::UsedIds;
use crate::state::{JoinKind, Limit, QueryState};
use crate::value::{InValues, SqlValue, Subquery, ToSql};

/// Entry point for fixture chains: a gateway, the run's used-id registry and
/// the configured meta entities.
pub struct Fixtures<G> {
    gateway: G,
    used: Arc<UsedIds>,
    meta: BTreeMap<String, MetaEntity>,
}

impl<G: Gateway> Fixtures<G> {
    /// Start a run with a fresh registry.
    pub fn new(gateway: G) -> Self {
        Self::with_registry(gateway, Arc::new(UsedIds::new()))
    }

    /// Share an existing registry, e.g. between per-thread gateways.
    pub fn with_registry(gateway: G, used: Arc<UsedIds>) -> Self {
        Self {
            gateway,
            used,
            meta: BTreeMap::new(),
        }
    }

    /// Register meta-entity layouts (usually `Config::meta`).
    pub fn with_meta(mut self, meta: BTreeMap<String, MetaEntity>) -> Self {
        self.meta = meta;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<UsedIds> {
        &self.used
    }

    /// Chain over a table.
    pub fn table(&self, name: &str) -> EntityQuery<'_, G> {
        EntityQuery::new(&self.gateway, &self.used, name)
    }

    /// Chain over the table of an entity noun (`review` → `reviews`).
    pub fn entity(&self, noun: &str) -> EntityQuery<'_, G> {
        EntityQuery::new(&self.gateway, &self.used, &pluralize(noun))
    }

    /// Chain over a configured multi-table entity.
    pub fn meta(&self, name: &str) -> DbResult<EntityQuery<'_, G>> {
        let meta = self
            .meta
            .get(name)
            .ok_or_else(|| DbError::UnknownMeta(name.to_string()))?;
        Ok(self.table(&meta.table).meta(meta))
    }
}

fn pluralize(noun: &str) -> String {
    format!("{}s", noun)
}

/// One chain under construction.
#[derive(Clone)]
pub struct EntityQuery<'a, G> {
    db: &'a G,
    used: &'a UsedIds,
    state: QueryState,
    unique: bool,
}

impl<'a, G: Gateway> EntityQuery<'a, G> {
    pub fn new(db: &'a G, used: &'a UsedIds, table: &str) -> Self {
        Self {
            db,
            used,
            state: QueryState::new(table),
            unique: false,
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    // ----------------------------------------------------------------------
    // Chain links
    // ----------------------------------------------------------------------

    /// Re-root the chain at `name`, dropping everything built so far.
    pub fn table(mut self, name: &str) -> Self {
        self.state.reset(name);
        self.unique = false;
        self
    }

    /// Re-root the chain at the table of an entity noun.
    pub fn entity(self, noun: &str) -> Self {
        self.table(&pluralize(noun))
    }

    /// Add the joins of a meta entity to a chain rooted at its main table.
    pub fn meta(mut self, meta: &MetaEntity) -> Self {
        let main = self.state.main_table().to_string();
        for join in &meta.joins {
            self.state.push_join(
                &main,
                &join.table,
                &join.from,
                &join.to,
                JoinKind::from_matched(join.matched),
            );
        }
        self
    }

    /// `AND <current>.<column> = true|false`
    pub fn is(mut self, column: &str, flag: bool) -> Self {
        let predicate = format!(
            "{}.{} = {}",
            self.state.current_table(),
            column,
            SqlValue::Bool(flag).to_sql()
        );
        self.state.push_predicate(&predicate);
        self
    }

    /// `AND <current>.<column> = <value>`
    pub fn where_eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        let predicate = format!(
            "{}.{} = {}",
            self.state.current_table(),
            column,
            value.into().to_sql()
        );
        self.state.push_predicate(&predicate);
        self
    }

    /// `AND <current>.id = <id>`
    pub fn with_id(self, id: impl Into<SqlValue>) -> Self {
        self.where_eq("id", id)
    }

    /// `AND <current>.<column> IS NULL`
    pub fn is_null(mut self, column: &str) -> Self {
        let predicate = format!("{}.{} IS NULL", self.state.current_table(), column);
        self.state.push_predicate(&predicate);
        self
    }

    /// `AND <current>.id IN (...)`; accepts a value, a list or a subquery.
    pub fn id_in(self, values: impl Into<InValues>) -> Self {
        let field = self.current_id();
        self.in_operator(&field, values.into(), false)
    }

    /// `AND <current>.id NOT IN (...)`
    pub fn id_not_in(self, values: impl Into<InValues>) -> Self {
        let field = self.current_id();
        self.in_operator(&field, values.into(), true)
    }

    /// `AND <field> IN (...)` for a field other than the current id.
    pub fn field_in(self, field: &str, values: impl Into<InValues>) -> Self {
        self.in_operator(field, values.into(), false)
    }

    /// `AND <field> NOT IN (...)`
    pub fn field_not_in(self, field: &str, values: impl Into<InValues>) -> Self {
        self.in_operator(field, values.into(), true)
    }

    fn current_id(&self) -> String {
        format!("{}.id", self.state.current_table())
    }

    fn in_operator(mut self, field: &str, values: InValues, not: bool) -> Self {
        // `IN ()` is not valid SQL: nothing is excluded, nothing is included.
        if matches!(&values, InValues::List(list) if list.is_empty()) {
            if !not {
                self.state.push_predicate("1 = 0");
            }
            return self;
        }

        let predicate = format!(
            "{}{} IN ({})",
            field,
            if not { " NOT" } else { "" },
            values.to_sql()
        );
        self.state.push_predicate(&predicate);
        self
    }

    /// `AND EXISTS (<subquery>)`
    pub fn exists(mut self, subquery: Subquery) -> Self {
        self.state
            .push_predicate(&format!("EXISTS ({})", subquery.to_sql()));
        self
    }

    /// `AND NOT EXISTS (<subquery>)`
    pub fn not_exists(mut self, subquery: Subquery) -> Self {
        self.state
            .push_predicate(&format!("NOT EXISTS ({})", subquery.to_sql()));
        self
    }

    /// Join `table` onto the main table; later predicates target it.
    pub fn join(self, table: &str, main_field: &str, joined_field: &str) -> Self {
        self.join_matching(table, main_field, joined_field, true)
    }

    /// Join `table` onto the main table, keeping either the rows with a match
    /// (`matched = true`) or the rows without one.
    pub fn join_matching(self, table: &str, main_field: &str, joined_field: &str, matched: bool) -> Self {
        let main = self.state.main_table().to_string();
        self.smart_join(&main, table, main_field, joined_field, matched)
    }

    /// `JOIN t2 ON t1.f1 = t2.f2`
    pub fn join_on(self, t1: &str, t2: &str, field1: &str, field2: &str) -> Self {
        self.smart_join(t1, t2, field1, field2, true)
    }

    /// Join `t2`; with `matched = false` render an anti-join
    /// (`LEFT JOIN` + `t2.f2 IS NULL`) so only rows of `t1` without a
    /// counterpart remain.
    pub fn smart_join(mut self, t1: &str, t2: &str, field1: &str, field2: &str, matched: bool) -> Self {
        self.state
            .push_join(t1, t2, field1, field2, JoinKind::from_matched(matched));
        self
    }

    /// Replace the `*` select list.
    pub fn fields(mut self, columns: &str) -> Self {
        self.state.set_fields(columns);
        self
    }

    /// Exclude every id of the main table already taken in this run.
    ///
    /// The exclusion is rendered from the registry at execution time, so ids
    /// taken after this call are excluded too.
    /// [`get_random_entity`](Self::get_random_entity) always excludes them.
    pub fn check_if_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn effective_state(&self) -> Cow<'_, QueryState> {
        if !self.unique {
            return Cow::Borrowed(&self.state);
        }
        let ids = self.used.ids(self.state.main_table());
        let mut state = self.state.clone();
        exclude_used(&mut state, &ids);
        Cow::Owned(state)
    }

    // ----------------------------------------------------------------------
    // Rendering
    // ----------------------------------------------------------------------

    /// The chain as an unexecuted `SELECT ... FROM ... WHERE ...` fragment.
    pub fn subquery(&self) -> Subquery {
        Subquery::new(self.effective_state().select_from_where())
    }

    /// Statement run by [`get_row`](Self::get_row).
    pub fn random_sql(&self) -> String {
        let state = self.effective_state();
        state.accelerated_random(&state.select_from_where())
    }

    /// Statement run by [`get_rows`](Self::get_rows).
    pub fn rows_sql(&self, limit: Limit) -> String {
        let state = self.effective_state();
        let mut sql = state.select_from_where();
        sql.push_str(&state.limit(limit));
        sql.push_str(state.semicolon());
        sql
    }

    /// Statement run by [`get_sorted_list`](Self::get_sorted_list).
    pub fn sorted_sql(&self, order: &str) -> String {
        let state = self.effective_state();
        let mut sql = state.select_from_where();
        sql.push_str(&state.order(order));
        sql.push_str(state.semicolon());
        sql
    }

    /// Statement run by [`check_if_exist`](Self::check_if_exist).
    pub fn exist_sql(&self) -> String {
        let state = self.effective_state();
        let mut sql = state.select_from_where();
        sql.push_str(state.semicolon());
        sql
    }

    /// Statement run by [`delete`](Self::delete).
    pub fn delete_sql(&self) -> String {
        let state = self.effective_state();
        let mut sql = state.delete_from();
        sql.push_str(state.where_clause());
        sql.push_str(state.semicolon());
        sql
    }

    // ----------------------------------------------------------------------
    // Terminals
    // ----------------------------------------------------------------------

    /// A random row no earlier chain of this run has received; its id is
    /// recorded so no later chain receives it either.
    ///
    /// The registry stays locked from exclusion to registration.
    pub fn get_random_entity(&self) -> DbResult<Row> {
        let main = self.state.main_table().to_string();
        let mut used = self.used.lock();

        let mut state = self.state.clone();
        exclude_used(&mut state, used.ids(&main));
        let sql = state.accelerated_random(&state.select_from_where());

        let row = self.fetch_required(&sql)?;
        // A NULL id would turn `NOT IN (...)` into an empty result.
        match row
            .get("id")
            .and_then(SqlValue::from_json)
            .filter(|id| *id != SqlValue::Null)
        {
            Some(id) => used.record(&main, id),
            None => tracing::warn!("Row picked from '{}' has no usable id; not marked as used", main),
        }
        Ok(row)
    }

    /// A random row, without consulting or updating the registry.
    pub fn get_row(&self) -> DbResult<Row> {
        self.fetch_required(&self.random_sql())
    }

    /// Every matching row, up to `limit`. No rows is not an error.
    pub fn get_rows(&self, limit: Limit) -> DbResult<Vec<Row>> {
        self.db.fetch_all(&self.rows_sql(limit))
    }

    /// Every matching row ordered by `order` (e.g. `"id"`, `"type DESC"`).
    /// Fails when nothing matches.
    pub fn get_sorted_list(&self, order: &str) -> DbResult<Vec<Row>> {
        let sql = self.sorted_sql(order);
        let rows = self.db.fetch_all(&sql)?;
        if rows.is_empty() {
            return Err(DbError::EmptyResult { sql });
        }
        Ok(rows)
    }

    /// Whether at least one row matches. Only "no rows" is swallowed;
    /// query errors still propagate.
    pub fn check_if_exist(&self) -> DbResult<bool> {
        Ok(self.db.fetch_one(&self.exist_sql())?.is_some())
    }

    /// Delete the matching rows of a single-table chain.
    pub fn delete(&self) -> DbResult<u64> {
        self.db.execute(&self.delete_sql())
    }

    fn fetch_required(&self, sql: &str) -> DbResult<Row> {
        self.db
            .fetch_one(sql)?
            .ok_or_else(|| DbError::EmptyResult { sql: sql.to_string() })
    }
}

fn exclude_used(state: &mut QueryState, ids: &[SqlValue]) {
    if ids.is_empty() {
        return;
    }
    let predicate = format!(
        "{}.id NOT IN ({})",
        state.main_table(),
        InValues::List(ids.to_vec()).to_sql()
    );
    state.push_predicate(&predicate);
}
