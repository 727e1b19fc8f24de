//! In-memory database and session source used by the unit tests
//!
//! `MemoryConnection` understands exactly the statements issued by
//! `StatsQuery` and `CatalogQuery`: PostgreSQL SQL text when the source is
//! built with [`MemorySource::postgres`], JSON command documents when built
//! with [`MemorySource::mongodb`].

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sizewatch_core::{
    Connection, QueryResult, Result, SessionSource, SizewatchError, StatementResult, Value,
};

#[derive(Debug, Clone)]
struct MemoryTable {
    values: Vec<i64>,
    bytes_per_row: i64,
    estimate: f64,
    view: bool,
    failing: bool,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    panic_on_query: bool,
}

/// Tables (or collections) of one database
#[derive(Debug)]
pub(crate) struct MemoryDatabase {
    name: String,
    state: Mutex<State>,
    queries: AtomicUsize,
}

impl MemoryDatabase {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(State::default()),
            queries: AtomicUsize::new(0),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create an empty table; planner statistics start out as "never analysed"
    pub fn create_table(&self, name: &str) {
        self.state().tables.insert(
            name.to_string(),
            MemoryTable {
                values: Vec::new(),
                bytes_per_row: 48,
                estimate: -1.0,
                view: false,
                failing: false,
            },
        );
    }

    pub fn create_view(&self, name: &str) {
        self.create_table(name);
        if let Some(table) = self.state().tables.get_mut(name) {
            table.view = true;
        }
    }

    pub fn drop_table(&self, name: &str) {
        self.state().tables.remove(name);
    }

    pub fn insert(&self, table: &str, values: RangeInclusive<i64>) {
        if let Some(t) = self.state().tables.get_mut(table) {
            t.values.extend(values);
        }
    }

    pub fn delete_where(&self, table: &str, predicate: impl Fn(i64) -> bool) {
        if let Some(t) = self.state().tables.get_mut(table) {
            t.values.retain(|v| !predicate(*v));
        }
    }

    /// Set the planner estimate, as `ANALYZE` would
    pub fn set_estimate(&self, table: &str, estimate: f64) {
        if let Some(t) = self.state().tables.get_mut(table) {
            t.estimate = estimate;
        }
    }

    /// Make exact counts of `table` fail
    pub fn fail_counts(&self, table: &str) {
        if let Some(t) = self.state().tables.get_mut(table) {
            t.failing = true;
        }
    }

    /// Make every following query panic, like a driver used after its
    /// socket was torn down
    pub fn panic_on_query(&self) {
        self.state().panic_on_query = true;
    }

    /// Statements executed so far, across all sessions
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    copies: AtomicUsize,
    sessions_closed: AtomicUsize,
    releases: AtomicUsize,
}

/// Session source over a [`MemoryDatabase`]
#[derive(Debug)]
pub(crate) struct MemorySource {
    driver: &'static str,
    db: Arc<MemoryDatabase>,
    closed: AtomicBool,
    counters: Arc<Counters>,
    panic_after_close: bool,
    copy_delay: Option<Duration>,
}

impl MemorySource {
    fn with_driver(driver: &'static str, db: &Arc<MemoryDatabase>) -> Self {
        Self {
            driver,
            db: Arc::clone(db),
            closed: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
            panic_after_close: false,
            copy_delay: None,
        }
    }

    pub fn postgres(db: &Arc<MemoryDatabase>) -> Self {
        Self::with_driver("postgresql", db)
    }

    pub fn mongodb(db: &Arc<MemoryDatabase>) -> Self {
        Self::with_driver("mongodb", db)
    }

    pub fn with_driver_name(mut self, driver: &'static str) -> Self {
        self.driver = driver;
        self
    }

    /// Panic instead of failing when a copy is requested after the source
    /// was closed
    pub fn panicking_after_close(mut self) -> Self {
        self.panic_after_close = true;
        self
    }

    /// Take this long to hand out each session copy
    pub fn with_copy_delay(mut self, delay: Duration) -> Self {
        self.copy_delay = Some(delay);
        self
    }

    /// Session copies handed out by this source and its duplicates
    pub fn copies(&self) -> usize {
        self.counters.copies.load(Ordering::SeqCst)
    }

    /// Session copies closed so far
    pub fn sessions_closed(&self) -> usize {
        self.counters.sessions_closed.load(Ordering::SeqCst)
    }

    /// Times this source was released
    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionSource for MemorySource {
    fn driver_name(&self) -> &str {
        self.driver
    }

    async fn copy_session(&self) -> Result<Arc<dyn Connection>> {
        if self.is_closed() {
            if self.panic_after_close {
                panic!("session already closed");
            }
            return Err(SizewatchError::Connection("session source closed".into()));
        }
        if let Some(delay) = self.copy_delay {
            tokio::time::sleep(delay).await;
        }
        self.counters.copies.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            driver: self.driver,
            db: Arc::clone(&self.db),
            closed: AtomicBool::new(false),
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn duplicate(&self) -> Result<Arc<dyn SessionSource>> {
        if self.is_closed() {
            return Err(SizewatchError::Connection("session source closed".into()));
        }
        Ok(Arc::new(MemorySource {
            driver: self.driver,
            db: Arc::clone(&self.db),
            closed: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
            panic_after_close: self.panic_after_close,
            copy_delay: self.copy_delay,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One session copy
struct MemoryConnection {
    driver: &'static str,
    db: Arc<MemoryDatabase>,
    closed: AtomicBool,
    counters: Arc<Counters>,
}

fn unquote(identifier: &str) -> String {
    let trimmed = identifier.trim();
    match trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => trimmed.to_string(),
    }
}

fn count_target(sql: &str) -> Option<String> {
    sql.strip_prefix("SELECT COUNT(*) AS count FROM ")
        .map(unquote)
}

impl MemoryConnection {
    fn query_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let state = self.db.state();

        if sql.contains("pg_class") {
            let names = params
                .first()
                .and_then(Value::as_string_array)
                .unwrap_or_default();
            // catalog order, not request order
            let rows = state
                .tables
                .iter()
                .filter(|(name, table)| !table.view && names.contains(name))
                .map(|(name, table)| vec![Value::String(name.clone()), Value::Float64(table.estimate)])
                .collect();
            return Ok(QueryResult::from_rows(&["name", "estimate"], rows));
        }

        if sql.contains("information_schema.tables") {
            let rows = state
                .tables
                .iter()
                .filter(|(_, table)| !table.view)
                .map(|(name, _)| vec![Value::String(name.clone())])
                .collect();
            return Ok(QueryResult::from_rows(&["name"], rows));
        }

        if sql.contains("current_database()") {
            return Ok(QueryResult::from_rows(
                &["name"],
                vec![vec![Value::String(self.db.name.clone())]],
            ));
        }

        if sql.contains("pg_total_relation_size") {
            let name = params.first().and_then(Value::as_str).map(unquote);
            let size = name
                .and_then(|n| state.tables.get(&n))
                .map(|t| Value::Int64(t.values.len() as i64 * t.bytes_per_row))
                .unwrap_or(Value::Null);
            return Ok(QueryResult::from_rows(&["size"], vec![vec![size]]));
        }

        if let Some(name) = count_target(sql) {
            let table = state.tables.get(&name).ok_or_else(|| {
                SizewatchError::Query(format!("relation \"{}\" does not exist", name))
            })?;
            if table.failing {
                return Err(SizewatchError::Query(
                    "canceling statement due to statement timeout".into(),
                ));
            }
            return Ok(QueryResult::from_rows(
                &["count"],
                vec![vec![Value::Int64(table.values.len() as i64)]],
            ));
        }

        Err(SizewatchError::Query(format!("unsupported statement: {}", sql)))
    }

    fn query_command(&self, command: &str) -> Result<QueryResult> {
        let command: serde_json::Value = serde_json::from_str(command)?;
        let state = self.db.state();

        if let Some(name) = command.get("collStats").and_then(|v| v.as_str()) {
            let table = state
                .tables
                .get(name)
                .ok_or_else(|| SizewatchError::Query(format!("ns not found: {}.{}", self.db.name, name)))?;
            let count = table.values.len() as i64;
            return Ok(QueryResult::from_rows(
                &["ns", "size", "count", "storageSize"],
                vec![vec![
                    Value::String(format!("{}.{}", self.db.name, name)),
                    Value::Int32((count * table.bytes_per_row) as i32),
                    Value::Int32(count as i32),
                    Value::Int32(4096),
                ]],
            ));
        }

        if command.get("listCollections").is_some() {
            let only_collections = command
                .pointer("/filter/type")
                .and_then(|v| v.as_str())
                .is_some_and(|t| t == "collection");
            let rows = state
                .tables
                .iter()
                .filter(|(_, table)| !(only_collections && table.view))
                .map(|(name, table)| {
                    let kind = if table.view { "view" } else { "collection" };
                    vec![Value::String(name.clone()), Value::String(kind.into())]
                })
                .collect();
            return Ok(QueryResult::from_rows(&["name", "type"], rows));
        }

        if command.get("dbStats").is_some() {
            return Ok(QueryResult::from_rows(
                &["db", "collections"],
                vec![vec![
                    Value::String(self.db.name.clone()),
                    Value::Int32(state.tables.len() as i32),
                ]],
            ));
        }

        if let Some(name) = command.get("count").and_then(|v| v.as_str()) {
            let count = state.tables.get(name).map_or(0, |t| t.values.len());
            return Ok(QueryResult::from_rows(
                &["n", "ok"],
                vec![vec![Value::Int32(count as i32), Value::Float64(1.0)]],
            ));
        }

        Err(SizewatchError::Query(format!("no such command: {}", command)))
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn driver_name(&self) -> &str {
        self.driver
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Err(SizewatchError::NotSupported("memory sessions are read-only".into()))
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        if self.is_closed() {
            return Err(SizewatchError::Connection("session closed".into()));
        }
        self.db.queries.fetch_add(1, Ordering::SeqCst);
        if self.db.state().panic_on_query {
            panic!("connection reset by peer");
        }

        match self.driver {
            "mongodb" => self.query_command(sql),
            _ => self.query_sql(sql, params),
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
