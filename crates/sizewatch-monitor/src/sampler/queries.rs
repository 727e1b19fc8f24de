//! Per-engine statistics and catalog statements

use super::{RowCount, Sample};
use serde_json::json;
use sizewatch_core::{Connection, QueryResult, Result, Row, SizewatchError, Value};

/// Quote an identifier for PostgreSQL, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Statement text and positional parameters
///
/// For document stores the text is a JSON command document.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Command document; key order is preserved, the command name goes first
    pub fn command(document: serde_json::Value) -> Self {
        Self::new(document.to_string())
    }

    /// Builder method: append a positional parameter
    pub fn with_param(mut self, value: Value) -> Self {
        self.params.push(value);
        self
    }

    pub async fn query(&self, conn: &dyn Connection) -> Result<QueryResult> {
        conn.query(&self.text, &self.params).await
    }
}

fn first_row<'a>(result: &'a QueryResult, what: &str) -> Result<&'a Row> {
    result
        .first()
        .ok_or_else(|| SizewatchError::Query(format!("{} returned no rows", what)))
}

fn column<'a>(row: &'a Row, name: &str) -> Result<&'a Value> {
    row.get_by_name(name)
        .ok_or_else(|| SizewatchError::Query(format!("result has no column {:?}", name)))
}

fn read_i64(row: &Row, name: &str) -> Result<i64> {
    let value = column(row, name)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|v| v as i64))
        .ok_or_else(|| {
            SizewatchError::Query(format!("column {:?} is not numeric: {}", name, value))
        })
}

fn read_f64(row: &Row, name: &str) -> Result<f64> {
    let value = column(row, name)?;
    value.as_f64().ok_or_else(|| {
        SizewatchError::Query(format!("column {:?} is not numeric: {}", name, value))
    })
}

fn read_string(row: &Row, name: &str) -> Result<String> {
    let value = column(row, name)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SizewatchError::Query(format!("column {:?} is not text: {}", name, value)))
}

fn not_supported(what: &str, driver_name: &str) -> SizewatchError {
    SizewatchError::NotSupported(format!("{} not available for driver: {}", what, driver_name))
}

/// Collection/table statistics command for one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsQuery {
    Postgres,
    MongoDb,
}

impl StatsQuery {
    /// Get the statistics query for a driver
    pub fn for_driver(driver_name: &str) -> Result<Self> {
        match driver_name {
            "postgresql" | "postgres" => Ok(Self::Postgres),
            "mongodb" | "mongo" => Ok(Self::MongoDb),
            _ => Err(not_supported("Size statistics query", driver_name)),
        }
    }

    /// Statements issued to sample `name`, in order
    pub fn statements(&self, name: &str) -> Vec<Statement> {
        match self {
            StatsQuery::Postgres => vec![
                Statement::new("SELECT pg_total_relation_size(to_regclass($1)) AS size")
                    .with_param(Value::String(quote_identifier(name))),
                Statement::new(format!(
                    "SELECT COUNT(*) AS count FROM {}",
                    quote_identifier(name)
                )),
            ],
            StatsQuery::MongoDb => vec![Statement::command(json!({ "collStats": name }))],
        }
    }

    /// Sample the size and count of `name`
    pub async fn sample(&self, conn: &dyn Connection, name: &str) -> Result<Sample> {
        let statements = self.statements(name);
        match self {
            StatsQuery::Postgres => {
                let result = statements[0].query(conn).await?;
                let row = first_row(&result, "relation size query")?;
                if column(row, "size")?.is_null() {
                    return Err(SizewatchError::Query(format!(
                        "relation {} does not exist",
                        quote_identifier(name)
                    )));
                }
                let size = read_i64(row, "size")?;

                let result = statements[1].query(conn).await?;
                let count = read_i64(first_row(&result, "row count query")?, "count")?;
                Ok(Sample::new(name, Some(size), RowCount::Exact(count)))
            }
            StatsQuery::MongoDb => {
                let result = statements[0].query(conn).await?;
                let row = first_row(&result, "collStats")?;
                let size = read_i64(row, "size")?;
                let count = read_i64(row, "count")?;
                Ok(Sample::new(name, Some(size), RowCount::Exact(count)))
            }
        }
    }
}

/// Catalog lookups used by the two-phase sampler and by name discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogQuery {
    Postgres,
    MongoDb,
}

impl CatalogQuery {
    /// Get the catalog queries for a driver
    pub fn for_driver(driver_name: &str) -> Result<Self> {
        match driver_name {
            "postgresql" | "postgres" => Ok(Self::Postgres),
            "mongodb" | "mongo" => Ok(Self::MongoDb),
            _ => Err(not_supported("Catalog query", driver_name)),
        }
    }

    /// Whether the engine keeps planner row estimates
    pub fn supports_estimates(&self) -> bool {
        matches!(self, CatalogQuery::Postgres)
    }

    fn driver_name(&self) -> &'static str {
        match self {
            CatalogQuery::Postgres => "postgresql",
            CatalogQuery::MongoDb => "mongodb",
        }
    }

    /// Batched planner estimate lookup for `names`
    pub fn estimates_statement(&self, names: &[String]) -> Result<Statement> {
        match self {
            CatalogQuery::Postgres => Ok(Statement::new(
                "SELECT c.relname::text AS name, c.reltuples::float8 AS estimate \
                 FROM pg_catalog.pg_class c \
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                 WHERE c.relkind IN ('r', 'p') \
                 AND n.nspname = current_schema() \
                 AND c.relname = ANY($1)",
            )
            .with_param(Value::string_array(names.iter().cloned()))),
            CatalogQuery::MongoDb => Err(not_supported("Row count estimates", self.driver_name())),
        }
    }

    pub fn exact_count_statement(&self, name: &str) -> Statement {
        match self {
            CatalogQuery::Postgres => Statement::new(format!(
                "SELECT COUNT(*) AS count FROM {}",
                quote_identifier(name)
            )),
            CatalogQuery::MongoDb => Statement::command(json!({ "count": name })),
        }
    }

    pub fn base_tables_statement(&self) -> Statement {
        match self {
            CatalogQuery::Postgres => Statement::new(
                "SELECT table_name::text AS name FROM information_schema.tables \
                 WHERE table_schema = current_schema() \
                 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
            ),
            CatalogQuery::MongoDb => Statement::command(json!({
                "listCollections": 1,
                "nameOnly": true,
                "filter": { "type": "collection" },
            })),
        }
    }

    pub fn current_database_statement(&self) -> Statement {
        match self {
            CatalogQuery::Postgres => Statement::new("SELECT current_database()::text AS name"),
            CatalogQuery::MongoDb => Statement::command(json!({ "dbStats": 1 })),
        }
    }

    /// Planner estimates for `names`, in the order they were requested
    ///
    /// Names the catalog does not know are left out.
    pub async fn estimates(&self, conn: &dyn Connection, names: &[String]) -> Result<Vec<(String, f64)>> {
        let result = self.estimates_statement(names)?.query(conn).await?;

        let mut found = Vec::with_capacity(result.row_count());
        for row in &result.rows {
            found.push((read_string(row, "name")?, read_f64(row, "estimate")?));
        }

        Ok(names
            .iter()
            .filter_map(|name| {
                found
                    .iter()
                    .find(|(found_name, _)| found_name == name)
                    .map(|(_, estimate)| (name.clone(), *estimate))
            })
            .collect())
    }

    /// Authoritative row or document count of `name`
    pub async fn exact_count(&self, conn: &dyn Connection, name: &str) -> Result<i64> {
        let result = self.exact_count_statement(name).query(conn).await?;
        let row = first_row(&result, "exact count")?;
        match self {
            CatalogQuery::Postgres => read_i64(row, "count"),
            CatalogQuery::MongoDb => read_i64(row, "n"),
        }
    }

    /// Base tables (or plain collections) of the active schema/database
    ///
    /// Views and `system.*` collections are excluded.
    pub async fn base_tables(&self, conn: &dyn Connection) -> Result<Vec<String>> {
        let result = self.base_tables_statement().query(conn).await?;
        let mut names = Vec::with_capacity(result.row_count());
        for row in &result.rows {
            let name = read_string(row, "name")?;
            if *self == CatalogQuery::MongoDb {
                let is_view = row
                    .get_by_name("type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t != "collection");
                if is_view || name.starts_with("system.") {
                    continue;
                }
            }
            names.push(name);
        }
        Ok(names)
    }

    /// Name of the database the session is bound to
    pub async fn current_database(&self, conn: &dyn Connection) -> Result<String> {
        let result = self.current_database_statement().query(conn).await?;
        let row = first_row(&result, "current database query")?;
        match self {
            CatalogQuery::Postgres => read_string(row, "name"),
            CatalogQuery::MongoDb => read_string(row, "db"),
        }
    }
}
