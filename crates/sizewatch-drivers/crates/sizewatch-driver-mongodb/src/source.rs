//! MongoDB session source and session copies

use async_trait::async_trait;
use bson::{Bson, Document};
use mongodb::Client;
use sizewatch_core::{
    ColumnMeta, Connection, QueryResult, Result, Row, SessionSource, SizewatchError,
    StatementResult, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use uuid::Uuid;

/// MongoDB session source
///
/// A `Client` is a handle onto a shared connection pool, so copies are
/// cheap clones with their own closed flag. The pool lives as long as any
/// copy does; closing the source only stops new copies.
pub struct MongoSource {
    client: Client,
    database: String,
    closed: AtomicBool,
}

impl MongoSource {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Database every copy is bound to
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SizewatchError::Connection(
                "MongoDB session source is closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MongoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoSource")
            .field("database", &self.database)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl SessionSource for MongoSource {
    fn driver_name(&self) -> &str {
        "mongodb"
    }

    async fn copy_session(&self) -> Result<Arc<dyn Connection>> {
        self.ensure_not_closed()?;
        Ok(Arc::new(MongoDbConnection::new(
            self.client.clone(),
            self.database.clone(),
        )))
    }

    async fn duplicate(&self) -> Result<Arc<dyn SessionSource>> {
        self.ensure_not_closed()?;
        Ok(Arc::new(MongoSource::new(
            self.client.clone(),
            self.database.clone(),
        )))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(database = %self.database, "MongoDB session source closed");
        }
        Ok(())
    }
}

/// One MongoDB session copy
pub struct MongoDbConnection {
    client: Client,
    database: String,
    closed: AtomicBool,
}

impl MongoDbConnection {
    pub fn new(client: Client, database: String) -> Self {
        Self {
            client,
            database,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the current database name
    pub fn database(&self) -> &str {
        &self.database
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SizewatchError::Connection("Connection is closed".to_string()));
        }
        Ok(())
    }

    async fn run_command(&self, command: Document) -> Result<Document> {
        let result = self
            .client
            .database(&self.database)
            .run_command(command)
            .await
            .map_err(|e| SizewatchError::Query(format!("MongoDB command failed: {}", e)))?;

        if !command_succeeded(&result) {
            let err_msg = result
                .get("errmsg")
                .and_then(|e| e.as_str())
                .unwrap_or("Unknown error");
            return Err(SizewatchError::Query(format!("MongoDB error: {}", err_msg)));
        }
        Ok(result)
    }
}

/// Parse a JSON command document, keeping key order (the command name
/// must be the first key)
pub fn parse_command(command: &str) -> Result<Document> {
    let trimmed = command.trim();
    if !trimmed.starts_with('{') {
        return Err(SizewatchError::Query(format!(
            "expected a JSON command document, got: {}",
            trimmed.chars().take(40).collect::<String>()
        )));
    }
    serde_json::from_str::<Document>(trimmed)
        .map_err(|e| SizewatchError::Query(format!("Invalid JSON document: {}", e)))
}

fn command_succeeded(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(ok)) => *ok == 1.0,
        Some(Bson::Int32(ok)) => *ok == 1,
        Some(Bson::Int64(ok)) => *ok == 1,
        Some(Bson::Boolean(ok)) => *ok,
        Some(_) => false,
        None => true,
    }
}

/// Convert a BSON value to our Value type
pub fn bson_to_value(bson: &Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined | Bson::MaxKey | Bson::MinKey => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::Int32(*i),
        Bson::Int64(i) => Value::Int64(*i),
        Bson::Double(d) => Value::Float64(*d),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s.clone()),
        Bson::Array(arr) => Value::Array(arr.iter().map(bson_to_value).collect()),
        Bson::Document(doc) => {
            Value::Json(serde_json::to_value(doc).unwrap_or(serde_json::Value::Null))
        }
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(dt.to_string()),
        Bson::Binary(bin) => Value::Bytes(bin.bytes.clone()),
        Bson::Decimal128(d) => Value::Decimal(d.to_string()),
        Bson::Timestamp(ts) => Value::Int64(ts.time as i64),
        Bson::RegularExpression(re) => Value::String(format!("/{}/{}", re.pattern, re.options)),
        Bson::JavaScriptCodeWithScope(code) => Value::String(code.code.clone()),
        Bson::DbPointer(_) => Value::String("<DbPointer>".to_string()),
    }
}

fn document_row(doc: &Document) -> Row {
    Row::new(
        doc.keys().cloned().collect(),
        doc.values().map(bson_to_value).collect(),
    )
}

/// Turn a command reply into rows
///
/// Cursor replies (`listCollections`, `aggregate`) yield one row per
/// document of `cursor.firstBatch`; anything else is a single row.
pub fn reply_to_result(reply: &Document) -> QueryResult {
    let batch = reply
        .get_document("cursor")
        .ok()
        .and_then(|cursor| cursor.get_array("firstBatch").ok());

    let rows: Vec<Row> = match batch {
        Some(batch) => batch
            .iter()
            .filter_map(Bson::as_document)
            .map(document_row)
            .collect(),
        None => vec![document_row(reply)],
    };

    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(ordinal, name)| ColumnMeta::new(name.clone(), "bson", ordinal))
                .collect()
        })
        .unwrap_or_default();

    QueryResult {
        id: Uuid::new_v4(),
        columns,
        rows,
        execution_time_ms: 0,
    }
}

#[async_trait]
impl Connection for MongoDbConnection {
    fn driver_name(&self) -> &str {
        "mongodb"
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.ensure_not_closed()?;

        let reply = self.run_command(parse_command(sql)?).await?;
        let affected_rows = reply.get("n").and_then(|n| match n {
            Bson::Int32(n) => Some(*n as u64),
            Bson::Int64(n) => Some(*n as u64),
            _ => None,
        });
        Ok(StatementResult {
            affected_rows: affected_rows.unwrap_or(0),
        })
    }

    #[tracing::instrument(skip(self, sql, _params), fields(database = %self.database))]
    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.ensure_not_closed()?;

        let start = Instant::now();
        let reply = self.run_command(parse_command(sql)?).await?;

        let mut result = reply_to_result(&reply);
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = result.row_count(),
            execution_time_ms = result.execution_time_ms,
            "command executed successfully"
        );
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
