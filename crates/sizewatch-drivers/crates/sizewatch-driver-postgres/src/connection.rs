//! PostgreSQL connection implementation

use async_trait::async_trait;
use bytes::BytesMut;
use postgres_native_tls::MakeTlsConnector;
use sizewatch_core::{
    ColumnMeta, Connection, QueryResult, Result, Row, SizewatchError, StatementResult, Value,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_postgres::{
    Client, NoTls, Row as PgRow,
    types::{FromSql, Kind, ToSql, Type},
};

pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail() {
        if !detail.trim().is_empty() {
            message.push_str(&format!(" (detail: {})", detail));
        }
    }

    if let Some(hint) = db_error.hint() {
        if !hint.trim().is_empty() {
            message.push_str(&format!(" (hint: {})", hint));
        }
    }

    match code.code() {
        "42P01" => format!("undefined table: {}", message),
        "57014" => format!("statement canceled: {}", message),
        "42501" => format!("insufficient privilege: {}", message),
        _ => format!("{} (code: {:?})", message, code),
    }
}

/// One PostgreSQL session
///
/// Every copy handed out by [`crate::PostgresSource`] owns its own client and
/// backend process, so closing one never affects another.
pub struct PostgresConnection {
    client: Mutex<Option<Client>>,
    closed: AtomicBool,
}

impl PostgresConnection {
    /// Open a new session
    pub async fn connect(
        config: &tokio_postgres::Config,
        tls: Option<MakeTlsConnector>,
    ) -> Result<Self> {
        let client = match tls {
            Some(tls) => {
                let (client, connection) = config.connect(tls).await.map_err(|e| {
                    SizewatchError::Connection(format!(
                        "Failed to connect to PostgreSQL: {}",
                        format_postgres_error(&e)
                    ))
                })?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::error!(error = %e, "PostgreSQL connection error");
                    }
                });
                client
            }
            None => {
                let (client, connection) = config.connect(NoTls).await.map_err(|e| {
                    SizewatchError::Connection(format!(
                        "Failed to connect to PostgreSQL: {}",
                        format_postgres_error(&e)
                    ))
                })?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::error!(error = %e, "PostgreSQL connection error");
                    }
                });
                client
            }
        };

        tracing::debug!("PostgreSQL session opened");
        Ok(Self {
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
        })
    }

    fn closed_error() -> SizewatchError {
        SizewatchError::Connection("PostgreSQL session is closed".into())
    }

    async fn bind(
        client: &Client,
        sql: &str,
        params: &[Value],
    ) -> Result<(tokio_postgres::Statement, Vec<PgValue>)> {
        // Prepare first so we know the target type of each parameter
        let statement = client.prepare(sql).await.map_err(|e| {
            SizewatchError::Query(format!(
                "Failed to prepare query: {}",
                format_postgres_error(&e)
            ))
        })?;

        let param_types = statement.params();
        let pg_params: Vec<PgValue> = params
            .iter()
            .enumerate()
            .map(|(i, value)| match param_types.get(i) {
                Some(target_type) => PgValue::from_value_for_type(value, target_type),
                None => PgValue::from_value(value),
            })
            .collect();
        Ok((statement, pg_params))
    }
}

/// Wrapper enum for converting sizewatch_core::Value to types implementing ToSql.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
    TextArray(Vec<String>),
}

/// Raw UTF-8 payload of types we have no decoder for (enums, domains)
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(String::from_utf8_lossy(raw).into_owned()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

impl PgValue {
    /// Convert a value into the PgValue matching the target parameter type,
    /// so tokio-postgres writes the correct binary width
    pub(crate) fn from_value_for_type(value: &Value, target_type: &Type) -> Self {
        match value {
            Value::Int16(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),
            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(*v as f64),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                _ => PgValue::Float64(*v),
            },
            Value::Array(_) if matches!(target_type.kind(), Kind::Array(_)) => {
                PgValue::TextArray(value.as_string_array().unwrap_or_default())
            }
            _ => Self::from_value(value),
        }
    }

    fn coerce_int(value: i64, target_type: &Type) -> Self {
        match *target_type {
            Type::INT2 => PgValue::Int16(value as i16),
            Type::INT4 => PgValue::Int32(value as i32),
            _ => PgValue::Int64(value),
        }
    }

    /// Fallback used when the target type is unknown
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Array(_) => match value.as_string_array() {
                Some(items) => PgValue::TextArray(items),
                None => PgValue::String(value.to_string()),
            },
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(postgres_types::IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
            PgValue::TextArray(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

fn param_refs(params: &[PgValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(Self::closed_error)?;

        let (statement, pg_params) = Self::bind(client, sql, params).await?;
        let affected_rows = client
            .execute(&statement, &param_refs(&pg_params))
            .await
            .map_err(|e| {
                SizewatchError::Query(format!(
                    "Failed to execute statement: {}",
                    format_postgres_error(&e)
                ))
            })?;

        Ok(StatementResult { affected_rows })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();

        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(Self::closed_error)?;

        let (statement, pg_params) = Self::bind(client, sql, params).await?;
        let pg_rows = client
            .query(&statement, &param_refs(&pg_params))
            .await
            .map_err(|e| {
                SizewatchError::Query(format!(
                    "Failed to execute query: {}",
                    format_postgres_error(&e)
                ))
            })?;

        // Column metadata comes from the statement so empty results keep their columns
        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| ColumnMeta::new(col.name(), col.type_().name(), idx))
            .collect();
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let values = (0..columns.len())
                .map(|idx| postgres_to_value(pg_row, idx))
                .collect();
            rows.push(Row::new(column_names.clone(), values));
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );

        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns,
            rows,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        // dropping the client ends the connection task
        if self.client.lock().await.take().is_some() {
            tracing::debug!("closing PostgreSQL session");
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Convert PostgreSQL row value to our Value type
pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    fn get<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Option<T> {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    let type_name = row.columns()[idx].type_().name();
    let value = match type_name {
        "bool" => get::<bool>(row, idx).map(Value::Bool),
        "int2" => get::<i16>(row, idx).map(Value::Int16),
        "int4" => get::<i32>(row, idx).map(Value::Int32),
        "int8" => get::<i64>(row, idx).map(Value::Int64),
        "oid" => get::<u32>(row, idx).map(|v| Value::Int64(v as i64)),
        "float4" => get::<f32>(row, idx).map(Value::Float32),
        "float8" => get::<f64>(row, idx).map(Value::Float64),
        "text" | "varchar" | "bpchar" | "name" => get::<String>(row, idx).map(Value::String),
        "bytea" => get::<Vec<u8>>(row, idx).map(Value::Bytes),
        "uuid" => get::<uuid::Uuid>(row, idx).map(Value::Uuid),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx).map(Value::Json),
        "timestamptz" => get::<chrono::DateTime<chrono::Utc>>(row, idx).map(Value::DateTimeUtc),
        // array type names carry a leading underscore
        "_text" | "_varchar" | "_name" => {
            get::<Vec<String>>(row, idx).map(Value::string_array)
        }
        "_int8" => get::<Vec<i64>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int64).collect())),
        _ => get::<PgFallbackString>(row, idx).map(|v| Value::String(v.0)),
    };

    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integers_follow_target_width() {
        assert_eq!(
            PgValue::from_value_for_type(&Value::Int64(7), &Type::INT4),
            PgValue::Int32(7)
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::Int32(7), &Type::INT8),
            PgValue::Int64(7)
        );
        assert_eq!(
            PgValue::from_value_for_type(&Value::Float64(1.5), &Type::FLOAT4),
            PgValue::Float32(1.5)
        );
    }

    #[test]
    fn test_string_array_binds_as_text_array() {
        let names = Value::string_array(["tests", "users"]);
        assert_eq!(
            PgValue::from_value_for_type(&names, &Type::NAME_ARRAY),
            PgValue::TextArray(vec!["tests".into(), "users".into()])
        );
        assert_eq!(
            PgValue::from_value(&names),
            PgValue::TextArray(vec!["tests".into(), "users".into()])
        );
    }

    #[test]
    fn test_text_param_passes_through() {
        let name = Value::String("\"tests\"".into());
        assert_eq!(
            PgValue::from_value_for_type(&name, &Type::TEXT),
            PgValue::String("\"tests\"".into())
        );
        assert_eq!(PgValue::from_value(&Value::Null), PgValue::Null);
    }

    #[test]
    fn test_to_sql_writes_target_width() {
        let mut out = BytesMut::new();
        PgValue::Int32(20).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(out.len(), 4);

        let mut out = BytesMut::new();
        let is_null = PgValue::Null.to_sql(&Type::TEXT, &mut out).unwrap();
        assert!(matches!(is_null, postgres_types::IsNull::Yes));
    }
}
