//! Connection and session source traits

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// A single database session
///
/// For SQL engines `sql` is a statement with positional parameters. Document
/// stores take a JSON command document instead (e.g. `{"collStats": "users"}`)
/// and ignore `params`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql", "mongodb")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data or schema
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query or administrative command that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Close the session. Calling it more than once is a no-op.
    async fn close(&self) -> Result<()>;

    /// Check if the session is closed
    fn is_closed(&self) -> bool;
}

/// Hands out independent copies of a database session
///
/// A copy must keep working when the source, or any other copy, is closed.
/// How cheap a copy is depends on the engine: a document store client can
/// share its pool, a SQL engine may open a fresh connection.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Driver name of the sessions produced by this source
    fn driver_name(&self) -> &str;

    /// Produce a private session copy
    async fn copy_session(&self) -> Result<Arc<dyn Connection>>;

    /// Produce an independent source for the same database, so a long-lived
    /// owner does not share its lifecycle with the caller's source.
    async fn duplicate(&self) -> Result<Arc<dyn SessionSource>>;

    /// Release the source. Copies already handed out are unaffected.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T: SessionSource + ?Sized> SessionSource for Arc<T> {
    fn driver_name(&self) -> &str {
        (**self).driver_name()
    }

    async fn copy_session(&self) -> Result<Arc<dyn Connection>> {
        (**self).copy_session().await
    }

    async fn duplicate(&self) -> Result<Arc<dyn SessionSource>> {
        (**self).duplicate().await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
