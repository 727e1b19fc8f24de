//! Closable, fault-containing access to database sessions
//!
//! A `ResourceHandle` owns one dedicated `SessionSource`. Every sampling call
//! acquires a private session copy, so concurrent collection passes only
//! contend on the open/closed bookkeeping and never on query I/O.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use sizewatch_core::{Connection, Result, SessionSource, SizewatchError};
use tokio::sync::Mutex;

/// Guarded handle to a dedicated session source
///
/// Once closed, explicitly or after a contained fault, the handle never
/// touches the source again and every call fails with
/// [`SizewatchError::ResourceClosed`].
///
/// # Example
///
/// ```ignore
/// let handle = ResourceHandle::dedicated(&shared_source).await?;
/// let count = handle
///     .run(|conn| async move { conn.query("SELECT 1", &[]).await })
///     .await?;
/// handle.close().await;
/// ```
pub struct ResourceHandle {
    source: Arc<dyn SessionSource>,
    driver_name: String,
    closed: Mutex<bool>,
}

impl ResourceHandle {
    /// Wrap a source the handle will own exclusively
    pub fn new(source: impl SessionSource + 'static) -> Self {
        Self::from_shared(Arc::new(source))
    }

    /// Wrap an already shared source
    pub fn from_shared(source: Arc<dyn SessionSource>) -> Self {
        let driver_name = source.driver_name().to_string();
        Self {
            source,
            driver_name,
            closed: Mutex::new(false),
        }
    }

    /// Create a handle over a duplicate of `original`
    ///
    /// Closing `original` afterwards does not affect the handle.
    pub async fn dedicated(original: &dyn SessionSource) -> Result<Self> {
        let source = original.duplicate().await?;
        Ok(Self::from_shared(source))
    }

    /// Driver name of the wrapped source
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Whether the handle has been closed
    pub async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }

    /// Get a private session copy
    ///
    /// The caller owns the copy and is responsible for closing it; prefer
    /// [`ResourceHandle::run`], which also contains faults.
    pub async fn acquire(&self) -> Result<Arc<dyn Connection>> {
        if self.is_closed().await {
            return Err(SizewatchError::ResourceClosed);
        }

        // The lock is not held while copying, so a close can land meanwhile
        let copied = self.source.copy_session().await;
        if self.is_closed().await {
            if let Ok(session) = copied {
                if let Err(e) = session.close().await {
                    tracing::debug!(driver = %self.driver_name, error = %e, "failed to close late session copy");
                }
            }
            return Err(SizewatchError::ResourceClosed);
        }
        copied
    }

    /// Run `op` against a fresh session copy
    ///
    /// The copy is closed on every exit path. A panic raised while acquiring
    /// or using the copy is caught here: the handle quarantines itself and
    /// the call returns `ResourceClosed`.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let session = match AssertUnwindSafe(self.acquire()).catch_unwind().await {
            Ok(session) => session?,
            Err(payload) => return Err(self.quarantine(payload).await),
        };

        let worker = Arc::clone(&session);
        let outcome = AssertUnwindSafe(async move { op(worker).await })
            .catch_unwind()
            .await;

        if let Err(e) = session.close().await {
            tracing::debug!(error = %e, "failed to close session copy");
        }

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(self.quarantine(payload).await),
        }
    }

    /// Close the handle and release the source
    ///
    /// Idempotent; the source is released exactly once.
    pub async fn close(&self) {
        let mut closed = self.closed.lock().await;
        if *closed {
            return;
        }
        *closed = true;
        if let Err(e) = self.source.close().await {
            tracing::warn!(driver = %self.driver_name, error = %e, "failed to release session source");
        }
    }

    async fn quarantine(&self, payload: Box<dyn Any + Send>) -> SizewatchError {
        let cause = panic_message(payload.as_ref());
        drop(payload);
        tracing::warn!(driver = %self.driver_name, cause = %cause, "recovered from panic, closing resource handle");
        self.close().await;
        SizewatchError::ResourceClosed
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("driver_name", &self.driver_name)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
