//! Unit tests for the resource handle

use super::*;
use crate::testing::{MemoryDatabase, MemorySource};
use sizewatch_core::{SessionSource, SizewatchError};
use std::sync::Arc;

fn tests_db() -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new("jimm");
    db.create_table("tests");
    db.insert("tests", 1..=3);
    db
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_returns_private_copies() {
        let source = Arc::new(MemorySource::postgres(&tests_db()));
        let handle = ResourceHandle::from_shared(source.clone());

        let first = handle.acquire().await.unwrap();
        let second = handle.acquire().await.unwrap();
        assert_eq!(source.copies(), 2);

        first.close().await.unwrap();
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(handle.driver_name(), "postgresql");
    }

    #[tokio::test]
    async fn test_run_releases_session_on_success_and_error() {
        let source = Arc::new(MemorySource::postgres(&tests_db()));
        let handle = ResourceHandle::from_shared(source.clone());

        let rows = handle
            .run(|conn| async move {
                let result = conn.query("SELECT COUNT(*) AS count FROM \"tests\"", &[]).await?;
                Ok(result.rows[0].get(0).and_then(|v| v.as_i64()))
            })
            .await
            .unwrap();
        assert_eq!(rows, Some(3));

        let err = handle
            .run(|conn| async move { conn.query("SELECT 1", &[]).await })
            .await
            .unwrap_err();
        assert!(matches!(err, SizewatchError::Query(_)));

        assert_eq!(source.copies(), 2);
        assert_eq!(source.sessions_closed(), 2);
        assert!(!handle.is_closed().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let source = Arc::new(MemorySource::postgres(&tests_db()));
        let handle = ResourceHandle::from_shared(source.clone());

        handle.close().await;
        handle.close().await;

        assert!(handle.is_closed().await);
        assert_eq!(source.releases(), 1);
    }

    #[tokio::test]
    async fn test_closed_handle_never_touches_source() {
        let source = Arc::new(MemorySource::postgres(&tests_db()));
        let handle = ResourceHandle::from_shared(source.clone());
        handle.close().await;

        let err = handle.acquire().await.err().unwrap();
        assert!(err.is_closed());

        let err = handle
            .run(|conn| async move { conn.query("SELECT current_database() AS name", &[]).await })
            .await
            .unwrap_err();
        assert!(err.is_closed());
        assert_eq!(source.copies(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_close_and_acquire() {
        let source = Arc::new(MemorySource::postgres(&tests_db()));
        let handle = Arc::new(ResourceHandle::from_shared(source.clone()));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move {
                if i == 8 {
                    handle.close().await;
                    None
                } else {
                    Some(handle.acquire().await)
                }
            }));
        }
        for task in tasks {
            if let Some(Err(e)) = task.await.unwrap() {
                assert!(e.is_closed());
            }
        }

        assert!(handle.is_closed().await);
        assert_eq!(source.releases(), 1);
    }
}

mod concurrency_tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    const COPY_DELAY: Duration = Duration::from_millis(300);

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_copy_in_parallel() {
        let source = Arc::new(MemorySource::postgres(&tests_db()).with_copy_delay(COPY_DELAY));
        let handle = ResourceHandle::from_shared(source.clone());

        let start = Instant::now();
        let sessions = futures::future::join_all((0..4).map(|_| handle.acquire())).await;
        assert!(start.elapsed() < COPY_DELAY * 2);
        assert_eq!(source.copies(), 4);

        for session in sessions {
            session.unwrap().close().await.unwrap();
        }
        assert_eq!(source.sessions_closed(), 4);
        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_does_not_wait_for_copy_in_flight() {
        let source = Arc::new(MemorySource::postgres(&tests_db()).with_copy_delay(COPY_DELAY));
        let handle = Arc::new(ResourceHandle::from_shared(source.clone()));

        let start = Instant::now();
        let pending = tokio::spawn({
            let handle = Arc::clone(&handle);
            async move { handle.acquire().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.close().await;
        assert!(start.elapsed() < COPY_DELAY);
        assert_eq!(source.releases(), 1);

        // The late copy is closed rather than handed out
        let err = pending.await.unwrap().err().unwrap();
        assert!(err.is_closed());
        assert_eq!(source.copies(), 1);
        assert_eq!(source.sessions_closed(), 1);
    }
}

mod isolation_tests {
    use super::*;

    #[tokio::test]
    async fn test_dedicated_handle_survives_original_close() {
        let db = tests_db();
        let original = MemorySource::postgres(&db);
        let handle = ResourceHandle::dedicated(&original).await.unwrap();

        original.close().await.unwrap();

        let result = handle
            .run(|conn| async move { conn.query("SELECT current_database() AS name", &[]).await })
            .await
            .unwrap();
        assert_eq!(result.rows[0].get(0).and_then(|v| v.as_str()), Some("jimm"));
        assert!(!handle.is_closed().await);
    }

    #[tokio::test]
    async fn test_closing_handle_leaves_original_open() {
        let original = MemorySource::postgres(&tests_db());
        let handle = ResourceHandle::dedicated(&original).await.unwrap();

        handle.close().await;

        assert!(!original.is_closed());
        assert!(original.copy_session().await.is_ok());
    }
}

mod quarantine_tests {
    use super::*;

    #[tokio::test]
    async fn test_fault_in_acquire_quarantines_handle() {
        let db = tests_db();
        let shared = Arc::new(MemorySource::postgres(&db).panicking_after_close());
        let handle = ResourceHandle::from_shared(shared.clone());

        // closed behind the handle's back
        shared.close().await.unwrap();

        let err = handle
            .run(|conn| async move { conn.query("SELECT current_database() AS name", &[]).await })
            .await
            .unwrap_err();
        assert!(err.is_closed());
        assert!(handle.is_closed().await);

        let err = handle.acquire().await.err().unwrap();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_fault_in_query_quarantines_handle_and_releases_session() {
        let db = tests_db();
        let source = Arc::new(MemorySource::postgres(&db));
        let handle = ResourceHandle::from_shared(source.clone());

        db.panic_on_query();
        let err = handle
            .run(|conn| async move { conn.query("SELECT current_database() AS name", &[]).await })
            .await
            .unwrap_err();

        assert!(err.is_closed());
        assert!(handle.is_closed().await);
        assert_eq!(source.sessions_closed(), 1);
        assert_eq!(source.releases(), 1);

        let queries = db.query_count();
        let _ = handle
            .run(|conn| async move { conn.query("SELECT current_database() AS name", &[]).await })
            .await;
        assert_eq!(db.query_count(), queries);
    }
}
