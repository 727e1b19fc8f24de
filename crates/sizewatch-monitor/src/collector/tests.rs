//! Unit tests for the collectors and the registry

use super::*;
use crate::config::{CollectorSpec, ExactCountFailure, MonitorConfig, SamplerConfig};
use crate::handle::ResourceHandle;
use crate::metrics::{MetricNamespace, MetricSample};
use crate::testing::{MemoryDatabase, MemorySource};
use chrono::{TimeZone, Utc};
use sizewatch_core::{ConnectionConfig, SessionSource};
use std::sync::Arc;

fn values(samples: &[MetricSample], metric: &str, label: &str) -> Vec<(String, f64)> {
    samples
        .iter()
        .filter(|s| s.fq_name() == metric)
        .map(|s| (s.label(label).unwrap_or_default().to_string(), s.value))
        .collect()
}

mod collection_size_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collector(db: &Arc<MemoryDatabase>, collections: &[&str]) -> CollectionSizeCollector {
        let handle = Arc::new(ResourceHandle::new(MemorySource::mongodb(db)));
        CollectionSizeCollector::new(
            &MetricNamespace::new("test", "mongo"),
            "juju",
            handle,
            collections.iter().map(|c| c.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_describe_is_fixed() {
        let db = MemoryDatabase::new("juju");
        let collector = collector(&db, &["models"]);

        let names: Vec<_> = collector
            .describe()
            .iter()
            .map(|d| d.fq_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "test_mongo_juju_collection_size_bytes".to_string(),
                "test_mongo_juju_collection_count".to_string(),
            ]
        );
        assert_eq!(collector.describe(), collector.describe());
        assert_eq!(collector.collections(), ["models".to_string()]);
    }

    #[tokio::test]
    async fn test_repeated_collection_emits_one_series() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        db.insert("models", 1..=2);

        let collector = collector(&db, &["models", "models"]);
        assert_eq!(collector.collections(), ["models".to_string()]);

        let samples = collect_once(&collector).await;
        assert_eq!(
            values(&samples, "test_mongo_juju_collection_count", "collection"),
            vec![("models".to_string(), 2.0)]
        );
    }

    #[tokio::test]
    async fn test_size_doubles_with_second_document() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        db.insert("models", 1..=1);
        let collector = collector(&db, &["models"]);

        let samples = collect_once(&collector).await;
        assert_eq!(
            values(&samples, "test_mongo_juju_collection_count", "collection"),
            vec![("models".to_string(), 1.0)]
        );
        let size = values(&samples, "test_mongo_juju_collection_size_bytes", "collection")[0].1;
        assert!(size > 0.0);

        db.insert("models", 2..=2);
        let samples = collect_once(&collector).await;
        assert_eq!(
            values(&samples, "test_mongo_juju_collection_count", "collection"),
            vec![("models".to_string(), 2.0)]
        );
        assert_eq!(
            values(&samples, "test_mongo_juju_collection_size_bytes", "collection"),
            vec![("models".to_string(), size * 2.0)]
        );
    }

    #[tokio::test]
    async fn test_failed_name_is_omitted_others_emitted() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        db.create_table("controllers");
        db.insert("controllers", 1..=3);
        let collector = collector(&db, &["models", "missing", "controllers"]);

        let samples = collect_once(&collector).await;
        assert_eq!(
            values(&samples, "test_mongo_juju_collection_count", "collection"),
            vec![("models".to_string(), 0.0), ("controllers".to_string(), 3.0)]
        );
        assert_eq!(samples.len(), 4);
    }

    #[tokio::test]
    async fn test_closed_collector_emits_nothing() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        db.insert("models", 1..=1);
        let collector = collector(&db, &["models"]);

        collector.close().await;
        collector.close().await;

        assert!(collect_once(&collector).await.is_empty());
        assert_eq!(db.query_count(), 0);
    }

    #[tokio::test]
    async fn test_original_session_close_is_graceful() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        db.insert("models", 1..=1);
        let original = MemorySource::mongodb(&db);
        let handle = Arc::new(ResourceHandle::dedicated(&original).await.unwrap());
        let collector = CollectionSizeCollector::new(
            &MetricNamespace::new("test", "mongo"),
            "",
            handle,
            vec!["models".to_string()],
        )
        .unwrap();

        original.close().await.unwrap();

        let samples = collect_once(&collector).await;
        assert_eq!(
            values(&samples, "test_mongo_collection_count", "collection"),
            vec![("models".to_string(), 1.0)]
        );
    }

    #[tokio::test]
    async fn test_fault_disables_collector() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        let shared = Arc::new(MemorySource::mongodb(&db).panicking_after_close());
        let handle = Arc::new(ResourceHandle::from_shared(shared.clone()));
        let collector = CollectionSizeCollector::new(
            &MetricNamespace::new("test", "mongo"),
            "",
            Arc::clone(&handle),
            vec!["models".to_string()],
        )
        .unwrap();

        shared.close().await.unwrap();

        assert!(collect_once(&collector).await.is_empty());
        assert!(handle.is_closed().await);
        assert!(collect_once(&collector).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_passes_share_one_handle() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        db.insert("models", 1..=5);
        let collector = Arc::new(collector(&db, &["models"]));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let collector = Arc::clone(&collector);
            tasks.push(tokio::spawn(async move { collect_once(collector.as_ref()).await }));
        }
        for task in tasks {
            let samples = task.await.unwrap();
            assert_eq!(
                values(&samples, "test_mongo_juju_collection_count", "collection"),
                vec![("models".to_string(), 5.0)]
            );
        }
    }
}

mod table_size_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn collector(db: &Arc<MemoryDatabase>, config: SamplerConfig) -> TableSizeCollector {
        let handle = Arc::new(ResourceHandle::new(MemorySource::postgres(db)));
        TableSizeCollector::new("test", handle, config).await.unwrap()
    }

    #[tokio::test]
    async fn test_row_count_follows_inserts_and_deletes() {
        let db = MemoryDatabase::new("jimm");
        db.create_table("tests");
        db.insert("tests", 1..=20);
        let collector = collector(&db, SamplerConfig::new().with_targets(["tests"])).await;
        let metric = "test_database_jimm_table_row_count";

        let samples = collect_once(&collector).await;
        assert_eq!(values(&samples, metric, "table"), vec![("tests".to_string(), 20.0)]);

        db.insert("tests", 1..=15);
        let samples = collect_once(&collector).await;
        assert_eq!(values(&samples, metric, "table"), vec![("tests".to_string(), 35.0)]);

        db.delete_where("tests", |n| n % 3 == 0);
        let samples = collect_once(&collector).await;
        assert_eq!(values(&samples, metric, "table"), vec![("tests".to_string(), 24.0)]);
    }

    #[tokio::test]
    async fn test_descriptor_uses_sanitised_database_name() {
        let db = MemoryDatabase::new("juju-prod");
        let collector = collector(&db, SamplerConfig::new()).await;

        assert_eq!(collector.database(), "juju-prod");
        let desc = &collector.describe()[0];
        assert_eq!(desc.fq_name(), "test_database_juju_prod_table_row_count");
        assert_eq!(desc.label_names(), ["table".to_string()]);
    }

    #[tokio::test]
    async fn test_estimate_above_cutoff_is_emitted() {
        let db = MemoryDatabase::new("jimm");
        db.create_table("events");
        db.insert("events", 1..=10);
        db.set_estimate("events", 75_000.0);
        let collector = collector(&db, SamplerConfig::new()).await;

        let samples = collect_once(&collector).await;
        assert_eq!(
            values(&samples, "test_database_jimm_table_row_count", "table"),
            vec![("events".to_string(), 75_000.0)]
        );
    }

    #[tokio::test]
    async fn test_zero_tables_emits_nothing() {
        let db = MemoryDatabase::new("jimm");
        let collector = collector(&db, SamplerConfig::new()).await;

        assert!(collect_once(&collector).await.is_empty());
    }

    #[tokio::test]
    async fn test_abort_policy_keeps_values_before_failure() {
        let db = MemoryDatabase::new("jimm");
        for name in ["a", "b", "c"] {
            db.create_table(name);
            db.insert(name, 1..=2);
        }
        db.fail_counts("b");

        let skip = collector(&db, SamplerConfig::new()).await;
        let abort = collector(
            &db,
            SamplerConfig::new().with_exact_count_failure(ExactCountFailure::AbortPass),
        )
        .await;
        let metric = "test_database_jimm_table_row_count";

        assert_eq!(
            values(&collect_once(&skip).await, metric, "table"),
            vec![("a".to_string(), 2.0), ("c".to_string(), 2.0)]
        );
        assert_eq!(
            values(&collect_once(&abort).await, metric, "table"),
            vec![("a".to_string(), 2.0)]
        );
    }

    #[tokio::test]
    async fn test_closed_collector_emits_nothing() {
        let db = MemoryDatabase::new("jimm");
        db.create_table("tests");
        let collector = collector(&db, SamplerConfig::new()).await;

        collector.close().await;
        assert!(collect_once(&collector).await.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_engines_without_estimates() {
        let db = MemoryDatabase::new("juju");
        let handle = Arc::new(ResourceHandle::new(MemorySource::mongodb(&db)));

        let err = TableSizeCollector::new("test", handle, SamplerConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, sizewatch_core::SizewatchError::NotSupported(_)));
    }
}

mod database_size_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_fan_out_labels_database_and_collection() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        db.create_table("controllers");
        db.insert("models", 1..=2);
        db.insert("controllers", 1..=1);
        let handle = Arc::new(ResourceHandle::new(MemorySource::mongodb(&db)));
        let collector = DatabaseSizeCollector::new(&MetricNamespace::new("test", "all"), handle)
            .await
            .unwrap();

        let samples = collect_once(&collector).await;
        let counts: Vec<_> = samples
            .iter()
            .filter(|s| s.fq_name() == "test_all_collection_count")
            .map(|s| (s.label("database"), s.label("collection"), s.value))
            .collect();
        assert_eq!(
            counts,
            vec![
                (Some("juju"), Some("controllers"), 1.0),
                (Some("juju"), Some("models"), 2.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_discovers_new_collections_each_pass() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        let handle = Arc::new(ResourceHandle::new(MemorySource::mongodb(&db)));
        let collector = DatabaseSizeCollector::new(&MetricNamespace::new("test", ""), handle)
            .await
            .unwrap();

        assert_eq!(collect_once(&collector).await.len(), 2);

        db.create_table("clouds");
        assert_eq!(collect_once(&collector).await.len(), 4);

        db.drop_table("models");
        db.drop_table("clouds");
        assert!(collect_once(&collector).await.is_empty());
    }

    #[tokio::test]
    async fn test_closed_collector_emits_nothing() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        let handle = Arc::new(ResourceHandle::new(MemorySource::postgres(&db)));
        let collector = DatabaseSizeCollector::new(&MetricNamespace::new("test", ""), handle)
            .await
            .unwrap();

        collector.close().await;
        assert!(collect_once(&collector).await.is_empty());
    }
}

mod uptime_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_reports_start_time() {
        let now = Utc.with_ymd_and_hms(2017, 3, 1, 12, 0, 0).unwrap();
        let collector = UptimeCollector::new(&MetricNamespace::new("test", "test"), "test", || now).unwrap();

        let samples = collect_once(&collector).await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].fq_name(), "test_test_test_uptime");
        assert_eq!(samples[0].value, now.timestamp() as f64);
        assert_eq!(samples[0].descriptor.kind(), crate::metrics::MetricKind::Counter);

        // the clock is read once
        assert_eq!(collect_once(&collector).await, samples);
        assert_eq!(collector.started_at(), now);
    }
}

mod registry_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn uptime(subsystem: &str) -> UptimeCollector {
        UptimeCollector::new(&MetricNamespace::new("test", subsystem), "jimm", Utc::now).unwrap()
    }

    #[test]
    fn test_rejects_duplicate_metric_names() {
        let mut registry = CollectorRegistry::new();
        registry.register(uptime("a")).unwrap();
        registry.register(uptime("b")).unwrap();

        let err = registry.register(uptime("a")).unwrap_err();
        assert!(err.to_string().contains("test_a_jimm_uptime"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.describe().len(), 2);
    }

    #[tokio::test]
    async fn test_gather_runs_every_collector() {
        let db = MemoryDatabase::new("jimm");
        db.create_table("tests");
        db.insert("tests", 1..=20);
        let handle = Arc::new(ResourceHandle::new(MemorySource::postgres(&db)));

        let mut registry = CollectorRegistry::new();
        assert!(registry.is_empty());
        registry
            .register(TableSizeCollector::new("test", Arc::clone(&handle), SamplerConfig::new()).await.unwrap())
            .unwrap();
        registry.register(uptime("test")).unwrap();

        let samples = registry.gather().await;
        assert_eq!(samples.len(), 2);

        let text = registry.render_text().await.unwrap();
        assert!(text.contains("test_database_jimm_table_row_count{table=\"tests\"} 20"));
        assert!(text.contains("# TYPE test_test_jimm_uptime counter"));
    }

    #[tokio::test]
    async fn test_from_config() {
        let db = MemoryDatabase::new("jimm");
        db.create_table("tests");
        db.insert("tests", 1..=4);
        let handle = Arc::new(ResourceHandle::new(MemorySource::postgres(&db)));

        let config = MonitorConfig::new(ConnectionConfig::new("postgres"))
            .with_namespace("jimm")
            .with_subsystem("pg")
            .with_collector(CollectorSpec::TableSize {
                tables: vec!["tests".to_string()],
                cutoff_threshold: 10_000.0,
                on_exact_count_failure: ExactCountFailure::SkipTable,
            })
            .with_collector(CollectorSpec::DatabaseSize { subsystem: None })
            .with_collector(CollectorSpec::Uptime {
                subsystem: Some("proc".to_string()),
                name: "sizewatch".to_string(),
            });

        let registry = CollectorRegistry::from_config(&config, handle).await.unwrap();
        let names: Vec<_> = registry
            .describe()
            .iter()
            .map(|d| d.fq_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "jimm_database_jimm_table_row_count".to_string(),
                "jimm_pg_collection_size_bytes".to_string(),
                "jimm_pg_collection_count".to_string(),
                "jimm_proc_sizewatch_uptime".to_string(),
            ]
        );

        let samples = registry.gather().await;
        assert_eq!(
            values(&samples, "jimm_database_jimm_table_row_count", "table"),
            vec![("tests".to_string(), 4.0)]
        );
    }

    #[tokio::test]
    async fn test_from_config_rejects_conflicting_collectors() {
        let db = MemoryDatabase::new("juju");
        let handle = Arc::new(ResourceHandle::new(MemorySource::mongodb(&db)));
        let config = MonitorConfig::new(ConnectionConfig::new("mongodb"))
            .with_collector(CollectorSpec::DatabaseSize { subsystem: None })
            .with_collector(CollectorSpec::CollectionSize {
                subsystem: None,
                prefix: String::new(),
                collections: vec!["models".to_string()],
            });

        assert!(CollectorRegistry::from_config(&config, handle).await.is_err());
    }

    #[tokio::test]
    async fn test_channel_sink_receives_pass() {
        let collector = uptime("chan");
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        collector.collect(&mut tx).await;
        drop(tx);

        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.fq_name(), "test_chan_jimm_uptime");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shared_original_survives_registry_handle_close() {
        let db = MemoryDatabase::new("juju");
        db.create_table("models");
        let original = MemorySource::mongodb(&db);
        let handle = Arc::new(ResourceHandle::dedicated(&original).await.unwrap());

        let mut registry = CollectorRegistry::new();
        registry
            .register(
                CollectionSizeCollector::new(
                    &MetricNamespace::new("test", ""),
                    "",
                    Arc::clone(&handle),
                    vec!["models".to_string()],
                )
                .unwrap(),
            )
            .unwrap();

        handle.close().await;
        assert!(registry.gather().await.is_empty());
        assert!(original.copy_session().await.is_ok());
    }
}
