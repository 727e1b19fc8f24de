//! Unit tests for core types

use super::*;

mod value_tests {
    use super::*;

    #[test]
    fn test_as_i64_widens_integers() {
        assert_eq!(Value::Int16(7).as_i64(), Some(7));
        assert_eq!(Value::Int32(-3).as_i64(), Some(-3));
        assert_eq!(Value::Int64(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(Value::String("42".into()).as_i64(), Some(42));
    }

    #[test]
    fn test_as_i64_accepts_integral_floats_only() {
        assert_eq!(Value::Float64(2.0).as_i64(), Some(2));
        assert_eq!(Value::Float64(2.5).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn test_as_f64_widens_every_numeric_variant() {
        assert_eq!(Value::Int32(20).as_f64(), Some(20.0));
        assert_eq!(Value::Int64(35).as_f64(), Some(35.0));
        assert_eq!(Value::Float32(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Decimal("12.25".into()).as_f64(), Some(12.25));
        assert_eq!(Value::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_string_array() {
        let value = Value::string_array(["users", "orders"]);
        assert_eq!(
            value.as_string_array(),
            Some(vec!["users".to_string(), "orders".to_string()])
        );
        assert_eq!(Value::Null.as_string_array(), None);
    }
}

mod query_result_tests {
    use super::*;

    #[test]
    fn test_from_rows_by_name() {
        let result = QueryResult::from_rows(
            &["name", "estimate"],
            vec![
                vec![Value::String("tests".into()), Value::Int64(20)],
                vec![Value::String("events".into()), Value::Int64(50_000)],
            ],
        );

        assert_eq!(result.row_count(), 2);
        assert_eq!(result.columns[1].name, "estimate");
        let first = result.first().unwrap();
        assert_eq!(first.get_by_name("name").and_then(Value::as_str), Some("tests"));
        assert_eq!(first.get_by_name("estimate").and_then(Value::as_i64), Some(20));
        assert!(first.get_by_name("missing").is_none());
    }

    #[test]
    fn test_empty_result() {
        let result = QueryResult::empty();
        assert!(!result.has_rows());
        assert!(result.first().is_none());
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_get_string_prefers_params() {
        let config = ConnectionConfig::new_postgres("localhost", 5432, "metrics", "monitor")
            .with_param("database", "override")
            .with_param("connect_timeout", 5);

        assert_eq!(config.get_string("database").as_deref(), Some("override"));
        assert_eq!(config.get_string("user").as_deref(), Some("monitor"));
        assert_eq!(config.get_string("connect_timeout").as_deref(), Some("5"));
        assert_eq!(config.get_string("password"), None);
    }

    #[test]
    fn test_port_or_default() {
        let config = ConnectionConfig::new("mongodb");
        assert_eq!(config.port_or(27017), 27017);
        assert_eq!(config.get_string("host"), None);

        let config = ConnectionConfig::new_mongodb("db.internal", 27018, "juju");
        assert_eq!(config.port_or(27017), 27018);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: ConnectionConfig = toml::from_str(
            r#"
            driver = "postgres"
            host = "127.0.0.1"
            database = "jimm"

            [params]
            ssl_mode = "disable"
            "#,
        )
        .unwrap();

        assert_eq!(config.driver, "postgres");
        assert_eq!(config.port, 0);
        assert_eq!(config.database.as_deref(), Some("jimm"));
        assert_eq!(config.get_string("ssl_mode").as_deref(), Some("disable"));
    }
}

mod error_tests {
    use super::*;

    #[test]
    fn test_closed_error() {
        assert!(SizewatchError::ResourceClosed.is_closed());
        assert!(!SizewatchError::Query("boom".into()).is_closed());
        assert_eq!(SizewatchError::ResourceClosed.to_string(), "resource closed");
    }
}
