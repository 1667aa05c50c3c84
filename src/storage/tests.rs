//! Storage Module Tests
//!
//! Validates the multi-key table and its secondary indices against a real on-disk
//! environment in a temporary directory.
//!
//! ## Test Scopes
//! - **Point operations**: put/get round trips, defaults on miss, existence checks.
//! - **Pattern indices**: completeness, duplicate ordering, resolution and rejection of partial keys.
//! - **Cursors**: lazy iteration, in-place replacement and loud failure on misuse.
//! - **Lifecycle**: configuration validation, close semantics, reopening and index rebuilds.

#[cfg(test)]
mod tests {
    use crate::storage::catalog::StoreCatalog;
    use crate::storage::handlers;
    use crate::storage::pattern::project;
    use crate::storage::protocol::{EntryJson, PutRequest};
    use crate::storage::cursor::{self, Cursor};
    use crate::storage::environment::{EnvironmentConfig, EnvironmentRegistry};
    use crate::storage::store::MultiKeyStore;
    use crate::storage::types::{Aggregate, Pattern, StoreConfig, StoreError};
    use axum::Json;
    use axum::extract::{Extension, Path as UrlPath};
    use axum::http::StatusCode;
    use std::path::Path;
    use std::sync::Arc;

    const W: i64 = -1;

    fn registry() -> Arc<EnvironmentRegistry> {
        EnvironmentRegistry::new(EnvironmentConfig::default())
    }

    fn open_store(dir: &Path, name: &str, arity: usize, patterns: Vec<Vec<usize>>) -> MultiKeyStore {
        let config = StoreConfig::new(name, arity, dir).with_patterns(patterns);
        MultiKeyStore::open(&registry(), config).unwrap()
    }

    fn keys_of(entries: &[(Vec<i64>, f64)]) -> Vec<Vec<i64>> {
        entries.iter().map(|(key, _)| key.clone()).collect()
    }

    // ============================================================
    // POINT OPERATIONS
    // ============================================================

    #[test]
    fn test_scenario_three_dimensions_one_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "orders", 3, vec![vec![0, 1]]);

        store.put(&[1, 2, 3], 9.5).unwrap();

        let mut cursor = store.scan(&[1, 2, W]).unwrap().expect("partial key scan");
        let entries = cursor::drain(&mut cursor).unwrap();
        assert_eq!(entries, vec![(vec![1, 2, 3], 9.5)]);

        let err = store.scan(&[1, W, 3]).err().expect("unregistered signature");
        assert!(matches!(err, StoreError::UnknownPattern { .. }));

        assert_eq!(store.get(&[1, 2, 3]).unwrap(), 9.5);
        assert_eq!(store.get(&[9, 9, 9]).unwrap(), 0.0);
    }

    #[test]
    fn test_put_get_roundtrip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "exact", 2, vec![vec![0]]);

        let values = [0.0, -3.25, 0.1 + 0.2, 1.0e-300, 123456789.125, f64::MAX];
        for (i, value) in values.iter().enumerate() {
            store.put(&[i as i64, 7], *value).unwrap();
        }
        for (i, value) in values.iter().enumerate() {
            let stored = store.get(&[i as i64, 7]).unwrap();
            assert_eq!(stored.to_bits(), value.to_bits(), "value {} changed", value);
        }
    }

    #[test]
    fn test_get_missing_returns_configured_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new("defaults", 2, dir.path()).with_default_value(-7.5);
        let store = MultiKeyStore::open(&registry(), config).unwrap();

        assert_eq!(store.get(&[4, 4]).unwrap(), -7.5);
        assert!(!store.has_key(&[4, 4]).unwrap());

        store.put(&[4, 4], 1.0).unwrap();
        assert!(store.has_key(&[4, 4]).unwrap());
    }

    #[test]
    fn test_key_validation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "checked", 3, vec![]);

        assert!(matches!(
            store.put(&[1, 2], 1.0),
            Err(StoreError::Arity { got: 2, expected: 3, .. })
        ));
        assert!(matches!(store.get(&[1, 2, 3, 4]), Err(StoreError::Arity { .. })));
        assert!(matches!(
            store.put(&[1, W, 3], 1.0),
            Err(StoreError::WildcardInKey(_))
        ));
    }

    // ============================================================
    // PATTERN INDEX TESTS
    // ============================================================

    #[test]
    fn test_index_contains_every_key_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "complete", 3, vec![vec![0], vec![1, 2]]);

        for a in 0..4 {
            for b in 0..3 {
                store.put(&[a, b, a + b], (a * 10 + b) as f64).unwrap();
            }
        }
        // Overwrites must not duplicate index entries.
        store.put(&[2, 1, 3], 99.0).unwrap();
        store.put(&[2, 1, 3], 100.0).unwrap();

        let mut cursor = store.scan(&[2, W, W]).unwrap().unwrap();
        let entries = cursor::drain(&mut cursor).unwrap();
        assert_eq!(entries.len(), 3);
        let hits: Vec<_> = entries.iter().filter(|(key, _)| key == &vec![2, 1, 3]).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 100.0);

        let mut cursor = store.scan(&[W, 1, 3]).unwrap().unwrap();
        let entries = cursor::drain(&mut cursor).unwrap();
        assert_eq!(keys_of(&entries), vec![vec![2, 1, 3]]);
    }

    #[test]
    fn test_duplicates_enumerate_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "ordered", 3, vec![vec![0]]);

        store.put(&[1, 9, 0], 1.0).unwrap();
        store.put(&[1, 3, 0], 2.0).unwrap();
        store.put(&[2, 0, 0], 3.0).unwrap();
        store.put(&[1, 5, 0], 4.0).unwrap();
        store.put(&[1, 3, 0], 5.0).unwrap();

        let mut cursor = store.scan(&[1, W, W]).unwrap().unwrap();
        let entries = cursor::drain(&mut cursor).unwrap();
        assert_eq!(
            entries,
            vec![(vec![1, 9, 0], 1.0), (vec![1, 3, 0], 5.0), (vec![1, 5, 0], 4.0)]
        );
    }

    #[test]
    fn test_scan_without_matches_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "sparse", 2, vec![vec![1]]);
        store.put(&[1, 1], 1.0).unwrap();

        let mut cursor = store.scan(&[W, 12]).unwrap().unwrap();
        assert!(!cursor.advance().unwrap());
        cursor.close().unwrap();
    }

    #[test]
    fn test_unknown_pattern_names_requested_and_registered() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "strict", 3, vec![vec![0, 1], vec![2]]);
        store.put(&[1, 2, 3], 1.0).unwrap();

        match store.scan(&[1, W, 3]) {
            Err(StoreError::UnknownPattern { requested, registered }) => {
                assert_eq!(requested, vec![0, 2]);
                assert_eq!(registered, vec![vec![0, 1], vec![2]]);
            }
            other => panic!("expected unknown pattern, got {:?}", other.map(|c| c.is_some())),
        }

        let message = store.scan(&[1, W, 3]).err().unwrap().to_string();
        assert!(message.contains("[0,2]"), "{}", message);
        assert!(message.contains("[0,1]; [2]"), "{}", message);

        // All wildcards never degrade into a full scan.
        assert!(matches!(
            store.scan(&[W, W, W]),
            Err(StoreError::UnknownPattern { .. })
        ));
    }

    #[test]
    fn test_fully_specified_scan_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "point", 2, vec![vec![0]]);
        store.put(&[1, 2], 3.0).unwrap();

        assert!(store.scan(&[1, 2]).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_patterns_share_one_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "dedup", 3, vec![vec![0, 1], vec![0, 1], vec![2]]);

        assert_eq!(store.patterns().len(), 2);
        assert_eq!(store.signatures(), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_empty_and_full_length_patterns_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "ignored", 2, vec![vec![], vec![0, 1], vec![1]]);

        assert_eq!(store.signatures(), vec![vec![1]]);
    }

    #[test]
    fn test_unordered_pattern_projects_in_pattern_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "reversed", 3, vec![vec![2, 0]]);

        store.put(&[5, 1, 7], 1.5).unwrap();
        store.put(&[7, 1, 5], 2.5).unwrap();

        let mut cursor = store.scan(&[5, W, 7]).unwrap().unwrap();
        let entries = cursor::drain(&mut cursor).unwrap();
        assert_eq!(entries, vec![(vec![5, 1, 7], 1.5)]);
    }

    // ============================================================
    // CURSOR TESTS
    // ============================================================

    #[test]
    fn test_full_scan_visits_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "full", 2, vec![vec![0]]);

        for i in 0..25 {
            store.put(&[i, i * 2], i as f64).unwrap();
        }

        let mut cursor = store.full_scan().unwrap();
        let mut entries = cursor::drain(&mut cursor).unwrap();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(entries.len(), 25);
        assert_eq!(entries[10], (vec![10, 20], 10.0));
    }

    #[test]
    fn test_pattern_cursor_replace_updates_primary() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "replace", 2, vec![vec![0]]);
        store.put(&[1, 1], 1.0).unwrap();
        store.put(&[1, 2], 2.0).unwrap();

        let mut cursor = store.scan(&[1, W]).unwrap().unwrap();
        while cursor.advance().unwrap() {
            let doubled = cursor.value().unwrap() * 2.0;
            cursor.replace(doubled).unwrap();
            assert_eq!(cursor.value().unwrap(), doubled);
        }
        cursor.close().unwrap();

        assert_eq!(store.get(&[1, 1]).unwrap(), 2.0);
        assert_eq!(store.get(&[1, 2]).unwrap(), 4.0);
    }

    #[test]
    fn test_cursor_misuse_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "misuse", 2, vec![vec![0]]);
        store.put(&[1, 1], 1.0).unwrap();

        let mut cursor = store.scan(&[1, W]).unwrap().unwrap();
        assert!(matches!(cursor.key(), Err(StoreError::InvalidState(_))));
        assert!(matches!(cursor.replace(3.0), Err(StoreError::InvalidState(_))));

        assert!(cursor.advance().unwrap());
        assert!(!cursor.advance().unwrap());
        assert!(matches!(cursor.advance(), Err(StoreError::InvalidState(_))));
        assert!(matches!(cursor.value(), Err(StoreError::InvalidState(_))));

        cursor.close().unwrap();
        assert!(matches!(cursor.close(), Err(StoreError::InvalidState(_))));

        let mut full = store.full_scan().unwrap();
        full.close().unwrap();
        assert!(matches!(full.advance(), Err(StoreError::InvalidState(_))));
    }

    // ============================================================
    // AGGREGATION & DUMP
    // ============================================================

    #[test]
    fn test_aggregate_over_partial_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new("agg", 2, dir.path())
            .with_patterns(vec![vec![0]])
            .with_default_value(0.5);
        let store = MultiKeyStore::open(&registry(), config).unwrap();
        store.put(&[1, 1], 2.0).unwrap();
        store.put(&[1, 2], -4.0).unwrap();
        store.put(&[1, 3], 8.0).unwrap();
        store.put(&[2, 1], 100.0).unwrap();

        assert_eq!(store.aggregate(&[1, W], Aggregate::Sum).unwrap(), 6.0);
        assert_eq!(store.aggregate(&[1, W], Aggregate::Count).unwrap(), 3.0);
        assert_eq!(store.aggregate(&[1, W], Aggregate::Min).unwrap(), -4.0);
        assert_eq!(store.aggregate(&[1, W], Aggregate::Max).unwrap(), 8.0);
        assert_eq!(store.aggregate(&[3, W], Aggregate::Max).unwrap(), 0.5);
        assert_eq!(store.aggregate(&[2, 1], Aggregate::Sum).unwrap(), 100.0);
    }

    #[test]
    fn test_dump_lists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "dumped", 2, vec![]);
        store.put(&[3, 4], 1.5).unwrap();

        assert_eq!(store.dump().unwrap(), "dumped[3,4] = 1.5");
    }

    // ============================================================
    // LIFECYCLE TESTS
    // ============================================================

    #[test]
    fn test_invalid_configurations_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();

        let zero = StoreConfig::new("zero", 0, dir.path());
        assert!(matches!(MultiKeyStore::open(&registry, zero), Err(StoreError::Config(_))));

        let out_of_range = StoreConfig::new("range", 2, dir.path()).with_patterns(vec![vec![5]]);
        assert!(matches!(
            MultiKeyStore::open(&registry, out_of_range),
            Err(StoreError::Config(_))
        ));

        let repeated = StoreConfig::new("repeat", 3, dir.path()).with_patterns(vec![vec![1, 1]]);
        assert!(matches!(
            MultiKeyStore::open(&registry, repeated),
            Err(StoreError::Config(_))
        ));

        let bad_name = StoreConfig::new("no/slashes", 2, dir.path());
        assert!(matches!(
            MultiKeyStore::open(&registry, bad_name),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path(), "closing", 2, vec![vec![0]]);
        store.put(&[1, 1], 1.0).unwrap();

        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.close(), Err(StoreError::Closed(_))));
        assert!(matches!(store.get(&[1, 1]), Err(StoreError::Closed(_))));
        assert!(matches!(store.put(&[1, 1], 2.0), Err(StoreError::Closed(_))));
        assert!(matches!(store.scan(&[1, W]), Err(StoreError::Closed(_))));
    }

    #[test]
    fn test_reopen_keeps_data_and_rebuilds_new_patterns() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path(), "durable", 3, vec![vec![0]]);
            store.put(&[1, 2, 3], 4.0).unwrap();
            store.put(&[1, 5, 6], 7.0).unwrap();
            store.put(&[2, 5, 9], 1.0).unwrap();
            store.close().unwrap();
        }

        let store = open_store(dir.path(), "durable", 3, vec![vec![0], vec![1]]);
        assert_eq!(store.get(&[1, 5, 6]).unwrap(), 7.0);

        let mut by_first = store.scan(&[1, W, W]).unwrap().unwrap();
        assert_eq!(cursor::drain(&mut by_first).unwrap().len(), 2);

        let mut by_second = store.scan(&[W, 5, W]).unwrap().unwrap();
        let mut keys = keys_of(&cursor::drain(&mut by_second).unwrap());
        keys.sort();
        assert_eq!(keys, vec![vec![1, 5, 6], vec![2, 5, 9]]);

        // New keys keep indexing after the rebuild.
        store.put(&[3, 5, 0], 2.0).unwrap();
        let mut by_second = store.scan(&[W, 5, W]).unwrap().unwrap();
        assert_eq!(cursor::drain(&mut by_second).unwrap().len(), 3);
    }

    #[test]
    fn test_rebuilt_index_orders_existing_duplicates_by_key() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path(), "late", 2, vec![]);
            store.put(&[2, 0], 1.0).unwrap();
            store.put(&[1, 0], 2.0).unwrap();
            store.close().unwrap();
        }

        let store = open_store(dir.path(), "late", 2, vec![vec![1]]);
        store.put(&[0, 0], 3.0).unwrap();

        let mut cursor = store.scan(&[W, 0]).unwrap().unwrap();
        let entries = cursor::drain(&mut cursor).unwrap();
        assert_eq!(keys_of(&entries), vec![vec![1, 0], vec![2, 0], vec![0, 0]]);
    }

    #[test]
    fn test_stores_share_the_default_environment() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();

        let a = MultiKeyStore::open(&registry, StoreConfig::new("a", 2, dir.path())).unwrap();
        let b = MultiKeyStore::open(&registry, StoreConfig::new("b", 2, dir.path())).unwrap();
        assert_eq!(registry.open_environments(), 1);

        a.put(&[1, 1], 1.0).unwrap();
        assert_eq!(b.get(&[1, 1]).unwrap(), 0.0, "stores are namespaced by name");

        let private = StoreConfig::new("c", 2, dir.path()).with_env_path("private");
        let _c = MultiKeyStore::open(&registry, private).unwrap();
        assert_eq!(registry.open_environments(), 2);
    }

    #[test]
    fn test_catalog_opens_each_map_once() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StoreCatalog::new(registry());

        catalog
            .open(StoreConfig::new("left", 2, dir.path()).with_patterns(vec![vec![0]]))
            .unwrap();
        catalog.open(StoreConfig::new("right", 3, dir.path())).unwrap();
        assert!(matches!(
            catalog.open(StoreConfig::new("left", 2, dir.path())),
            Err(StoreError::Config(_))
        ));
        assert_eq!(catalog.names(), vec!["left".to_string(), "right".to_string()]);

        catalog.close_all().unwrap();
        assert!(catalog.get("left").unwrap().is_closed());
    }

    // ============================================================
    // CUSTOM PROJECTORS
    // ============================================================

    /// Files keys under the absolute values of their pattern dimensions.
    fn absolute(pattern: &Pattern, key: &[i64]) -> Vec<i64> {
        project(pattern, key).into_iter().map(i64::abs).collect()
    }

    #[test]
    fn test_custom_projector_derives_secondary_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new("folded", 2, dir.path())
            .with_patterns(vec![vec![0]])
            .with_wildcard(i64::MIN);
        let store = MultiKeyStore::open_with_projector(&registry(), config, absolute).unwrap();

        store.put(&[3, 1], 1.0).unwrap();
        store.put(&[-3, 2], 2.0).unwrap();
        store.put(&[4, 3], 3.0).unwrap();

        let mut cursor = store.scan(&[-3, i64::MIN]).unwrap().unwrap();
        let entries = cursor::drain(&mut cursor).unwrap();
        assert_eq!(entries, vec![(vec![3, 1], 1.0), (vec![-3, 2], 2.0)]);
    }

    // ============================================================
    // HTTP HANDLERS
    // ============================================================

    #[tokio::test]
    async fn test_http_handlers_serve_store_operations() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StoreCatalog::new(registry());
        catalog
            .open(StoreConfig::new("web", 2, dir.path()).with_patterns(vec![vec![0]]))
            .unwrap();

        let (status, Json(put)) = handlers::handle_put(
            Extension(catalog.clone()),
            Json(PutRequest {
                map: "web".to_string(),
                key: "1,2".to_string(),
                value: 3.5,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(put.success);

        let (status, Json(got)) = handlers::handle_get(
            Extension(catalog.clone()),
            UrlPath(("web".to_string(), "1,2".to_string())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(got.found);
        assert_eq!(got.value, Some(3.5));

        let (status, Json(scanned)) = handlers::handle_scan(
            Extension(catalog.clone()),
            UrlPath(("web".to_string(), "1,*".to_string())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(scanned.entries, vec![EntryJson { key: vec![1, 2], value: 3.5 }]);

        let (status, Json(rejected)) = handlers::handle_scan(
            Extension(catalog.clone()),
            UrlPath(("web".to_string(), "*,2".to_string())),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(rejected.error.unwrap().contains("doesn't exist"));

        let (status, Json(dumped)) =
            handlers::handle_dump(Extension(catalog.clone()), UrlPath("web".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dumped.entries.len(), 1);

        let (status, _) = handlers::handle_get(
            Extension(catalog.clone()),
            UrlPath(("missing".to_string(), "1,2".to_string())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
