use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::catalog::StoreCatalog;
use super::codec;
use super::cursor::{self, Cursor};
use super::protocol::{
    EntryJson, GetResponse, MapStats, PutRequest, PutResponse, ScanResponse, StatsResponse,
};
use super::store::MultiKeyStore;
use super::types::StoreError;

fn lookup_map(catalog: &StoreCatalog, name: &str) -> Result<Arc<MultiKeyStore>, String> {
    catalog
        .get(name)
        .ok_or_else(|| format!("unknown map: {}", name))
}

fn status_for(error: &StoreError) -> StatusCode {
    match error {
        StoreError::Arity { .. }
        | StoreError::WildcardInKey(_)
        | StoreError::UnknownPattern { .. }
        | StoreError::Config(_) => StatusCode::BAD_REQUEST,
        StoreError::Closed(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn handle_put(
    Extension(catalog): Extension<Arc<StoreCatalog>>,
    Json(req): Json<PutRequest>,
) -> (StatusCode, Json<PutResponse>) {
    let failed = |status: StatusCode, error: String| {
        (
            status,
            Json(PutResponse {
                success: false,
                error: Some(error),
            }),
        )
    };

    let store = match lookup_map(&catalog, &req.map) {
        Ok(store) => store,
        Err(e) => return failed(StatusCode::NOT_FOUND, e),
    };

    let key = match codec::parse_key(&req.key) {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("Failed to parse key {:?}: {}", req.key, e);
            return failed(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let value = req.value;
    match blocking(move || store.put(&key, value)).await {
        Ok(()) => (
            StatusCode::OK,
            Json(PutResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to put into {}: {}", req.map, e);
            failed(status_for(&e), e.to_string())
        }
    }
}

pub async fn handle_get(
    Extension(catalog): Extension<Arc<StoreCatalog>>,
    Path((map, key_text)): Path<(String, String)>,
) -> (StatusCode, Json<GetResponse>) {
    let failed = |status: StatusCode, error: String| {
        (
            status,
            Json(GetResponse {
                value: None,
                found: false,
                error: Some(error),
            }),
        )
    };

    let store = match lookup_map(&catalog, &map) {
        Ok(store) => store,
        Err(e) => return failed(StatusCode::NOT_FOUND, e),
    };
    let key = match codec::parse_key(&key_text) {
        Ok(key) => key,
        Err(e) => return failed(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let lookup = blocking(move || {
        store
            .has_key(&key)
            .and_then(|found| store.get(&key).map(|value| (found, value)))
    })
    .await;
    match lookup {
        Ok((found, value)) => (
            StatusCode::OK,
            Json(GetResponse {
                value: Some(value),
                found,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to get {}[{}]: {}", map, key_text, e);
            failed(status_for(&e), e.to_string())
        }
    }
}

pub async fn handle_scan(
    Extension(catalog): Extension<Arc<StoreCatalog>>,
    Path((map, partial_text)): Path<(String, String)>,
) -> (StatusCode, Json<ScanResponse>) {
    let store = match lookup_map(&catalog, &map) {
        Ok(store) => store,
        Err(e) => return scan_failed(StatusCode::NOT_FOUND, e),
    };
    let partial = match codec::parse_partial_key(&partial_text, store.wildcard()) {
        Ok(partial) => partial,
        Err(e) => return scan_failed(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let entries = blocking(move || match store.scan(&partial) {
        Ok(Some(mut cursor)) => cursor::drain(&mut cursor),
        // Fully specified: answer with the point entry, if stored.
        Ok(None) => store.has_key(&partial).and_then(|found| {
            if found {
                store.get(&partial).map(|value| vec![(partial.clone(), value)])
            } else {
                Ok(Vec::new())
            }
        }),
        Err(e) => Err(e),
    })
    .await;

    match entries {
        Ok(entries) => scan_ok(entries),
        Err(e) => {
            tracing::warn!("Scan {}[{}] failed: {}", map, partial_text, e);
            scan_failed(status_for(&e), e.to_string())
        }
    }
}

pub async fn handle_dump(
    Extension(catalog): Extension<Arc<StoreCatalog>>,
    Path(map): Path<String>,
) -> (StatusCode, Json<ScanResponse>) {
    let store = match lookup_map(&catalog, &map) {
        Ok(store) => store,
        Err(e) => return scan_failed(StatusCode::NOT_FOUND, e),
    };

    let entries = blocking(move || {
        store
            .full_scan()
            .and_then(|mut cursor| drain_full(&mut cursor))
    })
    .await;
    match entries {
        Ok(entries) => scan_ok(entries),
        Err(e) => {
            tracing::error!("Dump of {} failed: {}", map, e);
            scan_failed(status_for(&e), e.to_string())
        }
    }
}

pub async fn handle_stats(
    Extension(catalog): Extension<Arc<StoreCatalog>>,
) -> (StatusCode, Json<StatsResponse>) {
    let maps = catalog
        .names()
        .into_iter()
        .filter_map(|name| catalog.get(&name))
        .map(|store| MapStats {
            name: store.name().to_string(),
            arity: store.arity(),
            patterns: store.patterns().into_iter().map(|p| p.0).collect(),
        })
        .collect();

    (StatusCode::OK, Json(StatsResponse { maps }))
}

/// Runs store I/O on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|e| Err(StoreError::Task(e.to_string())))
}

fn drain_full(cursor: &mut dyn Cursor) -> Result<Vec<(Vec<i64>, f64)>, StoreError> {
    cursor::drain(cursor)
}

fn scan_ok(entries: Vec<(Vec<i64>, f64)>) -> (StatusCode, Json<ScanResponse>) {
    let entries = entries
        .into_iter()
        .map(|(key, value)| EntryJson { key, value })
        .collect();
    (
        StatusCode::OK,
        Json(ScanResponse {
            entries,
            error: None,
        }),
    )
}

fn scan_failed(status: StatusCode, error: String) -> (StatusCode, Json<ScanResponse>) {
    (
        status,
        Json(ScanResponse {
            entries: Vec::new(),
            error: Some(error),
        }),
    )
}
