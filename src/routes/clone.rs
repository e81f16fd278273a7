//! Repository churn endpoint.
//!
//! GET /clone?url=<repository-url>
//!
//! Returns a JSON object mapping each file that still exists in the
//! repository and was modified in more than one commit to the list of those
//! commits, in history order. Results are cached on disk by URL; a hit
//! serves the stored bytes back without touching git.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::git::cache::ResultCache;
use crate::git::history::{index_history, retain_tracked};
use crate::routes::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/clone", get(churn))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CloneQuery {
    url: Option<String>,
}

async fn churn(
    State(state): State<AppState>,
    Query(query): Query<CloneQuery>,
) -> Result<impl IntoResponse> {
    let url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or(AppError::MissingUrl)?;
    let key = ResultCache::key(&url);

    if let Some(bytes) = state.cache.lookup(&key) {
        tracing::debug!("cache hit for {url}");
        return Ok(json_response(bytes));
    }

    // Serialize computation per key; whoever held the lock before us may
    // have already filled the cache.
    let _guard = state.flights.acquire(&key).await?;
    if let Some(bytes) = state.cache.lookup(&key) {
        tracing::debug!("cache hit after wait for {url}");
        return Ok(json_response(bytes));
    }

    let bytes = compute(&state, &url).await?;

    if let Err(e) = state.cache.store(&key, &bytes) {
        tracing::warn!("cache write failed for {url}: {e}");
    }

    Ok(json_response(bytes))
}

/// Clone, index, filter, serialize. The snapshot's temp directory is removed
/// when `snapshot` drops, whichever way this returns.
async fn compute(state: &AppState, url: &str) -> Result<Vec<u8>> {
    tracing::info!("cloning {url}");
    let snapshot = state.provider.acquire(url).await?;

    tracing::info!("clone done, indexing history");
    let stream = snapshot.history().await?;
    let mut index = index_history(stream).await?;

    let current_files = snapshot.current_files().await?;
    retain_tracked(&mut index, &current_files);

    Ok(serde_json::to_vec(&index)?)
}

fn json_response(bytes: Vec<u8>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], bytes)
}
