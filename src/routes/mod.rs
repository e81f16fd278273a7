//! API route handlers - maps HTTP endpoints to the churn pipeline.
//!
//! - `clone`: repository churn endpoint (GET /clone?url=)

pub mod clone;

use std::sync::Arc;

use axum::Router;

use crate::git::cache::ResultCache;
use crate::git::flight::KeyedLocks;
use crate::git::provider::SnapshotProvider;

/// Per-process shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ResultCache>,
    pub provider: Arc<dyn SnapshotProvider>,
    pub flights: Arc<KeyedLocks>,
}

impl AppState {
    pub fn new(cache: ResultCache, provider: impl SnapshotProvider + 'static) -> Self {
        Self {
            cache: Arc::new(cache),
            provider: Arc::new(provider),
            flights: Arc::new(KeyedLocks::default()),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new().merge(clone::routes(state))
}
