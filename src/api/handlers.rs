//! API Handlers
//!
//! HTTP request handlers for the admin endpoints.

use axum::{extract::State, Json};

use crate::cache::Storage;
use crate::models::{HealthResponse, StatsResponse};

/// Application state shared across all handlers.
///
/// Holds a clone of the same [`Storage`] handle the cache transports use.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
}

impl AppState {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.storage.stats().into())
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_handler() {
        let state = AppState::new(Storage::new(100));

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.capacity, 100);
    }

    #[tokio::test]
    async fn test_stats_reflect_cache_activity() {
        let storage = Storage::new(100);
        storage.put(b"k", b"value");
        storage.get(b"k");
        storage.get(b"missing");

        let response = stats_handler(State(AppState::new(storage))).await;
        assert_eq!(response.hits, 1);
        assert_eq!(response.misses, 1);
        assert_eq!(response.total_entries, 1);
        assert_eq!(response.bytes, 6);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
