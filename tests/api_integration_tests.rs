//! Integration Tests for Admin API Endpoints
//!
//! Tests the full request/response cycle for each endpoint.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mini_memcached::{api::create_router, AppState, Storage};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app(storage: &Storage) -> Router {
    create_router(AppState::new(storage.clone()))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

// == Stats Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint_empty_cache() {
    let storage = Storage::new(1024);
    let (status, json) = get_json(create_test_app(&storage), "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hits"], 0);
    assert_eq!(json["misses"], 0);
    assert_eq!(json["evictions"], 0);
    assert_eq!(json["total_entries"], 0);
    assert_eq!(json["bytes"], 0);
    assert_eq!(json["capacity"], 1024);
    assert_eq!(json["hit_rate"], 0.0);
}

#[tokio::test]
async fn test_stats_endpoint_tracks_cache_activity() {
    let storage = Storage::new(1024);
    let app = create_test_app(&storage);

    storage.put(b"stats_key", b"stats_value");
    assert_eq!(storage.get(b"stats_key"), Some(b"stats_value".to_vec()));
    assert_eq!(storage.get(b"absent"), None);

    let (status, json) = get_json(app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hits"], 1);
    assert_eq!(json["misses"], 1);
    assert_eq!(json["total_entries"], 1);
    assert_eq!(json["bytes"], 20);
    assert!((json["hit_rate"].as_f64().unwrap() - 0.5).abs() < 0.001);
}

#[tokio::test]
async fn test_stats_endpoint_counts_evictions() {
    let storage = Storage::new(10);
    let app = create_test_app(&storage);

    assert!(storage.put(b"ab", b"cd"));
    assert!(storage.put(b"ef", b"gh"));
    assert!(storage.put(b"ij", b"kl"));

    let (_, json) = get_json(app, "/stats").await;
    assert_eq!(json["evictions"], 1);
    assert_eq!(json["total_entries"], 2);
    assert_eq!(json["bytes"], 8);
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let storage = Storage::new(16);
    let (status, json) = get_json(create_test_app(&storage), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"].as_str().unwrap(), "healthy");
    assert!(json["timestamp"].as_str().is_some());
}

// == Routing ==

#[tokio::test]
async fn test_stats_rejects_post() {
    let storage = Storage::new(16);
    let response = create_test_app(&storage)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
