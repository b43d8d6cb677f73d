//! Black-box tests over the HTTP surface (spec section 6), grounded in the
//! router's own handler wiring: exercised through `tower::ServiceExt::oneshot`
//! against the real `axum::Router` rather than calling handlers directly, so
//! auth extraction, status mapping and routing are all covered together.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use vire::config::{Config, JobManagerConfig, StorageConfig, VendorConfig};
use vire::freshness::FreshnessConfig;
use vire::router::{build_router, AppState};
use vire::store::Store;
use vire::vendor::{FakeSummarizer, FakeVendor};

fn test_config(market_db: &str, portfolio_db: Option<&str>) -> Config {
    Config {
        market_storage: StorageConfig { namespace: "market".to_string(), database_path: market_db.to_string() },
        portfolio_storage: portfolio_db.map(|p| StorageConfig {
            namespace: "portfolio".to_string(),
            database_path: p.to_string(),
        }),
        market_vendor: VendorConfig { base_url: "https://example.com".to_string(), api_key: "k".to_string(), rate_limit_per_minute: 120 },
        summarizer: VendorConfig { base_url: "https://example.com".to_string(), api_key: "k".to_string(), rate_limit_per_minute: 20 },
        service_registration_key: Some("shared-secret".to_string()),
        job_manager: JobManagerConfig::default(),
        http_bind_addr: "127.0.0.1:0".to_string(),
        file_storage_dir: "data/files".to_string(),
    }
}

async fn build_test_app(market_db: &str, portfolio_db: Option<&str>) -> axum::Router {
    let config = test_config(market_db, portfolio_db);
    let store = Arc::new(Store::connect(&config.market_storage, config.portfolio_storage.as_ref()).await.unwrap());
    let freshness = Arc::new(FreshnessConfig::default());
    let vendor = Arc::new(
        FakeVendor::default().with_eod(
            "AAPL",
            vec![vire::models::EodBar {
                date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: None,
            }],
        ),
    );
    let summarizer = Arc::new(FakeSummarizer);
    let state = AppState::new(store, freshness, vendor, summarizer, &config);
    build_router(state)
}

#[tokio::test]
async fn health_check_is_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(&dir.path().join("market.db").to_string_lossy(), None).await;

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_ticker_is_collected_and_enqueues_slow_slices() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(&dir.path().join("market.db").to_string_lossy(), None).await;

    let response = app
        .oneshot(Request::builder().uri("/api/market/stocks/aapl").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ticker"], "AAPL");
    assert!(body["market_data"]["eod_bars"].as_array().unwrap().len() >= 1);
    assert!(!body["advisories"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn portfolio_access_without_a_user_context_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(&dir.path().join("market.db").to_string_lossy(), None).await;

    let response = app
        .oneshot(Request::builder().uri("/api/portfolios/main").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn feedback_submission_always_returns_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(&dir.path().join("market.db").to_string_lossy(), None).await;

    let payload = serde_json::json!({
        "session_id": "s-1",
        "client_type": "claude-cli",
        "category": "data_anomaly",
        "severity": "low",
        "description": "EOD bar looked stale",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/feedback")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn service_registration_rejects_the_wrong_key() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(&dir.path().join("market.db").to_string_lossy(), None).await;

    let payload = serde_json::json!({"service_id": "ingestor", "key": "wrong"});
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/services/register")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn mcp_without_credentials_returns_the_discovery_challenge() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_test_app(&dir.path().join("market.db").to_string_lossy(), None).await;

    let response = app
        .oneshot(Request::builder().method("POST").uri("/mcp").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("www-authenticate").is_some());
}
