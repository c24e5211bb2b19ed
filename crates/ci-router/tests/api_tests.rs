//! Monitoring API Tests
//!
//! Tests for:
//! - Queue proxy and writer health checks
//! - Good-to-go status codes
//! - Stream worker state in the health report
//! - Ping, build info and metrics endpoints

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ci_common::{Message, QueuedMessage};
use ci_queue::{QueueConsumer, QueueError};
use ci_router::{create_router, AppState, HealthChecker, IngestionManager, ManagerConfig, MessageHandler};

/// Consumer that never returns messages and reports a settable health
struct IdleConsumer {
    healthy: AtomicBool,
}

#[async_trait]
impl QueueConsumer for IdleConsumer {
    fn identifier(&self) -> &str {
        "idiConcept/Concept#0"
    }

    async fn poll(&self) -> ci_queue::Result<Vec<QueuedMessage>> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(Vec::new())
        } else {
            Err(QueueError::Stopped)
        }
    }

    async fn commit(&self) -> ci_queue::Result<()> {
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn stop(&self) {}
}

struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn handle(&self, _message: &Message) {}
}

fn create_manager(healthy: bool) -> Arc<IngestionManager> {
    Arc::new(IngestionManager::new(
        vec![Arc::new(IdleConsumer {
            healthy: AtomicBool::new(healthy),
        }) as Arc<dyn QueueConsumer>],
        Arc::new(NoopHandler),
        ManagerConfig {
            poll_interval: Duration::from_millis(10),
            backoff: Duration::from_millis(10),
            autocommit_enable: true,
        },
    ))
}

async fn mount_topics(proxy: &MockServer, topics: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/topics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics))
        .mount(proxy)
        .await;
}

async fn mount_gtg(writer: &MockServer, gtg_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(gtg_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(writer)
        .await;
}

fn create_checker(proxy: &MockServer, writer: &MockServer) -> HealthChecker {
    HealthChecker::new(
        reqwest::Client::new(),
        proxy.uri(),
        "kafka",
        "Concept",
        vec![
            format!("{}/__people-rw", writer.uri()),
            format!("{}/__organisations-rw", writer.uri()),
        ],
    )
}

fn create_app(checker: HealthChecker) -> axum::Router {
    create_router(AppState {
        health: Arc::new(checker),
        manager: None,
        metrics: None,
        version: "1.2.3".to_string(),
    })
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_healthy_dependencies() {
    let proxy = MockServer::start().await;
    let writer = MockServer::start().await;
    mount_topics(&proxy, serde_json::json!(["Concept", "NativeCmsPublicationEvents"])).await;
    mount_gtg(&writer, "/__people-rw/__gtg", 200).await;
    mount_gtg(&writer, "/__organisations-rw/__gtg", 200).await;

    let app = create_app(create_checker(&proxy, &writer));

    let (status, _) = get(app.clone(), "/__gtg").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app, "/__health").await;
    assert_eq!(status, StatusCode::OK);

    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["ok"], true);
    assert_eq!(report["checks"].as_array().unwrap().len(), 2);
    assert_eq!(report["checks"][0]["checkOutput"], "");
}

#[tokio::test]
async fn test_missing_topic_is_unhealthy() {
    let proxy = MockServer::start().await;
    let writer = MockServer::start().await;
    mount_topics(&proxy, serde_json::json!(["SomethingElse"])).await;
    mount_gtg(&writer, "/__people-rw/__gtg", 200).await;
    mount_gtg(&writer, "/__organisations-rw/__gtg", 200).await;

    let checker = create_checker(&proxy, &writer);

    let proxy_check = checker.check_queue_proxy().await;
    assert!(!proxy_check.ok);
    assert!(proxy_check.check_output.contains("Concept"));
    assert!(checker.check_writers().await.ok);

    let (status, _) = get(create_app(checker), "/__gtg").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unparseable_topics_is_unhealthy() {
    let proxy = MockServer::start().await;
    let writer = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topics"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&proxy)
        .await;

    let check = create_checker(&proxy, &writer).check_queue_proxy().await;

    assert!(!check.ok);
    assert!(check.check_output.contains("parsing topics failed"));
}

#[tokio::test]
async fn test_unavailable_writer_fails_gtg() {
    let proxy = MockServer::start().await;
    let writer = MockServer::start().await;
    mount_topics(&proxy, serde_json::json!(["Concept"])).await;
    mount_gtg(&writer, "/__people-rw/__gtg", 200).await;
    mount_gtg(&writer, "/__organisations-rw/__gtg", 503).await;

    let checker = create_checker(&proxy, &writer);

    let writers = checker.check_writers().await;
    assert!(!writers.ok);
    assert!(writers.check_output.contains("__organisations-rw/__gtg"));

    let app = create_app(checker);
    let (status, _) = get(app.clone(), "/__gtg").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, body) = get(app, "/__health").await;
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["ok"], false);
}

#[tokio::test]
async fn test_ping_and_build_info() {
    let proxy = MockServer::start().await;
    let writer = MockServer::start().await;
    let app = create_app(create_checker(&proxy, &writer));

    for uri in ["/__ping", "/ping"] {
        let (status, body) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "pong");
    }

    for uri in ["/__build-info", "/build-info"] {
        let (status, body) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::OK);
        let info: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(info["version"], "1.2.3");
    }
}

#[tokio::test]
async fn test_metrics_endpoint_renders_prometheus_text() {
    let proxy = MockServer::start().await;
    let writer = MockServer::start().await;
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        ci_router::router_metrics::record_write("organisations", "writer", true);
    });

    let app = create_router(AppState {
        health: Arc::new(create_checker(&proxy, &writer)),
        manager: None,
        metrics: Some(handle),
        version: "1.2.3".to_string(),
    });

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("concept_ingester_writes_total"));
    assert!(body.contains("concept=\"organisations\""));
}

async fn health_with_manager(manager: Arc<IngestionManager>) -> serde_json::Value {
    let proxy = MockServer::start().await;
    let writer = MockServer::start().await;
    mount_topics(&proxy, serde_json::json!(["Concept"])).await;
    mount_gtg(&writer, "/__people-rw/__gtg", 200).await;
    mount_gtg(&writer, "/__organisations-rw/__gtg", 200).await;

    let app = create_router(AppState {
        health: Arc::new(create_checker(&proxy, &writer)),
        manager: Some(manager),
        metrics: None,
        version: "1.2.3".to_string(),
    });

    let (status, body) = get(app, "/__health").await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_str(&body).unwrap()
}

#[tokio::test]
async fn test_running_consumers_are_healthy() {
    let manager = create_manager(true);
    let handle = tokio::spawn(manager.clone().start());
    tokio::time::sleep(Duration::from_millis(30)).await;

    let report = health_with_manager(manager.clone()).await;

    assert_eq!(report["checks"].as_array().unwrap().len(), 3);
    assert_eq!(report["checks"][2]["ok"], true);
    assert_eq!(report["ok"], true);

    manager.shutdown().await;
    handle.await.unwrap();
}

#[tokio::test]
async fn test_stopped_workers_are_unhealthy() {
    let report = health_with_manager(create_manager(true)).await;

    assert_eq!(report["checks"][2]["ok"], false);
    assert_eq!(report["checks"][2]["checkOutput"], "Stream workers are not running");
    assert_eq!(report["ok"], false);
}

#[tokio::test]
async fn test_failing_consumer_is_reported() {
    let manager = create_manager(false);
    let handle = tokio::spawn(manager.clone().start());
    tokio::time::sleep(Duration::from_millis(30)).await;

    let report = health_with_manager(manager.clone()).await;

    let output = report["checks"][2]["checkOutput"].as_str().unwrap().to_string();
    assert!(output.contains("idiConcept/Concept#0"));
    assert_eq!(report["ok"], false);

    manager.shutdown().await;
    handle.await.unwrap();
}
