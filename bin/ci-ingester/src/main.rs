//! Concept Ingester
//!
//! Consumes concept messages from the Kafka REST proxy and routes each one to
//! the writer service for its Message-Type.
//!
//! Configuration is read from a TOML file with CONCEPT_INGESTER_* environment
//! overrides. Any invalid writer or elasticsearch address aborts startup
//! before a single message is consumed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ci_config::{AppConfig, ConfigLoader};
use ci_queue::{KafkaProxyConfig, KafkaProxyConsumer, QueueConsumer};
use ci_router::{
    build_http_client, create_router, resolve_secondary_writer, resolve_writer_mappings, AppState,
    HealthChecker, IngestionManager, ManagerConfig, MessageRouter, OutcomeCounters,
    OutcomeRecorder, SecondaryIndexDispatcher, Throttle, WriterClientConfig, WriterDispatcher,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    ci_common::logging::init_logging("concept-ingester");

    info!("Starting Concept Ingester");

    let config = ConfigLoader::new().load().context("Failed to load configuration")?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let client = build_http_client(&client_config(&config))?;

    let mappings = resolve_writer_mappings(&config.writers.services, &config.writers.base_address)
        .context("Invalid writer services")?;
    if mappings.is_empty() {
        warn!("No writer services configured; every message will be counted as a failure");
    }
    let writer_urls: Vec<String> = mappings.urls().map(str::to_string).collect();

    let secondary_addresses = resolve_secondary_writer(&config.writers.elasticsearch_address)
        .context("Invalid elasticsearch writer address")?;
    let secondary = SecondaryIndexDispatcher::new(
        client.clone(),
        secondary_addresses,
        config.writers.elasticsearch_concepts.iter().cloned(),
    );

    let throttle = Throttle::per_second(config.throttle.messages_per_second);
    if throttle.is_none() {
        info!("Throttle disabled");
    }

    let counters = Arc::new(OutcomeCounters::new());
    let router = MessageRouter::new(
        WriterDispatcher::new(client.clone(), Arc::new(mappings)),
        OutcomeRecorder::new(counters),
    )
    .with_secondary(secondary)
    .with_throttle(throttle);

    let proxies = config.consumer.proxy_address_list();
    let consumers: Vec<Arc<dyn QueueConsumer>> = (0..config.consumer.stream_count)
        .map(|stream| {
            let address = proxies[stream % proxies.len()].clone();
            info!(stream, proxy = %address, "Creating queue consumer");
            Arc::new(KafkaProxyConsumer::new(
                client.clone(),
                KafkaProxyConfig {
                    address,
                    group: config.consumer.group_id.clone(),
                    queue: config.consumer.queue.clone(),
                    topic: config.consumer.topic.clone(),
                    offset: config.consumer.offset.clone(),
                    autocommit_enable: config.consumer.autocommit_enable,
                },
                stream,
            )) as Arc<dyn QueueConsumer>
        })
        .collect();

    let manager = Arc::new(IngestionManager::new(
        consumers,
        Arc::new(router),
        ManagerConfig {
            poll_interval: config.consumer.poll_interval(),
            backoff: config.consumer.backoff(),
            autocommit_enable: config.consumer.autocommit_enable,
        },
    ));

    let health = HealthChecker::new(
        client.clone(),
        proxies[0].clone(),
        config.consumer.queue.clone(),
        config.consumer.topic.clone(),
        writer_urls,
    );

    let app = create_router(AppState {
        health: Arc::new(health),
        manager: Some(manager.clone()),
        metrics: Some(prometheus),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.http.host, config.http.port);
    info!(address = %addr, "Starting HTTP API server");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server error");
        }
    });

    let manager_handle = tokio::spawn(manager.clone().start());

    shutdown_signal().await;
    info!("Shutdown signal received...");

    manager.shutdown().await;
    server_task.abort();

    match tokio::time::timeout(Duration::from_secs(30), manager_handle).await {
        Ok(_) => info!("Stream workers completed gracefully"),
        Err(_) => warn!("Stream workers did not complete within 30s timeout"),
    }

    info!("Concept Ingester shutdown complete");
    Ok(())
}

fn client_config(config: &AppConfig) -> WriterClientConfig {
    WriterClientConfig {
        connect_timeout: Duration::from_millis(config.client.connect_timeout_ms),
        request_timeout: Duration::from_millis(config.client.request_timeout_ms),
        keep_alive: Duration::from_millis(config.client.keep_alive_ms),
        max_idle_per_host: config.client.max_idle_per_host,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
