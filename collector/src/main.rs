//! Collector web server: authenticated event-ingestion front door.
//!
//! Receives signed event batches on `POST /v1`, verifies the HMAC
//! credential, enriches each event with the caller's address and receipt
//! time, and hands every event to the queue dispatcher. Per-item queue
//! failures are diverted to the errors queue and never surface to callers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use event_collector::clock::SystemClock;
use event_collector::queue::{AmqpPublisher, MemoryQueue, QueueHandle};
use event_collector::web::{collect_events, health, preflight, AppState, OriginGate};
use event_collector::{
    CollectPolicy, Config, Dispatcher, EventCollector, KeyStore, QueueBackendKind,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("collector_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        signing_keys = config.signing_keys.len(),
        allowed_origins = config.allowed_origins.len(),
        events_queue = %config.events_queue,
        errors_queue = %config.errors_queue,
        backend = ?config.queue_backend,
        "config_loaded"
    );

    let keystore = KeyStore::from_config(
        config
            .signing_keys
            .iter()
            .map(|(name, secret)| (name.as_str(), secret.as_str())),
    )
    .context("Failed to load signing keys")?;

    let (events_queue, errors_queue, publisher) = build_queues(&config);

    let policy = CollectPolicy {
        max_batch_bytes: config.max_batch_bytes,
        max_event_bytes: config.max_event_bytes,
        require_user_agent: config.require_user_agent,
        date_skew_max_secs: config.date_skew_max_secs,
    };

    let collector = EventCollector::new(
        keystore,
        Arc::new(SystemClock),
        OriginGate::new(config.allowed_origins.clone()),
        Dispatcher::new(events_queue, errors_queue),
        policy,
    );

    let state = AppState::new(Arc::new(collector), config.trust_forwarded_for);

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/v1", post(collect_events).options(preflight))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "collector_listening");

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Close publisher connection
    if let Some(publisher) = publisher {
        publisher.close().await;
    }

    info!("collector_shutdown_complete");

    Ok(())
}

/// Construct the events and errors queue handles for the configured
/// backing. The AMQP publisher is returned so shutdown can close it.
fn build_queues(config: &Config) -> (QueueHandle, QueueHandle, Option<AmqpPublisher>) {
    match config.queue_backend {
        QueueBackendKind::Amqp => {
            let publisher = AmqpPublisher::new(
                config.amqp_url.clone(),
                vec![config.events_queue.clone(), config.errors_queue.clone()],
            );
            let publish_timeout = Duration::from_millis(config.publish_timeout_ms);
            let events = QueueHandle::Amqp {
                publisher: publisher.clone(),
                queue: config.events_queue.clone(),
                publish_timeout,
            };
            let errors = QueueHandle::Amqp {
                publisher: publisher.clone(),
                queue: config.errors_queue.clone(),
                publish_timeout,
            };
            (events, errors, Some(publisher))
        }
        QueueBackendKind::Memory => {
            let (events, events_rx) =
                MemoryQueue::bounded(config.events_queue.clone(), config.queue_capacity);
            let (errors, errors_rx) =
                MemoryQueue::bounded(config.errors_queue.clone(), config.queue_capacity);
            drain(config.events_queue.clone(), events_rx);
            drain(config.errors_queue.clone(), errors_rx);
            (
                QueueHandle::Memory(events),
                QueueHandle::Memory(errors),
                None,
            )
        }
    }
}

/// Keep a memory queue's receiving side alive, logging each message.
fn drain(queue: String, mut rx: tokio::sync::mpsc::Receiver<Vec<u8>>) {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            tracing::debug!(queue = %queue, bytes = message.len(), "memory_queue_drained");
        }
    });
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("collector_shutting_down");
}
