//! Gateway relay HTTP server.
//!
//! Proxies `/async/*` calls to the backend and holds each request open until
//! the backend's worker reports the result on the message bus.

mod config;

use anyhow::Context;
use config::Config;
use gateway_relay_core::EventBus;
use gateway_relay_redpanda::RedpandaEventBus;
use gateway_relay_runtime::metrics::MetricsServer;
use gateway_relay_runtime::{CallAndWait, CorrelationRegistry, NotificationListener};
use gateway_relay_web::{AppState, HttpBackend, router};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gateway relay");

    // Load configuration
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        backend = %config.backend.base_url,
        redpanda_brokers = %config.redpanda.brokers,
        topic = %config.redpanda.topic,
        wait_secs = config.gateway.async_timeout_secs,
        retention_secs = config.gateway.result_retention_secs,
        late_completion = %config.gateway.late_completion_policy,
        "Configuration loaded"
    );

    let metrics = if config.server.metrics_enabled {
        let mut server = MetricsServer::new();
        server.start()?;
        Some(Arc::new(server))
    } else {
        None
    };

    // Setup event bus
    info!("Connecting to Redpanda event bus...");
    let event_bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .build()?,
    );

    let registry = CorrelationRegistry::new(config.registry_config()?);

    let listener = Arc::new(
        NotificationListener::spawn(
            Arc::clone(&event_bus),
            config.redpanda.topic.clone(),
            registry.clone(),
        )
        .await
        .context("Failed to subscribe to completion topic")?,
    );
    info!(topic = %listener.topic(), "Notification listener started");

    let sweeper = spawn_sweeper(registry.clone());

    let backend = Arc::new(HttpBackend::new(
        config.backend.base_url.clone(),
        config.backend_timeout(),
    )?);
    let gateway = CallAndWait::new(backend, registry.clone());

    let mut state = AppState::new(gateway).with_listener(Arc::clone(&listener));
    if let Some(metrics) = metrics {
        state = state.with_metrics(metrics);
    }
    let app = router(state);

    let addr = config.bind_address();
    let tcp = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    // Run server with graceful shutdown
    let shutdown = Arc::new(Notify::new());
    let mut server = tokio::spawn(
        axum::serve(tcp, app)
            .with_graceful_shutdown({
                let shutdown = Arc::clone(&shutdown);
                async move { shutdown.notified().await }
            })
            .into_future(),
    );

    tokio::select! {
        result = &mut server => {
            sweeper.abort();
            result.context("HTTP server task failed")??;
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    shutdown.notify_one();
    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(Ok(Ok(()))) => info!("HTTP server drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed during shutdown"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout,
            pending_waiters = registry.pending_count(),
            "Shutdown timeout elapsed with requests still in flight"
        ),
    }

    sweeper.abort();
    if let Ok(listener) = Arc::try_unwrap(listener) {
        listener.shutdown().await;
    }

    info!("Gateway relay stopped");
    Ok(())
}

/// Periodically drop early results and markers whose retention elapsed.
///
/// Per-entry timers normally handle this; the sweep covers entries created
/// where no timer could be scheduled.
fn spawn_sweeper(registry: CorrelationRegistry) -> tokio::task::JoinHandle<()> {
    let period = registry.config().retention;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let purged = registry.purge_expired();
            if purged > 0 {
                info!(purged, "Swept expired correlation entries");
            }
        }
    })
}

/// Graceful shutdown signal handler.
///
/// Waits for:
/// - Ctrl+C (SIGINT)
/// - SIGTERM (on Unix)
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
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
