//! roverlinkd: robot telemetry gateway daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use roverlink_core::config::RoverlinkConfig;
use roverlink_services::{BusOutbox, ClientIdGen, ClientTable, Gateway, GatewayEvent, GatewayStatus};

mod bus;
mod dispatch;
mod process;
mod transport;

use bus::RecordingBus;
use dispatch::Dispatcher;
use process::TokioLauncher;
use transport::StreamListener;

const OUTBOX_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RoverlinkConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = RoverlinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RoverlinkConfig::with_defaults()
    });
    tracing::info!(
        http_port = config.network.http_port,
        stream_port = config.network.stream_port,
        api_port = config.network.api_port,
        managed = config.managed.len(),
        "roverlinkd starting"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // Child processes stop on this token; the tracker waits for them.
    let processes = CancellationToken::new();
    let tracker = TaskTracker::new();

    // Shared state
    let (events_tx, events_rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let (status_tx, status_rx) = watch::channel(GatewayStatus::default());
    let clients: ClientTable = Arc::new(DashMap::new());
    let outbox = BusOutbox::new(OUTBOX_CAPACITY);
    let ids = ClientIdGen::default();

    let bus = RecordingBus::new(config.topics.clone(), outbox.clone());
    let mut launcher = TokioLauncher::new(
        events_tx.clone(),
        config.managed.clone(),
        processes.clone(),
        tracker.clone(),
    );
    let started = launcher.start_managed();
    tracing::info!(?started, "managed processes launched");

    let gateway = Gateway::new(&config, bus, launcher);

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let dispatch_task = tokio::spawn(
        Dispatcher::new(
            gateway,
            events_rx,
            status_tx,
            clients.clone(),
            &config.gateway,
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let stream_listener = TcpListener::bind(("0.0.0.0", config.network.stream_port))
        .await
        .context("failed to bind stream port")?;
    let stream_task = tokio::spawn(
        StreamListener::new(
            stream_listener,
            events_tx.clone(),
            ids.clone(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let state = roverlink_api::ApiState {
        events: events_tx,
        status: status_rx,
        clients,
        outbox,
        ids,
        shutdown_tx: shutdown_tx.clone(),
    };

    let api_task = {
        let state = state.clone();
        let port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(e) = roverlink_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    let web_task = {
        let port = config.network.http_port;
        let root = config.web.root.clone();
        tokio::spawn(async move {
            if let Err(e) = roverlink_api::serve_web(state, port, root).await {
                tracing::error!(error = %e, "web server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = dispatch_task      => tracing::error!("dispatcher exited: {:?}", r.map(|r| r.map(|_| ()))),
        r = stream_task        => tracing::error!("stream listener exited: {:?}", r),
        r = api_task           => tracing::error!("API server exited: {:?}", r),
        r = web_task           => tracing::error!("web server exited: {:?}", r),
    }

    processes.cancel();
    tracker.close();
    if tokio::time::timeout(Duration::from_secs(5), tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!("child processes did not stop in time");
    }

    Ok(())
}
