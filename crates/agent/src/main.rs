//! `custody-agent` -- on-device custody enforcement daemon.
//!
//! Re-establishes any persisted lock on start, then runs the tamper
//! monitor, the connectivity observer, the heartbeat poller, and the local
//! control socket until interrupted. See [`AgentConfig::from_env`] for the
//! environment variables.

use std::sync::Arc;

use custody_agent::config::AgentConfig;
use custody_agent::connectivity::{ConnectivityObserver, TcpProbe};
use custody_agent::control::{self, ControlContext};
use custody_agent::heartbeat::HeartbeatPoller;
use custody_agent::platform::{AndroidIntegritySource, ScreenState, TrackedRestrictions};
use custody_core::SystemClock;
use custody_engine::{Collaborators, Engine};
use custody_events::bus::log_events;
use custody_events::{EventBus, HttpCommandChannel};
use custody_store::{FileStore, StorageDomain};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bound on the connectivity probe's TCP connect.
const PROBE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "custody_agent=info,custody_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        device_id = %config.device_id,
        backend_url = %config.backend_url,
        boot_store = %config.boot_store_dir.display(),
        "Starting custody-agent",
    );

    let channel = Arc::new(HttpCommandChannel::new(config.channel_config()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client");
        std::process::exit(1);
    }));
    let probe = TcpProbe::for_url(&config.backend_url, PROBE_TIMEOUT).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid backend address");
        std::process::exit(1);
    });

    let bus = Arc::new(EventBus::default());
    let screen = Arc::new(ScreenState::default());
    let restrictions = Arc::new(TrackedRestrictions::default());
    tokio::spawn(log_events(bus.subscribe()));

    let engine = Engine::start(
        config.engine_config(),
        Collaborators {
            boot_store: Arc::new(FileStore::new(&config.boot_store_dir, StorageDomain::Boot)),
            session_store: Arc::new(FileStore::new(
                &config.session_store_dir,
                StorageDomain::Session,
            )),
            channel: channel.clone(),
            restrictions: restrictions.clone(),
            presentation: screen.clone(),
            clock: Arc::new(SystemClock),
            bus: bus.clone(),
        },
    )
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Custody engine failed to start");
        std::process::exit(1);
    });
    let engine = Arc::new(engine);

    let listener = control::bind(&config.control_socket).unwrap_or_else(|e| {
        tracing::error!(
            error = %e,
            path = %config.control_socket.display(),
            "Failed to bind control socket"
        );
        std::process::exit(1);
    });

    let cancel = CancellationToken::new();
    let mut tasks = tokio::task::JoinSet::new();

    let integrity = Arc::new(AndroidIntegritySource::default());
    let monitor = engine.tamper_monitor(integrity.clone());
    let token = cancel.clone();
    tasks.spawn(async move {
        let exit = monitor.run(token).await;
        tracing::info!(?exit, "Tamper monitor finished");
    });

    tasks.spawn(
        ConnectivityObserver::new(
            Arc::new(probe),
            engine.clone(),
            config.connectivity_probe_interval,
        )
        .run(cancel.clone()),
    );

    tasks.spawn(
        HeartbeatPoller::new(channel, engine.clone(), integrity, config.heartbeat_interval)
            .run(cancel.clone()),
    );

    tasks.spawn(control::serve(
        listener,
        config.control_socket.clone(),
        ControlContext {
            engine: engine.clone(),
            screen,
            restrictions,
        },
        cancel.clone(),
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested");
    cancel.cancel();

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Agent task panicked");
        }
    }
    tracing::info!("custody-agent stopped");
}
