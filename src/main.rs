//! ==============================================================================
//! main.rs - asthma monitor host entry point
//! ==============================================================================
//!
//! purpose:
//!     subscribes to the public sensor broker, keeps the latest / history
//!     views of every biometric and air-quality channel, persists them, and
//!     serves them (plus the ai assistant) on a local dashboard.
//!
//! responsibilities:
//!     - load configuration and install logging
//!     - build the sensor hub and rehydrate it from disk
//!     - supervise the broker connection (reopen after loss)
//!     - serve the dashboard / json api until ctrl-c
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                    │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │ transport   │  │ web server  │  │ persistence writers │  │
//!     │  │ supervisor  │  │ (port 3000) │  │ (latest, history)   │  │
//!     │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │         │ ingest         │ read               │ snapshots   │
//!     │         └────────────────┼────────────────────┘             │
//!     │                    ┌─────┴─────┐                            │
//!     │                    │ SensorHub │ <- hub.rs                  │
//!     │                    └───────────┘                            │
//!     └─────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use asthma_monitor::assistant::ChatSession;
use asthma_monitor::config::{BrokerConfig, MonitorConfig};
use asthma_monitor::hub::SensorHub;
use asthma_monitor::persist::{FileStore, KeyValueStore, Persistence, StorageKeys};
use asthma_monitor::server::{self, AppState, TransportSlot};
use asthma_monitor::transport;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: logging, then configuration (which may change the level)
    let filter_handle = init_tracing();
    info!("Asthma Monitor - sensor host v{}", env!("CARGO_PKG_VERSION"));

    let config = MonitorConfig::load_or_default();
    if let Some(handle) = filter_handle {
        if let Err(e) = handle.reload(EnvFilter::new(&config.logging.level)) {
            warn!("could not apply log level {}: {}", config.logging.level, e);
        }
    }
    config.log_summary();

    // step 2: sensor hub with file-backed write-through
    let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.storage.dir));
    let persistence = Persistence::start(
        kv,
        StorageKeys {
            latest: config.storage.latest_key.clone(),
            history: config.storage.history_key.clone(),
        },
    );
    let hub = Arc::new(
        SensorHub::new(config.history.max_len, persistence)
            .with_reading_log(config.logging.show_sensor_data),
    );

    // step 3: rehydrate concurrently with the first connection; live
    // readings that beat it are merged, not overwritten
    let rehydrate_hub = hub.clone();
    tokio::spawn(async move { rehydrate_hub.rehydrate().await });

    // step 4: broker connection
    let slot: TransportSlot = Arc::new(RwLock::new(None));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = tokio::spawn(supervise_transport(
        config.broker.clone(),
        hub.clone(),
        slot.clone(),
        shutdown_rx,
    ));

    // step 5: assistant
    let chat = config
        .assistant
        .enabled
        .then(|| Arc::new(Mutex::new(ChatSession::new(&config.assistant))));

    // step 6: serve until ctrl-c
    let state = AppState { hub, transport: slot.clone(), chat };
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
        }
    };
    info!("dashboard live at http://{}", config.server.bind);
    let served = server::run_server(&config.server.bind, state, ctrl_c).await;

    // teardown: pending persistence writes are not awaited
    info!("shutting down");
    if let Some(handle) = slot.read().await.as_ref() {
        handle.disconnect().await;
    }
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), supervisor).await;

    served
}

/// `RUST_LOG` wins when set; otherwise the level comes from the config file
fn init_tracing() -> Option<reload::Handle<EnvFilter, Registry>> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
        return None;
    }
    let (filter, handle) = reload::Layer::new(EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
    Some(handle)
}

// ==============================================================================
// transport supervisor
// ==============================================================================
// the adapter itself never retries. this loop is the surrounding lifecycle:
// after a lost connection it waits, then opens a fresh one.

async fn supervise_transport(
    config: BrokerConfig,
    hub: Arc<SensorHub>,
    slot: TransportSlot,
    mut shutdown: watch::Receiver<bool>,
) {
    let delay = Duration::from_secs(config.reconnect_delay_secs.max(1));

    while !*shutdown.borrow() {
        let (handle, session) = transport::connect(&config, hub.clone());
        *slot.write().await = Some(handle);

        tokio::select! {
            _ = session.run() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        info!("broker offline, reconnecting in {}s", delay.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
}
