//! Stage Sync - control server for a multi-display stage timer
//!
//! This is the main entry point for the stage-sync application.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::net::TcpListener;
use tracing::{error, info};

use stage_sync::{
    api::create_router,
    bus::{JsonFileStore, StateBus},
    config::{Config, DisplayBackendKind},
    services::{
        CommandHost, DisplayBackend, HeadlessHost, SurfaceHost, SurfaceManager, VirtualDisplays,
        XrandrDisplays,
    },
    state::AppState,
    tasks::{display_watch_task, history_sweeper_task, store_writer_task, SWEEP_PERIOD},
    utils::shutdown_signal,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("stage_sync={},tower_http=info", config.log_level()))
        .init();

    info!("Starting stage-sync server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, displays={:?}, persist={}",
        config.host, config.port, config.displays, !config.no_persist
    );

    // State bus, loaded from the state file unless persistence is off
    let bus = if config.no_persist {
        StateBus::in_memory(config.bus_capacity)
    } else {
        info!("Persisting state to {}", config.state_file.display());
        let store = Arc::new(JsonFileStore::new(&config.state_file));
        let (bus, writer) = StateBus::with_store(store, config.bus_capacity);
        tokio::spawn(store_writer_task(writer));
        bus
    };

    let backend: Arc<dyn DisplayBackend> = match config.displays {
        DisplayBackendKind::Xrandr => Arc::new(XrandrDisplays::new()),
        DisplayBackendKind::Virtual if config.display_specs.is_empty() => Arc::new(VirtualDisplays::single()),
        DisplayBackendKind::Virtual => {
            Arc::new(VirtualDisplays::from_specs(&config.display_specs).map_err(|e| anyhow!(e))?)
        }
    };
    let host: Arc<dyn SurfaceHost> = match config.renderer.as_deref().and_then(CommandHost::new) {
        Some(renderer) => Arc::new(renderer),
        None => Arc::new(HeadlessHost),
    };

    let surfaces = SurfaceManager::new(backend, host, bus.clone(), config.feed_base(), config.stagger());
    match surfaces.list_displays().await {
        Ok(displays) => info!("{} displays detected", displays.len()),
        Err(e) => error!("Display enumeration failed, continuing without displays: {}", e),
    }

    // Create application state
    let state = Arc::new(AppState::new(bus, surfaces.clone(), config.port, config.host.clone()));

    // Background tasks
    tokio::spawn(display_watch_task(surfaces, config.display_poll()));
    tokio::spawn(history_sweeper_task(Arc::clone(&state), SWEEP_PERIOD));

    // Create HTTP router with all endpoints
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /timers/{{primary|extra|overlay}}/{{start|pause|resume|reset|adjust|attention}}");
    info!("  POST /programs/start, POST /history/:id/run, DELETE /history");
    info!("  POST /alert/{{show|flash|clear}}, POST /next-program, POST /clock");
    info!("  GET  /displays, GET|POST /surfaces, POST /surfaces/{{auto|duplicate}}, DELETE /surfaces/:id");
    info!("  PUT  /overlay, PUT /settings/{{display-sizes|background|text-case}}");
    info!("  GET  /state?keys=, GET /surfaces/:id/events");
    info!("  GET  /status, GET /health");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
