use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use uuid::Uuid;

use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::db;
use crate::graph::{AudioGraphAdapter, GraphBroker};
use crate::rooms::RoomRegistry;
use crate::store::CredentialStore;
use crate::transport::{PortAllocator, TransportSupervisor};

const CERT_DIR: &str = "certs";

/// Builds every long-lived component, wires the transport supervisor's
/// death notifications into the room registry, and runs the hub until
/// a shutdown signal arrives.
pub async fn run(config: AppConfig) -> Result<()> {
    let db_pool = db::init_pool(&config.database).await.context("opening database")?;
    db::run_migrations(&db_pool).await.context("running migrations")?;
    tracing::info!(path = %config.database.path, "database ready");

    let credentials = Arc::new(CredentialStore::new(db_pool));
    let ports = Arc::new(PortAllocator::new(config.transport.base_port, config.transport.port_range));
    let (supervisor, mut death_rx) = TransportSupervisor::new(config.transport.bin.clone());
    let supervisor = Arc::new(supervisor);
    let broker = GraphBroker::new();
    let graph = Arc::new(AudioGraphAdapter::new("jamhub-patchbay"));

    let rooms = Arc::new(RoomRegistry::new(
        ports,
        supervisor,
        broker.clone(),
        config.hub.host.clone(),
        config.room.single_room_mode,
    ));

    if config.room.single_room_mode {
        let system_owner = Uuid::nil();
        rooms
            .seed_default_room(system_owner, config.room.band_name.clone())
            .await
            .context("seeding default room")?;
        tracing::info!(name = %config.room.band_name, "single-room mode: default room seeded");
    }

    {
        let rooms = rooms.clone();
        tokio::spawn(async move {
            while let Some(died) = death_rx.recv().await {
                tracing::warn!(room_id = %died.room_id, "transport died, tearing down room");
                rooms.destroy_on_transport_death(&died.room_id).await;
            }
        });
    }

    if !config.room.single_room_mode {
        let rooms = rooms.clone();
        let grace = Duration::from_secs(config.room.reap_grace_secs);
        tokio::spawn(async move {
            reap_empty_rooms(rooms, grace).await;
        });
    }

    let state = AppState {
        credentials,
        rooms,
        graph,
        broker,
    };

    let tls_config = ensure_tls(&config).await.context("preparing TLS material")?;
    let app = api::build_router(state);
    let addr: SocketAddr = format!("{}:{}", config.hub.host, config.hub.port)
        .parse()
        .context("parsing bind address")?;

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    tracing::info!(%addr, "jamhub listening");
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("serving HTTP")?;

    tracing::info!("jamhub stopped gracefully");
    Ok(())
}

/// `leave` already destroys a room the instant its last participant
/// departs; this sweep is the backstop for rooms that stayed empty
/// anyway — created but never joined, or left empty by a teardown that
/// didn't run to completion.
async fn reap_empty_rooms(rooms: Arc<RoomRegistry>, grace: Duration) {
    let mut ticker = tokio::time::interval(grace);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        rooms.reap_idle(grace).await;
    }
}

async fn shutdown_on_signal(handle: Handle) {
    wait_for_signal().await;
    tracing::info!("shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));

    wait_for_signal().await;
    tracing::warn!("second shutdown signal received, forcing exit");
    std::process::exit(1);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Load TLS material from the configured cert/key paths, or generate a
/// self-signed pair into `certs/` on first run.
async fn ensure_tls(config: &AppConfig) -> Result<RustlsConfig> {
    if let (Some(cert), Some(key)) = (&config.tls.certfile, &config.tls.keyfile) {
        return RustlsConfig::from_pem_file(cert, key)
            .await
            .context("loading configured TLS material");
    }

    let cert_path = Path::new(CERT_DIR).join("jamhub.pem");
    let key_path = Path::new(CERT_DIR).join("jamhub-key.pem");

    if !cert_path.exists() || !key_path.exists() {
        tracing::info!("no TLS material configured, generating a self-signed certificate");
        tokio::fs::create_dir_all(CERT_DIR).await?;

        let certified = rcgen::generate_simple_self_signed(vec![config.hub.host.clone(), "localhost".to_string()])
            .context("generating self-signed certificate")?;
        tokio::fs::write(&cert_path, certified.cert.pem()).await?;
        tokio::fs::write(&key_path, certified.key_pair.serialize_pem()).await?;
    }

    RustlsConfig::from_pem_file(&cert_path, &key_path)
        .await
        .context("loading generated TLS material")
}
