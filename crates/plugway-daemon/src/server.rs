//! Web server setup and routing

use anyhow::{anyhow, bail, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::config::{DaemonConfig, TlsConfig};
use crate::state::AppState;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/scan", post(api::trigger_scan))
        .route("/devices", get(api::list_devices))
        .route("/{id}/state", get(api::get_state))
        .route("/{id}/on", get(api::is_on).post(api::turn_on))
        .route("/{id}/off", post(api::turn_off))
        .route("/{id}/toggle", post(api::toggle))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the periodic scanner and the web server until either stops
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let app = router(state.clone());

    // Start periodic discovery in background
    let scanner = state.scanner.clone();
    let every = Duration::from_secs(state.config.scan.interval_secs);
    let timeout = state.scan_timeout();
    let policy = state.config.scan.on_failure;
    let mut periodic =
        tokio::spawn(async move { scanner.run_periodic(every, timeout, policy).await });

    tokio::select! {
        served = serve(app, &state.config.daemon) => {
            periodic.abort();
            served
        }
        joined = &mut periodic => match joined {
            Ok(Ok(())) => bail!("Periodic scanner stopped"),
            Ok(Err(e)) => {
                error!(error = %e, "Periodic scan failed, shutting down");
                Err(anyhow!(e).context("Periodic scan failed"))
            }
            Err(e) => Err(anyhow!("Periodic scanner task failed: {}", e)),
        },
    }
}

/// Serve on whichever listener the configuration selects
async fn serve(app: Router, daemon: &DaemonConfig) -> Result<()> {
    #[cfg(unix)]
    {
        if let Some(path) = &daemon.unix_socket {
            return run_unix(app, path).await;
        }
    }

    if let Some(tls_config) = &daemon.tls {
        run_https(app, &daemon.bind, tls_config).await
    } else {
        run_http(app, &daemon.bind).await
    }
}

/// Run plain HTTP server
async fn run_http(app: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Run HTTP over a unix domain socket
#[cfg(unix)]
async fn run_unix(app: Router, path: &std::path::Path) -> Result<()> {
    // Left behind by a previous run that did not shut down cleanly
    if path.exists() {
        std::fs::remove_file(path)?;
        info!(path = %path.display(), "Removed stale socket");
    }

    let listener = tokio::net::UnixListener::bind(path)?;
    info!(path = %path.display(), protocol = "HTTP", "Starting web server on unix socket");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = std::fs::remove_file(path);
    Ok(())
}

/// Run HTTPS server with TLS
async fn run_https(app: Router, bind: &str, tls: &TlsConfig) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::path::PathBuf;

    let cert_path = PathBuf::from(&tls.cert);
    let key_path = PathBuf::from(&tls.key);

    // Verify files exist
    if !cert_path.exists() {
        bail!("TLS certificate file not found: {}", tls.cert);
    }
    if !key_path.exists() {
        bail!("TLS key file not found: {}", tls.key);
    }

    let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;

    let addr: std::net::SocketAddr = bind.parse()?;
    info!(address = %bind, protocol = "HTTPS", cert = %tls.cert, "Starting web server with TLS");

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use plugway_core::{DeviceConnector, DeviceControl, DeviceHandle, DiscoveredDevice};
    use plugway_discovery::{Discovery, DiscoveryError, FailurePolicy};
    use tempfile::TempDir;

    struct BrokenDiscovery {
        panics: bool,
    }

    #[async_trait]
    impl Discovery for BrokenDiscovery {
        async fn scan(&self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
            if self.panics {
                panic!("discovery crashed");
            }
            Err(DiscoveryError::Failed("no network".to_string()))
        }
    }

    struct NoDevices;

    impl DeviceConnector for NoDevices {
        fn connect(&self, _handle: &DeviceHandle) -> Box<dyn DeviceControl> {
            unreachable!("no device calls are made")
        }
    }

    async fn run_with(discovery: BrokenDiscovery) -> Result<()> {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("devices.json");
        std::fs::write(&catalog, r#"{"A": {"name": "lamp", "local_key": "key-a"}}"#).unwrap();

        let mut config = Config::default();
        config.catalog.path = catalog;
        config.daemon.unix_socket = Some(dir.path().join("plugway.sock"));
        config.scan.on_failure = FailurePolicy::Exit;

        let state = AppState::with_parts(config, Arc::new(discovery), Arc::new(NoDevices))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), run(state))
            .await
            .expect("run did not stop after the periodic scan failed")
    }

    #[tokio::test]
    async fn test_failed_periodic_scan_stops_server() {
        let err = run_with(BrokenDiscovery { panics: false }).await.unwrap_err();
        assert!(err.to_string().contains("Periodic scan failed"));
        assert!(format!("{:#}", err).contains("no network"));
    }

    #[tokio::test]
    async fn test_panicked_periodic_scan_stops_server() {
        let err = run_with(BrokenDiscovery { panics: true }).await.unwrap_err();
        assert!(err.to_string().contains("Periodic scanner task failed"));
    }
}
