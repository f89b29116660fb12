use inkread::{api, config, logging, service::InkreadService, session};
use std::{net::Ipv4Addr, ops::RangeInclusive, sync::Arc};
use tokio::net::TcpListener;

const FALLBACK_PORTS: RangeInclusive<u16> = 8080..=8099;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let service = InkreadService::from_config(config).expect("Failed to build upstream clients");
    let sweeper = session::spawn_sweeper(service.store(), config.session_sweep_interval);
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener(config.server_port, FALLBACK_PORTS)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    sweeper.abort();
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Bind the configured port, or the first free port in `fallback` when none is configured.
async fn bind_listener(
    configured: Option<u16>,
    fallback: RangeInclusive<u16>,
) -> Result<(TcpListener, u16), std::io::Error> {
    if let Some(port) = configured {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    let (first, last) = (*fallback.start(), *fallback.end());
    for port in fallback {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port busy");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!("No free port between {first} and {last}"),
    ))
}
