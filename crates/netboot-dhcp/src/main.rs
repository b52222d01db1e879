use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use netboot_dhcp::backend::file::File;
use netboot_dhcp::backend::BackendReader;
use netboot_dhcp::handler::{proxy, reservation};
use netboot_dhcp::{server, Listener, ServerConfig};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Netboot DHCP server - serves host reservations and PXE boot options
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/netboot-dhcp/config.yaml")]
    config: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Config {
    /// Address the DHCP listener binds to.
    #[serde(default = "default_listen_address")]
    listen_address: SocketAddr,

    /// Path to the host-record file served by the file backend.
    backend_file: PathBuf,

    /// Run the reservation (authoritative) handler.
    #[serde(default = "default_true")]
    reservation_enabled: bool,

    /// Run the proxyDHCP handler alongside it.
    #[serde(default)]
    proxy_enabled: bool,

    server: ServerConfig,
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], server::DHCP_SERVER_PORT))
}

fn default_true() -> bool {
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netboot_dhcp=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let contents = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read configuration from {}", args.config))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("invalid configuration in {}", args.config))?;
    info!(config = %args.config, "loaded configuration");

    let backend: Arc<dyn BackendReader> = Arc::new(File::load(&config.backend_file)?);

    let mut listener = Listener::new(config.listen_address);
    if config.reservation_enabled {
        listener.register(Arc::new(reservation::Handler::new(
            config.server.clone(),
            Arc::clone(&backend),
        )));
        info!("registered reservation handler");
    }
    if config.proxy_enabled {
        listener.register(Arc::new(proxy::Handler::new(
            config.server.clone(),
            Arc::clone(&backend),
        )));
        info!("registered proxy handler");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt");
            let _ = shutdown_tx.send(true);
        }
    });

    info!(addr = %config.listen_address, "starting DHCP server");
    match listener.listen_and_serve(shutdown_rx).await {
        Err(server::Error::Cancelled) => {
            info!("shutdown complete");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "DHCP server failed");
            Err(err.into())
        }
        Ok(()) => Ok(()),
    }
}
