//! Sluice Agent
//!
//! A background daemon that keeps a ProxySQL read hostgroup weighted toward
//! its lowest-latency replicas. It has no inbound API; it probes, re-weights
//! and publishes on a fixed period until it receives a shutdown signal.

#![deny(unsafe_code)]
#![deny(missing_docs)]

use std::sync::Arc;

use clap::Parser;
use sluice_core::{Controller, ControllerConfig, RoutingStore, RoutingTable};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cli::{Cli, StoreKind};
use errors::AgentError;
use latency::prober::TcpProber;
use routing_store::proxysql::ProxySqlAdmin;

mod cli;
mod errors;
mod latency;
mod routing_store;

/// The primary entrypoint for the weight controller agent.
///
/// Configuration errors are fatal before the loop starts; everything that goes
/// wrong inside a cycle is logged and retried on the next one.
#[tokio::main]
async fn main() -> Result<(), AgentError> {
    let cli = Cli::parse();
    cli.configure_telemetry()?;

    let config = cli.controller_config()?;
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    match cli.store {
        StoreKind::Proxysql => {
            let store = ProxySqlAdmin::new(
                cli.admin_endpoint(),
                cli.mysql_bin.clone(),
                cli.admin_timeout(),
            );
            info!(
                admin = %cli.admin_host,
                port = cli.admin_port,
                "driving ProxySQL admin interface"
            );
            warn_on_missing_backends(&store, &config).await;
            run_controller(config, store, cli.seed_weights, cancel).await?;
        }
        StoreKind::Memory => {
            let table = Arc::new(RoutingTable::with_hostgroup(
                config.hostgroup,
                &config.workers,
                config.bounds().midpoint(),
            ));
            let hostgroup = config.hostgroup;
            info!("driving in-memory routing table (dry run)");
            run_controller(config, table.clone(), cli.seed_weights, cancel).await?;
            info!(weights = ?table.runtime_weights(hostgroup), "final runtime weights");
        }
    }

    info!("Shutting down gracefully.");
    Ok(())
}

/// Build the controller and run it until `cancel` fires.
async fn run_controller<S: RoutingStore + 'static>(
    config: ControllerConfig,
    store: S,
    seed_weights: bool,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let controller = Controller::new(config, TcpProber::new(), store)?;

    if seed_weights {
        if let Err(e) = controller.seed_store().await {
            warn!(error = %e, "failed to seed starting weights, continuing");
        }
    }

    let controller = controller.run(cancel).await;
    info!(live = ?controller.live_weights(), "controller stopped");
    Ok(())
}

/// Warn about configured backends that the admin interface has no row for.
///
/// Their weights would never be applied, so every weight write fails until
/// the backend list or the `mysql_servers` table is corrected.
async fn warn_on_missing_backends(store: &ProxySqlAdmin, config: &ControllerConfig) {
    match store.missing_backends(config.hostgroup, &config.workers).await {
        Ok(missing) => {
            for backend in missing {
                warn!(
                    hostgroup = %config.hostgroup,
                    backend = %backend,
                    "backend has no mysql_servers row, its weight cannot be applied"
                );
            }
        }
        Err(e) => warn!(error = %e, "failed to list mysql_servers, skipping backend check"),
    }
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
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
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown requested, finishing the current cycle");
    cancel.cancel();
}
