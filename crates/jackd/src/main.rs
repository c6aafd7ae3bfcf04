//! jackd: the daemon entrypoint. Parses CLI args, wires every crate's
//! component together in dependency order, claims the PID file, runs
//! the control socket until SIGINT/SIGTERM, and tears everything down
//! cleanly. Shape follows `op-dbus-service::main`'s wiring-then-serve
//! structure, with the trait-object seams (`InterfaceBootstrap`,
//! `NamespaceCatalog`, `Subscriber`) threaded through in the order each
//! one's dependency becomes available.

mod pidfile;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use jack_config_store::ConfigStore;
use jack_control::{ControlServer, Handlers};
use jack_core::config;
use jack_logger::Level;
use jack_network::NetworkManager;
use jack_osadapters::OsAdapters;
use jack_plugins::PluginRegistry;
use jack_snapshot::SnapshotManager;
use jack_txn::TxnManager;

#[derive(Parser, Debug)]
#[command(name = "jackd", about = "transactional network configuration daemon")]
struct Args {
    /// Run one apply pass before entering the normal serving loop.
    #[arg(long)]
    apply: bool,

    /// Override the PID file path (default /var/run/jack.pid).
    #[arg(long)]
    pid_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let debug = config::debug_enabled();
    jack_logger::init_tracing(debug);
    let level = if debug { Level::Debug } else { Level::Info };
    let logger = jack_logger::init("jackd", level, vec![Arc::new(jack_logger::backend::TracingBackend)]);

    let pid_path = args.pid_file.clone().unwrap_or_else(pidfile::default_path);
    if let Err(e) = pidfile::check_and_claim(&pid_path).await {
        error!(error = %e, "refusing to start");
        return Err(e.into());
    }

    if let Err(e) = run(args, logger).await {
        error!(error = %e, "jackd exiting with error");
        pidfile::remove(&pid_path).await;
        return Err(e.into());
    }

    pidfile::remove(&pid_path).await;
    Ok(())
}

async fn run(args: Args, logger: &'static jack_logger::JackLogger) -> jack_core::Result<()> {
    let adapters = Arc::new(OsAdapters::real()?);

    let network = Arc::new(NetworkManager::new(adapters.clone()));

    let config_store = Arc::new(
        ConfigStore::new(adapters.filesystem.clone(), adapters.clock.clone())
            .with_bootstrap(network.clone()),
    );

    let reverse_dir = PathBuf::from(config::config_dir()).join("plugin-reverse");
    let plugins = Arc::new(PluginRegistry::new(reverse_dir));

    let txn = Arc::new(TxnManager::new(config_store).with_catalog(plugins.clone()));

    let checkpoint_dir = PathBuf::from(config::config_dir()).join("checkpoints");
    let snapshot = Arc::new(SnapshotManager::new(adapters.clone(), checkpoint_dir));

    let apply = Arc::new(jack_apply::ApplyOrchestrator::new(
        txn.clone(),
        network.clone(),
        snapshot.clone(),
        plugins.clone(),
    ));

    let started = plugins.discover_and_register().await;
    info!(count = started.len(), "plugins registered at startup");
    logger.subscribe(plugins.clone()).await;

    let handlers = Arc::new(Handlers { txn, apply: apply.clone(), snapshot, plugins: plugins.clone() });

    if args.apply {
        info!("running startup apply pass");
        apply.apply().await?;
    }

    let control = ControlServer::new(config::socket_path(), handlers, logger);

    let mut sigterm = signal(SignalKind::terminate()).map_err(jack_core::JackError::Io)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(jack_core::JackError::Io)?;

    tokio::select! {
        result = control.run() => {
            if let Err(e) = result {
                warn!(error = %e, "control server exited");
            }
        }
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    info!("shutting down");
    plugins.teardown_all().await;
    logger.shutdown().await;
    tokio::fs::remove_file(config::socket_path()).await.ok();

    Ok(())
}
