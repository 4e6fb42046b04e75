//! counter-bridge - the gateway binary
//!
//! Creates the SysV MWMR queues, brings up the configured broker plugins,
//! and drains order requests until SIGINT/SIGTERM.
//!
//! Exit codes: 0 normal shutdown, 1 fatal init failure, 2 no broker
//! initialized.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use counter_bridge::bridge::Bridge;
use counter_bridge::broker::TdPlugin;
use counter_bridge::core::{BrokerSpec, ShmConfig};
use counter_bridge::ledger::PositionLedger;
use counter_bridge::monitor;
use counter_bridge::shm::{ClientStore, MwmrQueue};
use counter_bridge::sim::SimulatorPlugin;
use counter_bridge::wire::{self, RequestMsg, ResponseMsg};

#[derive(Parser)]
#[command(
    name = "counter-bridge",
    about = "Multi-broker order-routing gateway over SysV MWMR shared memory",
    after_help = "Examples:\n  counter-bridge simulator:/etc/sim.yaml\n  counter-bridge ctp:/etc/ctp_td.yaml simulator:/etc/sim.yaml --position-file positions.csv"
)]
struct Args {
    /// Broker specs of the form <name>:<config_path>
    #[arg(required = true)]
    brokers: Vec<String>,

    /// Warm-start position file (CSV: symbol,ONLong,todayLong,ONShort,todayShort)
    #[arg(long)]
    position_file: Option<PathBuf>,

    /// Symbol route of the form <symbol>=<broker_name>; repeatable
    #[arg(long = "route")]
    routes: Vec<String>,

    /// Monitor HTTP port
    #[arg(long, default_value_t = 8080)]
    http_port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // A misbuilt binary must never touch the shared segments.
    if let Err(e) = wire::verify_layout() {
        tracing::error!("{}", e);
        return ExitCode::from(1);
    }

    let shm_cfg = ShmConfig::default();

    let request_queue = match MwmrQueue::<RequestMsg>::create(shm_cfg.request_key, shm_cfg.request_size) {
        Ok(q) => q,
        Err(e) => {
            tracing::error!("failed to create request queue: {}", e);
            return ExitCode::from(1);
        }
    };
    let response_queue =
        match MwmrQueue::<ResponseMsg>::create(shm_cfg.response_key, shm_cfg.response_size) {
            Ok(q) => q,
            Err(e) => {
                tracing::error!("failed to create response queue: {}", e);
                return ExitCode::from(1);
            }
        };
    let client_store = match ClientStore::create(shm_cfg.client_store_key, 0) {
        Ok(cs) => cs,
        Err(e) => {
            tracing::error!("failed to create client store: {}", e);
            return ExitCode::from(1);
        }
    };

    let ledger = Arc::new(PositionLedger::new());
    if let Some(path) = &args.position_file {
        if let Err(e) = ledger.load_snapshot(path) {
            tracing::warn!("position warm-start skipped: {}", e);
        }
    }

    let bridge = Bridge::new(response_queue, Arc::clone(&ledger));

    for route in &args.routes {
        match route.split_once('=') {
            Some((symbol, broker)) => bridge.add_route(symbol, broker),
            None => tracing::warn!("ignoring malformed route '{}'", route),
        }
    }

    for arg in &args.brokers {
        let spec = match BrokerSpec::parse(arg) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::error!("{}", e);
                continue;
            }
        };
        tracing::info!("loading broker '{}' with config {}", spec.name, spec.config_path);

        let plugin: Arc<dyn TdPlugin> = match spec.name.as_str() {
            "simulator" => Arc::new(SimulatorPlugin::new()),
            other => {
                // Vendor adapters (ctp, ...) live outside this build; the
                // plugin trait is the integration seam.
                tracing::error!("unsupported broker '{}', supported: simulator", other);
                continue;
            }
        };

        if let Err(e) = plugin.initialize(&spec.config_path) {
            tracing::error!("broker '{}' initialize failed: {}", spec.name, e);
            continue;
        }
        if let Err(e) = bridge.connect_broker(&spec.name, plugin) {
            tracing::error!("broker '{}' login failed: {}", spec.name, e);
            continue;
        }
    }

    if bridge.broker_count() == 0 {
        tracing::error!("no brokers initialized, exiting");
        return ExitCode::from(2);
    }

    // Give broker back-ends a moment to settle before accepting flow.
    tracing::info!("waiting for broker systems ready (3 seconds)...");
    tokio::time::sleep(Duration::from_secs(3)).await;

    let monitor_bridge = bridge.clone();
    let http_port = args.http_port;
    tokio::spawn(async move {
        if let Err(e) = monitor::serve(monitor_bridge, http_port).await {
            tracing::error!("{}", e);
        }
    });

    let drain_bridge = bridge.clone();
    let mut req_queue = request_queue;
    let processor = std::thread::spawn(move || drain_bridge.run(&mut req_queue));

    tracing::info!(
        "counter bridge up: request=0x{:x} response=0x{:x} client_store=0x{:x} brokers={}",
        shm_cfg.request_key,
        shm_cfg.response_key,
        shm_cfg.client_store_key,
        bridge.broker_count()
    );
    tracing::info!("waiting for orders via MWMR SHM, Ctrl+C to stop");

    wait_for_shutdown().await;
    tracing::info!("shutting down...");

    bridge.stop();
    if processor.join().is_err() {
        tracing::error!("request processor panicked");
    }

    // Plugins first, then bridge-side teardown.
    bridge.shutdown_brokers();

    if let Some(path) = &args.position_file {
        match ledger.save_snapshot(path) {
            Ok(()) => tracing::info!("positions saved to {}", path.display()),
            Err(e) => tracing::warn!("position save failed: {}", e),
        }
    }

    let _ = client_store.close();
    tracing::info!("counter bridge stopped");
    ExitCode::SUCCESS
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(term) => term,
                Err(e) => {
                    tracing::error!("failed to install SIGTERM handler: {}", e);
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
