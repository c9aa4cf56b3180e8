//! snmp-monitord: SNMP monitoring daemon.
//!
//! Serves the JSON HTTP API and, when configured, polls a fixed fleet.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use snmp_monitor::config::Config;
use snmp_monitor::http;
use snmp_monitor::poller::{MemoryStore, Poller, Scheduler};
use snmp_monitor::SnmpClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// SNMP device monitoring daemon.
#[derive(Debug, Parser)]
#[command(name = "snmp-monitord", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, env = "SNMP_MONITOR_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address for the HTTP API; overrides the configuration file.
    #[arg(short, long, env = "SNMP_MONITOR_LISTEN", value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Run the poll scheduler even if the configuration leaves it disabled.
    #[arg(long)]
    poll: bool,

    /// Enable debug logging (snmp_monitor=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Enable trace logging (snmp_monitor=trace).
    #[arg(short = 'D', long = "trace")]
    trace: bool,
}

impl Args {
    /// `RUST_LOG` wins; otherwise `info`, raised by -d/-D.
    fn init_tracing(&self) {
        let fallback = if self.trace {
            "info,snmp_monitor=trace"
        } else if self.debug {
            "info,snmp_monitor=debug"
        } else {
            "info"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    args.init_tracing();

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if args.poll {
        config.poller.enabled = true;
    }

    let client = Arc::new(SnmpClient::new(config.client_config()));
    let shutdown = CancellationToken::new();

    let scheduler = if config.poller.enabled && !config.poller.devices.is_empty() {
        let poller = Arc::new(Poller::new(Arc::clone(&client), Arc::new(MemoryStore::new())));
        let scheduler = Scheduler::new(
            poller,
            config.poll_targets(),
            config.poll_interval(),
            config.poller.concurrency,
        );
        tracing::info!(target: "snmp_monitor::poller", { devices = config.poller.devices.len(), interval_secs = config.poller.interval_secs }, "starting poll scheduler");
        Some(tokio::spawn(scheduler.run(shutdown.clone())))
    } else {
        None
    };

    let listener = match tokio::net::TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: cannot listen on {}: {e}", config.listen);
            shutdown.cancel();
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(target: "snmp_monitor::http", { listen = %config.listen }, "serving HTTP API");

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "snmp_monitor::http", "shutdown requested");
        }
        signal.cancel();
    });

    let served = axum::serve(listener, http::router(client))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
