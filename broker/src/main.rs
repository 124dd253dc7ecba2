//! Binary entrypoint: loads config, installs the `tracing` subscriber, wires
//! CSS/MR/HT/WP/CS together, and runs until SIGINT/SIGTERM, the original's
//! `roolet.go` + `corelauncher.Launch`.

use std::sync::Arc;

use anyhow::Context;
use argh::FromArgs;
use rpc_broker::config::Config;
use rpc_broker::Broker;

/// a line-oriented JSON-RPC broker multiplexing application clients, RPC
/// servers, and web-socket clients over long-lived connections.
#[derive(FromArgs)]
struct Args {
    /// path to the JSON config file (falls back to $CONF, then "config.json")
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// override the TCP listen port from the config file
    #[argh(option)]
    port: Option<u16>,

    /// enable the web-socket accept surface regardless of config
    #[argh(switch)]
    ws: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();
    let config_path = args
        .config
        .or_else(|| std::env::var("CONF").ok())
        .unwrap_or_else(|| "config.json".to_string());

    let mut config = match Config::load(&config_path) {
        Ok(c) => {
            tracing::info!(path = %config_path, "loaded config");
            c
        }
        Err(e) => {
            tracing::error!(error = %e, path = %config_path, "config load failed, terminating");
            return Err(e).context("loading config");
        }
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if args.ws {
        config.ws_enabled = true;
    }

    tracing::info!(
        addr = %config.addr,
        port = config.port,
        workers = config.workers,
        node = %config.node,
        "starting broker"
    );

    let broker = Arc::new(Broker::new(config));
    let (stop_tx, _) = tokio::sync::broadcast::channel(1);

    let run_stop_tx = stop_tx.clone();
    let run_handle = tokio::spawn(async move { broker.run(run_stop_tx).await });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping");
    let _ = stop_tx.send(());

    match run_handle.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("broker run loop"),
        Err(e) => Err(e).context("broker task panicked"),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
