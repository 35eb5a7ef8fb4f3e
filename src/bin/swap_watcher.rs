// DANS : src/bin/swap_watcher.rs

use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use swap_watch::{
    config::Config,
    monitoring::{logging::setup_logging, metrics::start_metrics_server},
    rpc::{PubsubLogTransport, ResilientRpcClient},
    MonitorEvent, SwapMonitor,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Écrit chaque événement du moniteur sur stdout (une ligne JSON par événement).
async fn event_printer(mut events: tokio::sync::broadcast::Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "[SwapWatcher] Événement non sérialisable."),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "[SwapWatcher] Consommateur en retard, événements perdus.");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn run_watcher() -> Result<()> {
    info!("--- Démarrage du Swap Watcher ---");
    let config = Config::load().context("Lecture de la configuration")?;
    let settings = config.monitor_settings()?;
    let pair = config.tracked_pair()?;

    if let Some(port) = settings.metrics_port {
        tokio::spawn(start_metrics_server(port));
    }

    let rpc_client = Arc::new(ResilientRpcClient::new(
        settings.rpc_url.clone(),
        settings.commitment,
        settings.rpc_max_retries,
        settings.rpc_retry_delay_ms,
    ));
    let transport = Arc::new(
        PubsubLogTransport::connect(&settings.ws_url)
            .await
            .with_context(|| format!("Connexion WebSocket à {}", settings.ws_url))?,
    );

    let monitor = SwapMonitor::new(
        settings.program_ids.clone(),
        transport,
        rpc_client.clone(),
        rpc_client,
        settings.monitor_options(),
    )?;

    let printer = tokio::spawn(event_printer(monitor.events()));

    monitor
        .subscribe(pair)
        .await
        .context("Impossible de démarrer la surveillance")?;
    info!(
        programs = monitor.status().active_subscriptions,
        "[SwapWatcher] Surveillance démarrée. Ctrl-C pour arrêter."
    );

    tokio::signal::ctrl_c()
        .await
        .context("Écoute du signal Ctrl-C")?;
    info!("[SwapWatcher] Arrêt demandé.");

    let failures = monitor.unsubscribe_all().await;
    if !failures.is_empty() {
        warn!(failures = failures.len(), "[SwapWatcher] Certains abonnements n'ont pas pu être libérés.");
    }
    drop(monitor);
    let _ = tokio::time::timeout(Duration::from_secs(2), printer).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    if let Err(e) = run_watcher().await {
        error!("[SwapWatcher] Le service a planté : {:?}.", e);
        return Err(e);
    }
    Ok(())
}
