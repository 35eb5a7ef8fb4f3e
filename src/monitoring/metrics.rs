// DANS : src/monitoring/metrics.rs

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge,
};
use tracing::{info, warn};
use warp::Filter;

lazy_static! {
    // --- Flux entrant ---
    pub static ref NOTIFICATIONS_RECEIVED: IntCounter = register_int_counter!(
        "swapwatch_notifications_received_total", "Nombre total de notifications de logs reçues"
    ).unwrap();
    pub static ref NOTIFICATIONS_SKIPPED: IntCounterVec = register_int_counter_vec!(
        "swapwatch_notifications_skipped_total",
        "Notifications écartées avant le fetch",
        &["reason"] // Labels: "failed_tx", "classifier", "duplicate"
    ).unwrap();
    pub static ref ACTIVE_SUBSCRIPTIONS: IntGauge = register_int_gauge!(
        "swapwatch_active_subscriptions", "Nombre d'abonnements logsSubscribe actifs"
    ).unwrap();

    // --- Pipeline ---
    pub static ref FETCH_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "swapwatch_fetch_outcomes_total",
        "Résultats des fetchs de transactions",
        &["outcome"] // Labels: "found", "not_yet_available", "not_found", "timeout", "error"
    ).unwrap();
    pub static ref FETCH_LATENCY: Histogram = register_histogram!(
        "swapwatch_fetch_latency_seconds", "Latence d'un fetch complet (getTransaction + statut)"
    ).unwrap();
    pub static ref SWAPS_EMITTED: IntCounter = register_int_counter!(
        "swapwatch_swaps_emitted_total", "Nombre de SwapEvent émis"
    ).unwrap();
    pub static ref PIPELINE_ERRORS: IntCounter = register_int_counter!(
        "swapwatch_pipeline_errors_total", "Erreurs remontées sur le canal d'événements"
    ).unwrap();

    // --- Cache des décimales ---
    pub static ref DECIMALS_LOOKUPS: IntCounter = register_int_counter!(
        "swapwatch_decimals_lookups_total", "Lookups de décimales envoyés à la source de métadonnées"
    ).unwrap();
    pub static ref DECIMALS_CACHE_HITS: IntCounter = register_int_counter!(
        "swapwatch_decimals_cache_hits_total", "Résolutions de décimales servies par le cache"
    ).unwrap();

    // --- RPC ---
    pub static ref RPC_REQUEST_LATENCY: HistogramVec = register_histogram_vec!(
        "swapwatch_rpc_request_latency_seconds",
        "Latence des appels RPC vers le nœud Solana",
        &["method"] // Labels: "get_transaction", "get_account", etc.
    ).unwrap();
    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "swapwatch_rpc_requests_total",
        "Compteur total des requêtes RPC, segmenté par méthode et statut",
        &["method", "status"] // Labels: "get_transaction", "success" / "retry" / "failure"
    ).unwrap();
}

/// Expose `/metrics` sur le port donné. Ne retourne que si le serveur s'arrête.
pub async fn start_metrics_server(port: u16) {
    let metrics_route = warp::path!("metrics").map(|| {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "[Monitoring] Échec de l'encodage des métriques.");
        }
        warp::reply::with_header(buffer, "content-type", "text/plain; version=0.0.4")
    });
    info!(port, "[Monitoring] Serveur de métriques exposé sur /metrics");
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
}
