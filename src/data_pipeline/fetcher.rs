// DANS : src/data_pipeline/fetcher.rs

use super::transaction::TransactionDetail;
use crate::error::{Result, SwapWatchError};
use crate::monitoring::metrics;
use crate::subscription::transport::ChainClient;
use solana_sdk::signature::Signature;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Résultat d'un fetch. Seul `Found` poursuit le pipeline ; les deux autres
/// sont des skips silencieux pour l'appelant.
#[derive(Debug)]
pub enum FetchOutcome {
    Found(Box<TransactionDetail>),
    /// Le nœud connaît la signature mais ne sert pas encore la transaction.
    NotYetAvailable,
    /// Le nœud ne connaît pas la signature.
    NotFound,
}

impl FetchOutcome {
    fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Found(_) => "found",
            FetchOutcome::NotYetAvailable => "not_yet_available",
            FetchOutcome::NotFound => "not_found",
        }
    }
}

/// Récupère le détail complet d'une transaction, borné par une échéance.
pub struct Fetcher {
    chain: Arc<dyn ChainClient>,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(chain: Arc<dyn ChainClient>, timeout: Duration) -> Self {
        Self { chain, timeout }
    }

    /// Les erreurs backend (après les ré-essais du client) et l'expiration de
    /// l'échéance sont remontées ; l'appelant les publie sans couper l'abonnement.
    pub async fn fetch(&self, signature: &Signature) -> Result<FetchOutcome> {
        let timer = metrics::FETCH_LATENCY.start_timer();
        let result = match tokio::time::timeout(self.timeout, self.lookup(signature)).await {
            Ok(result) => result,
            Err(_) => Err(SwapWatchError::Timeout(
                self.timeout.as_millis() as u64,
                format!("getTransaction {signature}"),
            )),
        };
        timer.observe_duration();

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(SwapWatchError::Timeout(..)) => "timeout",
            Err(_) => "error",
        };
        metrics::FETCH_OUTCOMES.with_label_values(&[label]).inc();
        result
    }

    async fn lookup(&self, signature: &Signature) -> Result<FetchOutcome> {
        if let Some(detail) = self.chain.get_transaction(signature).await? {
            return Ok(FetchOutcome::Found(Box::new(detail)));
        }

        // Transaction absente : le statut de la signature tranche entre
        // "pas encore indexée" et "inconnue". Best-effort.
        match self.chain.get_signature_slot(signature).await {
            Ok(Some(slot)) => {
                debug!(signature = %signature, slot, "[Fetcher] Signature connue, transaction pas encore disponible.");
                Ok(FetchOutcome::NotYetAvailable)
            }
            Ok(None) => {
                debug!(signature = %signature, "[Fetcher] Signature inconnue du nœud.");
                Ok(FetchOutcome::NotFound)
            }
            Err(e) => {
                debug!(signature = %signature, error = %e, "[Fetcher] Statut de signature indisponible.");
                Ok(FetchOutcome::NotYetAvailable)
            }
        }
    }
}
