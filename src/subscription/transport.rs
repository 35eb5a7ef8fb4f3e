// DANS : src/subscription/transport.rs

use crate::data_pipeline::transaction::TransactionDetail;
use crate::error::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use tokio::sync::mpsc;

/// Une notification `logsSubscribe`. Éphémère : consommée immédiatement, jamais stockée.
#[derive(Debug, Clone)]
pub struct LogNotification {
    pub signature: Signature,
    /// Slot rapporté par le contexte de la notification (indicatif).
    pub slot: u64,
    pub logs: Vec<String>,
    /// La transaction a échoué on-chain (champ `err` de la notification).
    pub failed: bool,
}

pub type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Un abonnement actif : le flux de notifications et de quoi le libérer.
pub struct LogSubscription {
    pub notifications: mpsc::UnboundedReceiver<LogNotification>,
    release: ReleaseFn,
}

impl LogSubscription {
    pub fn new<F>(notifications: mpsc::UnboundedReceiver<LogNotification>, release: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        Self {
            notifications,
            release: Box::new(release),
        }
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<LogNotification>, ReleaseFn) {
        (self.notifications, self.release)
    }
}

/// Le transport entrant : un abonnement aux logs par programme.
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn subscribe_logs(
        &self,
        program_id: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<LogSubscription>;
}

/// Les lectures on-chain dont le pipeline a besoin.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `Ok(None)` si la transaction n'est pas (encore) interrogeable.
    async fn get_transaction(&self, signature: &Signature) -> Result<Option<TransactionDetail>>;

    /// Slot auquel la signature a été vue par le nœud, s'il la connaît.
    async fn get_signature_slot(&self, signature: &Signature) -> Result<Option<u64>>;

    async fn get_block_time(&self, slot: u64) -> Result<Option<i64>>;
}

/// Source des métadonnées d'actif (décimales d'un mint).
#[async_trait]
pub trait AssetMetadataSource: Send + Sync {
    async fn fetch_decimals(&self, mint: &Pubkey) -> Result<u8>;
}
