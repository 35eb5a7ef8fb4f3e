// DANS : src/rpc/resilient_client.rs

use crate::data_pipeline::transaction::TransactionDetail;
use crate::decoders::decode_mint;
use crate::error::{Result, SwapWatchError};
use crate::monitoring::metrics;
use crate::subscription::transport::{AssetMetadataSource, ChainClient};
use async_trait::async_trait;
use serde_json::json;
use solana_client::{
    client_error::{ClientError, ClientErrorKind, Result as ClientResult},
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcTransactionConfig,
    rpc_request::{RpcError, RpcRequest},
};
use solana_sdk::{
    account::Account,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    pubkey::Pubkey,
    signature::Signature,
};
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::debug;

// Codes JSON-RPC "ce slot n'a pas (ou plus) de bloc" : inutile de ré-essayer.
const BLOCK_NOT_AVAILABLE: i64 = -32004;
const SLOT_SKIPPED: i64 = -32007;
const LONG_TERM_STORAGE_SLOT_SKIPPED: i64 = -32009;

/// Un "wrapper" autour du RpcClient de Solana qui ajoute une logique de
/// ré-essai automatique pour les appels RPC qui échouent à cause d'erreurs réseau temporaires.
#[derive(Clone)]
pub struct ResilientRpcClient {
    client: Arc<RpcClient>,
    max_retries: u8,
    delay_ms: u64,
}

impl ResilientRpcClient {
    /// Construit un nouveau client RPC résilient.
    pub fn new(rpc_url: String, commitment: CommitmentConfig, max_retries: u8, delay_ms: u64) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_commitment(rpc_url, commitment)),
            max_retries,
            delay_ms,
        }
    }

    /// Méthode "passe-plat" pour accéder à la configuration de commitment du client sous-jacent.
    pub fn commitment(&self) -> CommitmentConfig {
        self.client.commitment()
    }

    /// Détermine si une erreur du client est temporaire et si une nouvelle tentative doit être effectuée.
    fn is_retryable(error: &ClientError) -> bool {
        match &error.kind {
            ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. }) => !matches!(
                *code,
                BLOCK_NOT_AVAILABLE | SLOT_SKIPPED | LONG_TERM_STORAGE_SLOT_SKIPPED
            ),
            ClientErrorKind::Reqwest(_) | ClientErrorKind::RpcError(_) | ClientErrorKind::Io(_) => true,
            _ => false,
        }
    }

    fn is_missing_block(error: &ClientError) -> bool {
        matches!(
            &error.kind,
            ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. })
                if matches!(*code, BLOCK_NOT_AVAILABLE | SLOT_SKIPPED | LONG_TERM_STORAGE_SLOT_SKIPPED)
        )
    }

    /// Exécute `call` avec au plus `max_retries` nouvelles tentatives espacées de `delay_ms`.
    async fn with_retries<T, F, Fut>(&self, method: &'static str, mut call: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let _timer = metrics::RPC_REQUEST_LATENCY
            .with_label_values(&[method])
            .start_timer();

        let mut attempt = 0u8;
        loop {
            match call().await {
                Ok(value) => {
                    metrics::RPC_REQUESTS_TOTAL.with_label_values(&[method, "success"]).inc();
                    return Ok(value);
                }
                Err(e) if Self::is_retryable(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    metrics::RPC_REQUESTS_TOTAL.with_label_values(&[method, "retry"]).inc();
                    debug!(method, attempt, error = %e, "[RPC] Erreur temporaire, nouvelle tentative.");
                    sleep(Duration::from_millis(self.delay_ms)).await;
                }
                Err(e) => {
                    metrics::RPC_REQUESTS_TOTAL.with_label_values(&[method, "failure"]).inc();
                    return Err(e);
                }
            }
        }
    }

    /// Récupère un compte complet.
    pub async fn get_account(&self, pubkey: &Pubkey) -> Result<Account> {
        self.with_retries("get_account", || self.client.get_account(pubkey))
            .await
            .map_err(|e| SwapWatchError::Rpc(format!("Échec final de get_account pour {pubkey}: {e}")))
    }

    /// getTransaction renvoie `null` pour une transaction pas (encore) indexée :
    /// on désérialise en `Option` plutôt que de passer par `get_transaction_with_config`.
    async fn fetch_encoded_transaction(
        &self,
        signature: &Signature,
    ) -> ClientResult<Option<EncodedConfirmedTransactionWithStatusMeta>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.transaction_commitment()),
            max_supported_transaction_version: Some(0),
        };
        let params = json!([signature.to_string(), config]);
        self.with_retries("get_transaction", || {
            self.client.send::<Option<EncodedConfirmedTransactionWithStatusMeta>>(
                RpcRequest::GetTransaction,
                params.clone(),
            )
        })
        .await
    }

    /// getTransaction refuse `processed` : on remonte au minimum à `confirmed`.
    fn transaction_commitment(&self) -> CommitmentConfig {
        match self.commitment().commitment {
            CommitmentLevel::Processed => CommitmentConfig::confirmed(),
            _ => self.commitment(),
        }
    }
}

#[async_trait]
impl ChainClient for ResilientRpcClient {
    async fn get_transaction(&self, signature: &Signature) -> Result<Option<TransactionDetail>> {
        match self.fetch_encoded_transaction(signature).await? {
            Some(encoded) => TransactionDetail::from_encoded(*signature, &encoded).map(Some),
            None => Ok(None),
        }
    }

    async fn get_signature_slot(&self, signature: &Signature) -> Result<Option<u64>> {
        let response = self
            .with_retries("get_signature_statuses", || {
                self.client.get_signature_statuses(std::slice::from_ref(signature))
            })
            .await?;
        Ok(response.value.into_iter().next().flatten().map(|status| status.slot))
    }

    async fn get_block_time(&self, slot: u64) -> Result<Option<i64>> {
        match self
            .with_retries("get_block_time", || self.client.get_block_time(slot))
            .await
        {
            Ok(timestamp) => Ok(Some(timestamp)),
            Err(e) if Self::is_missing_block(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AssetMetadataSource for ResilientRpcClient {
    async fn fetch_decimals(&self, mint: &Pubkey) -> Result<u8> {
        let account = self.get_account(mint).await?;
        if account.owner != spl_token::id() && account.owner != spl_token_2022::id() {
            return Err(SwapWatchError::Decode(format!(
                "le compte {mint} n'appartient à aucun programme token (owner {})",
                account.owner
            )));
        }
        let decoded = decode_mint(mint, &account.data)?;
        debug!(mint = %decoded.address, decimals = decoded.decimals, supply = decoded.supply, "[ResilientRpcClient] Mint décodé.");
        Ok(decoded.decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_client::rpc_request::RpcResponseErrorData;

    fn response_error(code: i64) -> ClientError {
        ClientError::from(ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code,
            message: "erreur".to_string(),
            data: RpcResponseErrorData::Empty,
        }))
    }

    #[test]
    fn missing_block_errors_are_not_retried() {
        let err = response_error(BLOCK_NOT_AVAILABLE);
        assert!(!ResilientRpcClient::is_retryable(&err));
        assert!(ResilientRpcClient::is_missing_block(&err));
    }

    #[test]
    fn other_rpc_errors_are_retried() {
        let err = response_error(-32005);
        assert!(ResilientRpcClient::is_retryable(&err));
        assert!(!ResilientRpcClient::is_missing_block(&err));

        let err = ClientError::from(ClientErrorKind::Custom("invalide".to_string()));
        assert!(!ResilientRpcClient::is_retryable(&err));
    }

    #[test]
    fn processed_commitment_is_raised_for_get_transaction() {
        let client = ResilientRpcClient::new(
            "http://127.0.0.1:8899".to_string(),
            CommitmentConfig::processed(),
            0,
            0,
        );
        assert_eq!(client.transaction_commitment(), CommitmentConfig::confirmed());

        let client = ResilientRpcClient::new(
            "http://127.0.0.1:8899".to_string(),
            CommitmentConfig::finalized(),
            0,
            0,
        );
        assert_eq!(client.transaction_commitment(), CommitmentConfig::finalized());
    }
}
