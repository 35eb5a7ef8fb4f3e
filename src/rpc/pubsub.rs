// DANS : src/rpc/pubsub.rs

use crate::error::{Result, SwapWatchError};
use crate::subscription::transport::{LogNotification, LogSubscription, LogTransport};
use async_trait::async_trait;
use futures_util::{future::BoxFuture, StreamExt};
use solana_client::{
    nonblocking::pubsub_client::PubsubClient,
    rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter},
    rpc_response::{Response, RpcLogsResponse},
};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// `LogTransport` sur une connexion WebSocket partagée par tous les abonnements.
pub struct PubsubLogTransport {
    client: Arc<PubsubClient>,
    release_timeout: Duration,
}

impl PubsubLogTransport {
    pub async fn connect(ws_url: &str) -> Result<Self> {
        info!(ws_url, "[Pubsub] Connexion WebSocket...");
        let client = PubsubClient::new(ws_url).await?;
        info!("[Pubsub] Connexion réussie.");
        Ok(Self {
            client: Arc::new(client),
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        })
    }
}

#[async_trait]
impl LogTransport for PubsubLogTransport {
    async fn subscribe_logs(
        &self,
        program_id: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<LogSubscription> {
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let client = self.client.clone();
        let program = *program_id;

        // Le flux emprunte le client : la tâche possède les deux.
        let mut task = tokio::spawn(async move {
            let subscribed = client
                .logs_subscribe(
                    RpcTransactionLogsFilter::Mentions(vec![program.to_string()]),
                    RpcTransactionLogsConfig {
                        commitment: Some(commitment),
                    },
                )
                .await;
            let (mut stream, unsubscribe) = match subscribed {
                Ok(subscription) => {
                    let _ = ready_tx.send(Ok(()));
                    subscription
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    item = stream.next() => match item {
                        Some(response) => {
                            let Some(notification) = to_notification(response) else {
                                continue;
                            };
                            if notification_tx.send(notification).is_err() {
                                break;
                            }
                        }
                        None => {
                            warn!(program_id = %program, "[Pubsub] Le flux logsSubscribe s'est terminé.");
                            break;
                        }
                    }
                }
            }

            drop(stream);
            unsubscribe().await;
            debug!(program_id = %program, "[Pubsub] Désabonné.");
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SwapWatchError::Transport(format!(
                    "la tâche d'abonnement pour {program} s'est arrêtée avant de répondre"
                )))
            }
        }

        let release_timeout = self.release_timeout;
        let release = move || -> BoxFuture<'static, Result<()>> {
            Box::pin(async move {
                let _ = stop_tx.send(());
                match tokio::time::timeout(release_timeout, &mut task).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(SwapWatchError::Transport(format!(
                        "tâche d'abonnement {program} : {e}"
                    ))),
                    Err(_) => {
                        task.abort();
                        Err(SwapWatchError::Timeout(
                            release_timeout.as_millis() as u64,
                            format!("désabonnement de {program}"),
                        ))
                    }
                }
            })
        };

        Ok(LogSubscription::new(notification_rx, release))
    }
}

/// Convertit une notification brute ; `None` si la signature est illisible.
fn to_notification(response: Response<RpcLogsResponse>) -> Option<LogNotification> {
    let signature = match Signature::from_str(&response.value.signature) {
        Ok(signature) => signature,
        Err(e) => {
            debug!(raw = %response.value.signature, error = %e, "[Pubsub] Signature illisible, notification ignorée.");
            return None;
        }
    };

    Some(LogNotification {
        signature,
        slot: response.context.slot,
        failed: response.value.err.is_some(),
        logs: response.value.logs,
    })
}
