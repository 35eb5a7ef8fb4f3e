// DANS : src/subscription/manager.rs

use super::transport::{AssetMetadataSource, ChainClient, LogNotification, LogTransport, ReleaseFn};
use super::{MonitorState, MonitorStatus, ProgramSet};
use crate::communication::{EventBus, MonitorEvent, DEFAULT_EVENT_CAPACITY};
use crate::data_pipeline::fetcher::{FetchOutcome, Fetcher};
use crate::error::{Result, SwapWatchError};
use crate::filtering::may_be_swap;
use crate::monitoring::metrics;
use crate::state::decimals_cache::DecimalsCache;
use crate::state::dedup::{SignatureDedup, DEFAULT_DEDUP_CAPACITY};
use crate::swaps::extractor::SwapExtractor;
use crate::swaps::TrackedPair;
use arc_swap::ArcSwap;
use futures_util::future::join_all;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, info_span, warn, Instrument};

/// Les réglages d'exécution d'un `SwapMonitor`.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub commitment: CommitmentConfig,
    pub dedup_capacity: usize,
    /// Échéance d'un fetch de transaction, et des lookups annexes (décimales, block time).
    pub fetch_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            commitment: CommitmentConfig::confirmed(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            fetch_timeout: Duration::from_secs(10),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Un abonnement logsSubscribe vivant pour un programme.
struct ProgramSubscription {
    program_id: Pubkey,
    release: ReleaseFn,
    pump: JoinHandle<()>,
}

/// Tout ce qui vit le temps d'un `subscribe()`.
struct ActiveRun {
    pair: TrackedPair,
    subscriptions: Vec<ProgramSubscription>,
    dedup: Arc<SignatureDedup>,
    gate: Arc<RunGate>,
    shutdown: watch::Sender<bool>,
}

/// Ouvert tant que le run vit. Toute émission du pipeline se fait sous le
/// verrou en lecture ; la fermeture prend le verrou en écriture, donc une fois
/// `close()` retourné plus rien n'est publié pour ce run.
struct RunGate(RwLock<bool>);

impl RunGate {
    fn open() -> Self {
        Self(RwLock::new(true))
    }

    fn close(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn is_open(&self) -> bool {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exécute `emit` seulement si le run est encore ouvert.
    fn emit_if_open(&self, emit: impl FnOnce()) -> bool {
        let open = self.0.read().unwrap_or_else(PoisonError::into_inner);
        if *open {
            emit();
        }
        *open
    }
}

/// Le gestionnaire d'abonnements : un flux de logs par programme surveillé,
/// chaque notification traitée dans sa propre tâche.
///
/// `Idle → Subscribing → Running → Stopping → Idle`. Les transitions sont
/// sérialisées ; `status()` lit un snapshot publié atomiquement et ne bloque jamais.
pub struct SwapMonitor {
    programs: ProgramSet,
    options: MonitorOptions,
    transport: Arc<dyn LogTransport>,
    chain: Arc<dyn ChainClient>,
    decimals: Arc<DecimalsCache>,
    events: EventBus,
    status: ArcSwap<MonitorStatus>,
    lifecycle: Mutex<Option<ActiveRun>>,
}

impl SwapMonitor {
    /// Échoue si aucun programme n'est fourni.
    pub fn new(
        program_ids: Vec<Pubkey>,
        transport: Arc<dyn LogTransport>,
        chain: Arc<dyn ChainClient>,
        metadata: Arc<dyn AssetMetadataSource>,
        options: MonitorOptions,
    ) -> Result<Self> {
        let programs = ProgramSet::new(program_ids)?;
        let decimals = Arc::new(DecimalsCache::new(metadata, options.fetch_timeout));
        let status = ArcSwap::from_pointee(MonitorStatus {
            state: MonitorState::Idle,
            active_subscriptions: 0,
            pair: None,
            program_ids: programs.clone(),
        });

        Ok(Self {
            events: EventBus::new(options.event_capacity),
            programs,
            options,
            transport,
            chain,
            decimals,
            status,
            lifecycle: Mutex::new(None),
        })
    }

    /// Démarre la surveillance de `pair`. Un abonnement en cours est d'abord
    /// entièrement démonté (et son dedup vidé).
    ///
    /// Si un des programmes ne peut pas être abonné, ceux déjà ouverts sont
    /// libérés et le moniteur retourne en `Idle`.
    pub async fn subscribe(&self, pair: TrackedPair) -> Result<()> {
        let mut active = self.lifecycle.lock().await;
        if let Some(run) = active.take() {
            info!("[SwapMonitor] Abonnement en cours, démontage avant de changer de paire.");
            self.teardown(run).await;
        }

        self.publish_status(MonitorState::Subscribing, 0, Some(pair.clone()));
        info!(
            input_mint = %pair.input_mint,
            output_mint = %pair.output_mint,
            programs = self.programs.len(),
            "[SwapMonitor] Abonnement en cours..."
        );

        // Pré-chauffage best-effort : un échec est mis en cache comme "non résolu".
        tokio::join!(
            self.decimals.resolve(&pair.input_mint),
            self.decimals.resolve(&pair.output_mint)
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let gate = Arc::new(RunGate::open());
        let dedup = Arc::new(SignatureDedup::new(self.options.dedup_capacity));
        let pipeline = Arc::new(Pipeline {
            pair: pair.clone(),
            programs: self.programs.clone(),
            fetcher: Fetcher::new(self.chain.clone(), self.options.fetch_timeout),
            extractor: SwapExtractor::new(
                self.decimals.clone(),
                self.chain.clone(),
                self.options.fetch_timeout,
            ),
            dedup: dedup.clone(),
            events: self.events.clone(),
            gate: gate.clone(),
        });

        let mut subscriptions = Vec::with_capacity(self.programs.len());
        for program_id in self.programs.as_slice() {
            match self
                .transport
                .subscribe_logs(program_id, self.options.commitment)
                .await
            {
                Ok(subscription) => {
                    let (notifications, release) = subscription.into_parts();
                    let pump = spawn_pump(*program_id, notifications, pipeline.clone(), shutdown_rx.clone());
                    info!(program_id = %program_id, "[SwapMonitor] Abonnement logsSubscribe actif.");
                    subscriptions.push(ProgramSubscription {
                        program_id: *program_id,
                        release,
                        pump,
                    });
                }
                Err(e) => {
                    warn!(program_id = %program_id, error = %e, "[SwapMonitor] Échec de l'abonnement, annulation.");
                    gate.close();
                    let _ = shutdown.send(true);
                    for failure in release_all(subscriptions).await {
                        warn!(error = %failure, "[SwapMonitor] Libération échouée pendant l'annulation.");
                    }
                    self.publish_status(MonitorState::Idle, 0, None);
                    return Err(e);
                }
            }
        }

        let count = subscriptions.len();
        *active = Some(ActiveRun {
            pair: pair.clone(),
            subscriptions,
            dedup,
            gate,
            shutdown,
        });
        self.publish_status(MonitorState::Running, count, Some(pair.clone()));
        info!(subscriptions = count, "[SwapMonitor] En surveillance.");
        self.events.publish(MonitorEvent::Start {
            pair,
            program_ids: self.programs.clone(),
        });
        Ok(())
    }

    /// Libère tous les abonnements, annule le travail en vol et vide le dedup.
    ///
    /// Idempotent. Les échecs de libération sont publiés un par un sur le canal
    /// d'événements et retournés ; ils n'interrompent pas le démontage.
    pub async fn unsubscribe_all(&self) -> Vec<SwapWatchError> {
        let mut active = self.lifecycle.lock().await;
        match active.take() {
            Some(run) => self.teardown(run).await,
            None => {
                debug!("[SwapMonitor] unsubscribe_all sans abonnement actif : rien à faire.");
                Vec::new()
            }
        }
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus::clone(&self.status.load())
    }

    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    async fn teardown(&self, run: ActiveRun) -> Vec<SwapWatchError> {
        let ActiveRun {
            pair,
            subscriptions,
            dedup,
            gate,
            shutdown,
        } = run;

        self.publish_status(MonitorState::Stopping, subscriptions.len(), Some(pair));
        info!(subscriptions = subscriptions.len(), "[SwapMonitor] Démontage...");

        // Attend les émissions en cours ; ensuite plus rien n'est publié pour ce run.
        gate.close();
        let _ = shutdown.send(true);

        let failures = release_all(subscriptions).await;
        for failure in &failures {
            warn!(error = %failure, "[SwapMonitor] Libération échouée, démontage poursuivi.");
            metrics::PIPELINE_ERRORS.inc();
            self.events.publish(MonitorEvent::Error {
                signature: None,
                message: failure.to_string(),
            });
        }

        dedup.clear();
        self.publish_status(MonitorState::Idle, 0, None);
        info!(failures = failures.len(), "[SwapMonitor] Arrêté.");
        self.events.publish(MonitorEvent::Stop);
        failures
    }

    fn publish_status(&self, state: MonitorState, active_subscriptions: usize, pair: Option<TrackedPair>) {
        self.status.store(Arc::new(MonitorStatus {
            state,
            active_subscriptions,
            pair,
            program_ids: self.programs.clone(),
        }));
        metrics::ACTIVE_SUBSCRIPTIONS.set(active_subscriptions as i64);
    }
}

/// Libère chaque abonnement indépendamment ; retourne les échecs.
async fn release_all(subscriptions: Vec<ProgramSubscription>) -> Vec<SwapWatchError> {
    let releases = subscriptions.into_iter().map(|subscription| async move {
        subscription.pump.abort();
        let program_id = subscription.program_id;
        (subscription.release)().await.map_err(|e| SwapWatchError::Teardown {
            program_id: program_id.to_string(),
            message: e.to_string(),
        })
    });

    join_all(releases)
        .await
        .into_iter()
        .filter_map(|result| result.err())
        .collect()
}

/// Lit le flux d'un programme et lance une tâche par notification.
fn spawn_pump(
    program_id: Pubkey,
    mut notifications: mpsc::UnboundedReceiver<LogNotification>,
    pipeline: Arc<Pipeline>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut task_shutdown = shutdown.clone();
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                received = notifications.recv() => match received {
                    Some(notification) => {
                        let pipeline = pipeline.clone();
                        let span = info_span!(
                            "notification",
                            signature = %notification.signature,
                            program_id = %program_id
                        );
                        tokio::spawn(
                            async move {
                                tokio::select! {
                                    _ = task_shutdown.wait_for(|stop| *stop) => {
                                        debug!("[SwapMonitor] Traitement annulé par le démontage.");
                                    }
                                    _ = pipeline.handle(notification) => {}
                                }
                            }
                            .instrument(span),
                        );
                    }
                    None => {
                        if pipeline.gate.is_open() {
                            warn!(program_id = %program_id, "[SwapMonitor] Flux de logs fermé par le transport.");
                            pipeline.report(None, format!("flux de logs fermé pour le programme {program_id}"));
                        }
                        break;
                    }
                }
            }
        }
    })
}

/// classifieur → fetch → extraction → émission, pour une notification.
struct Pipeline {
    pair: TrackedPair,
    programs: ProgramSet,
    fetcher: Fetcher,
    extractor: SwapExtractor,
    dedup: Arc<SignatureDedup>,
    events: EventBus,
    gate: Arc<RunGate>,
}

impl Pipeline {
    async fn handle(&self, notification: LogNotification) {
        metrics::NOTIFICATIONS_RECEIVED.inc();
        let signature = notification.signature;

        if notification.failed {
            metrics::NOTIFICATIONS_SKIPPED.with_label_values(&["failed_tx"]).inc();
            debug!("[SwapMonitor] Transaction échouée, ignorée.");
            return;
        }
        if !may_be_swap(&notification.logs) {
            metrics::NOTIFICATIONS_SKIPPED.with_label_values(&["classifier"]).inc();
            return;
        }
        if !self.dedup.try_claim(&signature) {
            metrics::NOTIFICATIONS_SKIPPED.with_label_values(&["duplicate"]).inc();
            debug!("[SwapMonitor] Signature déjà traitée.");
            return;
        }

        let detail = match self.fetcher.fetch(&signature).await {
            Ok(FetchOutcome::Found(detail)) => detail,
            Ok(FetchOutcome::NotYetAvailable) | Ok(FetchOutcome::NotFound) => {
                // Rendue au dedup : une nouvelle livraison pourra retenter.
                self.dedup.release(&signature);
                return;
            }
            Err(e) => {
                self.dedup.release(&signature);
                warn!(error = %e, "[SwapMonitor] Échec du fetch.");
                self.report(Some(signature), e.to_string());
                return;
            }
        };

        if detail.failed {
            debug!("[SwapMonitor] Transaction échouée on-chain, ignorée.");
            return;
        }

        let Some(event) = self.extractor.extract(&detail, &self.pair, &self.programs).await else {
            debug!("[SwapMonitor] Pas un swap de la paire suivie.");
            return;
        };

        let emitted = self.gate.emit_if_open(|| {
            metrics::SWAPS_EMITTED.inc();
            info!(
                slot = event.slot,
                input_amount = event.input_amount,
                output_amount = event.output_amount,
                attributed_program = %event.program_id,
                "[SwapMonitor] Swap détecté."
            );
            self.events.publish(MonitorEvent::Swap(event));
        });
        if !emitted {
            debug!("[SwapMonitor] Run terminé, swap abandonné.");
        }
    }

    fn report(&self, signature: Option<Signature>, message: String) {
        self.gate.emit_if_open(|| {
            metrics::PIPELINE_ERRORS.inc();
            self.events.publish(MonitorEvent::Error { signature, message });
        });
    }
}
