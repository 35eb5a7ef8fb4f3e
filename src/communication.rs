// DANS : src/communication.rs

use crate::subscription::ProgramSet;
use crate::swaps::{SwapEvent, TrackedPair};
use serde::{Serialize, Serializer};
use solana_sdk::signature::Signature;
use tokio::sync::broadcast;

// --- CONSTANTES CENTRALISÉES ---
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// --- PROTOCOLE DES ÉVÉNEMENTS ---
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Le moniteur est passé en `Running`.
    Start {
        pair: TrackedPair,
        program_ids: ProgramSet,
    },
    Swap(SwapEvent),
    /// Erreur isolée : l'abonnement reste actif. `signature` est absente pour
    /// les erreurs qui ne concernent pas une transaction (libération d'abonnement).
    Error {
        #[serde(serialize_with = "optional_base58")]
        signature: Option<Signature>,
        message: String,
    },
    /// Le moniteur est revenu en `Idle`.
    Stop,
}

fn optional_base58<S: Serializer>(
    signature: &Option<Signature>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match signature {
        Some(sig) => serializer.collect_str(sig),
        None => serializer.serialize_none(),
    }
}

/// Diffusion multi-consommateurs des `MonitorEvent`.
///
/// Un consommateur trop lent perd les événements les plus anciens
/// (`RecvError::Lagged`) sans bloquer le pipeline.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Retourne le nombre de consommateurs atteints (0 si personne n'écoute).
    pub fn publish(&self, event: MonitorEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
