// DANS : src/subscription/mod.rs

use crate::error::{Result, SwapWatchError};
use crate::swaps::{as_base58_list, TrackedPair};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

pub mod manager;
pub mod transport;

/// L'ensemble des programmes surveillés. Jamais vide : c'est vérifié à la construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSet(Arc<[Pubkey]>);

impl ProgramSet {
    pub fn new(program_ids: Vec<Pubkey>) -> Result<Self> {
        if program_ids.is_empty() {
            return Err(SwapWatchError::Config(
                "au moins un program id doit être surveillé".to_string(),
            ));
        }
        let mut unique: Vec<Pubkey> = Vec::with_capacity(program_ids.len());
        for id in program_ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Ok(Self(unique.into()))
    }

    /// Le premier programme configuré : repli final de l'attribution.
    pub fn primary(&self) -> Pubkey {
        self.0[0]
    }

    pub fn contains(&self, program_id: &Pubkey) -> bool {
        self.0.contains(program_id)
    }

    pub fn as_slice(&self) -> &[Pubkey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ProgramSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        as_base58_list(&self.0, serializer)
    }
}

/// Les états du gestionnaire d'abonnements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Subscribing,
    Running,
    Stopping,
}

/// Snapshot publié de l'état du moniteur. Lu sans verrou par `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub active_subscriptions: usize,
    pub pair: Option<TrackedPair>,
    pub program_ids: ProgramSet,
}
