// DANS : src/swaps/mod.rs

use serde::{Serialize, Serializer};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::fmt::Display;

pub mod extractor;
pub mod reconciler;

/// La paire suivie par un abonnement. Immuable pendant toute la durée de vie
/// d'un `subscribe()` : la remplacer implique de reconstruire l'abonnement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedPair {
    /// Le mint dépensé par le swap.
    #[serde(serialize_with = "as_base58")]
    pub input_mint: Pubkey,
    /// Le mint reçu par le swap.
    #[serde(serialize_with = "as_base58")]
    pub output_mint: Pubkey,
    /// Montant d'entrée minimum (unités UI). `None` = pas de filtre.
    pub min_input_amount: Option<f64>,
    /// Montant de sortie minimum (unités UI). `None` = pas de filtre.
    pub min_output_amount: Option<f64>,
}

impl TrackedPair {
    pub fn new(input_mint: Pubkey, output_mint: Pubkey) -> Self {
        Self {
            input_mint,
            output_mint,
            min_input_amount: None,
            min_output_amount: None,
        }
    }

    pub fn with_min_input(mut self, amount: f64) -> Self {
        self.min_input_amount = Some(amount);
        self
    }

    pub fn with_min_output(mut self, amount: f64) -> Self {
        self.min_output_amount = Some(amount);
        self
    }
}

/// D'où vient l'horodatage d'un `SwapEvent`, de la plus précise à la moins précise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// `blockTime` embarqué dans la transaction.
    BlockTime,
    /// Résolu après coup via `getBlockTime(slot)`.
    SlotLookup,
    /// Heure murale au moment de la détection (dernier recours).
    DetectedAt,
}

/// L'événement normalisé livré aux consommateurs. Immuable une fois émis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapEvent {
    #[serde(serialize_with = "as_base58")]
    pub signature: Signature,
    pub slot: u64,
    /// Secondes Unix.
    pub timestamp: i64,
    pub timestamp_source: TimestampSource,
    #[serde(serialize_with = "as_base58")]
    pub input_mint: Pubkey,
    #[serde(serialize_with = "as_base58")]
    pub output_mint: Pubkey,
    /// Toujours strictement positif.
    pub input_amount: f64,
    /// Toujours strictement positif.
    pub output_amount: f64,
    #[serde(serialize_with = "as_base58")]
    pub program_id: Pubkey,
}

/// Sérialise une Pubkey / Signature sous sa forme base58 plutôt qu'en tableau d'octets.
pub(crate) fn as_base58<T: Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub(crate) fn as_base58_list<T: Display, S: Serializer>(
    values: &[T],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|v| v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_event_serializes_keys_as_base58() {
        let input = Pubkey::new_unique();
        let output = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let event = SwapEvent {
            signature: Signature::default(),
            slot: 42,
            timestamp: 1_700_000_000,
            timestamp_source: TimestampSource::SlotLookup,
            input_mint: input,
            output_mint: output,
            input_amount: 1.5,
            output_amount: 300.0,
            program_id: program,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["input_mint"], input.to_string());
        assert_eq!(json["program_id"], program.to_string());
        assert_eq!(json["timestamp_source"], "slot_lookup");
        assert_eq!(json["slot"], 42);
    }

    #[test]
    fn tracked_pair_builders_set_thresholds() {
        let pair = TrackedPair::new(Pubkey::new_unique(), Pubkey::new_unique())
            .with_min_input(50.0)
            .with_min_output(0.5);
        assert_eq!(pair.min_input_amount, Some(50.0));
        assert_eq!(pair.min_output_amount, Some(0.5));
    }
}
