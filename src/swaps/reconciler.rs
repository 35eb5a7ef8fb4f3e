// DANS : src/swaps/reconciler.rs

use crate::data_pipeline::transaction::{BalanceSnapshotEntry, Holder};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};

/// Plancher absolu de la tolérance sur le total net (soldes proches de zéro).
pub const DELTA_EPSILON: f64 = 1e-12;

/// Le sens attendu pour le mouvement net d'un actif.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedDirection {
    /// L'actif dépensé : on veut la magnitude d'un total négatif.
    Decrease,
    /// L'actif reçu : on veut la magnitude d'un total positif.
    Increase,
}

/// Calcule le mouvement net d'un mint sur l'ensemble des détenteurs d'une transaction.
///
/// Les deltas sont sommés sur TOUS les détenteurs (pools, comptes de frais,
/// comptes intermédiaires) plutôt que sur une seule paire avant/après.
/// Un détenteur absent d'un des deux snapshots compte pour zéro.
///
/// Retourne `None` si le total n'a pas le signe attendu (ou est nul) : cela
/// signifie que la transaction n'a pas déplacé l'actif dans ce sens.
/// "Nul" s'entend à l'erreur d'arrondi près, proportionnelle au plus gros solde en jeu.
pub fn net_movement(
    pre: &[BalanceSnapshotEntry],
    post: &[BalanceSnapshotEntry],
    mint: &Pubkey,
    direction: ExpectedDirection,
) -> Option<f64> {
    let pre_map = holder_amounts(pre, mint);
    let post_map = holder_amounts(post, mint);

    let holders: HashSet<&Holder> = pre_map.keys().chain(post_map.keys()).collect();

    let total_delta: f64 = holders
        .into_iter()
        .map(|holder| {
            let before = pre_map.get(holder).copied().unwrap_or(0.0);
            let after = post_map.get(holder).copied().unwrap_or(0.0);
            after - before
        })
        .sum();

    let largest = pre_map
        .values()
        .chain(post_map.values())
        .fold(0.0_f64, |acc, amount| acc.max(amount.abs()));
    let tolerance = rounding_tolerance(largest, pre_map.len() + post_map.len());

    match direction {
        ExpectedDirection::Decrease if total_delta < -tolerance => Some(-total_delta),
        ExpectedDirection::Increase if total_delta > tolerance => Some(total_delta),
        _ => None,
    }
}

/// Borne de l'erreur d'arrondi accumulée en sommant `terms` montants de l'ordre de `largest`.
fn rounding_tolerance(largest: f64, terms: usize) -> f64 {
    let bound = largest * f64::EPSILON * (2 * terms + 2) as f64;
    bound.max(DELTA_EPSILON)
}

/// Un même détenteur peut posséder plusieurs comptes du même mint : on cumule.
fn holder_amounts(entries: &[BalanceSnapshotEntry], mint: &Pubkey) -> HashMap<Holder, f64> {
    let mut amounts = HashMap::new();
    for entry in entries.iter().filter(|e| &e.mint == mint) {
        *amounts.entry(entry.holder).or_insert(0.0) += entry.ui_amount;
    }
    amounts
}
