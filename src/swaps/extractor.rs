// DANS : src/swaps/extractor.rs

use super::reconciler::{net_movement, ExpectedDirection};
use super::{SwapEvent, TimestampSource, TrackedPair};
use crate::data_pipeline::transaction::TransactionDetail;
use crate::state::decimals_cache::DecimalsCache;
use crate::subscription::transport::ChainClient;
use crate::subscription::ProgramSet;
use solana_sdk::pubkey::Pubkey;
use std::{
    str::FromStr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::debug;

/// Transforme le détail d'une transaction en `SwapEvent` normalisé, ou rien.
pub struct SwapExtractor {
    decimals: Arc<DecimalsCache>,
    chain: Arc<dyn ChainClient>,
    lookup_timeout: Duration,
}

impl SwapExtractor {
    pub fn new(decimals: Arc<DecimalsCache>, chain: Arc<dyn ChainClient>, lookup_timeout: Duration) -> Self {
        Self {
            decimals,
            chain,
            lookup_timeout,
        }
    }

    pub async fn extract(
        &self,
        detail: &TransactionDetail,
        pair: &TrackedPair,
        programs: &ProgramSet,
    ) -> Option<SwapEvent> {
        // Pas la peine de résoudre des décimales pour un mint que la transaction ne touche pas.
        if !touches_mint(detail, &pair.input_mint) || !touches_mint(detail, &pair.output_mint) {
            debug!(signature = %detail.signature, "[Extractor] La paire n'apparaît pas dans les soldes.");
            return None;
        }

        let (input_decimals, output_decimals) = tokio::join!(
            self.decimals_for(detail, &pair.input_mint),
            self.decimals_for(detail, &pair.output_mint)
        );

        let (input_amount, output_amount) =
            measure_amounts(detail, pair, input_decimals, output_decimals)?;

        if !passes_thresholds(pair, input_amount, output_amount) {
            debug!(
                signature = %detail.signature,
                input_amount,
                output_amount,
                "[Extractor] Swap sous les seuils minimums, ignoré."
            );
            return None;
        }

        let (timestamp, timestamp_source) = self.resolve_timestamp(detail).await;
        let program_id = attribute_program(detail, programs);

        Some(SwapEvent {
            signature: detail.signature,
            slot: detail.slot,
            timestamp,
            timestamp_source,
            input_mint: pair.input_mint,
            output_mint: pair.output_mint,
            input_amount,
            output_amount,
            program_id,
        })
    }

    /// `blockTime` embarqué, sinon `getBlockTime(slot)` sous timeout, sinon l'heure murale.
    pub async fn resolve_timestamp(&self, detail: &TransactionDetail) -> (i64, TimestampSource) {
        if let Some(block_time) = detail.block_time {
            return (block_time, TimestampSource::BlockTime);
        }

        match tokio::time::timeout(self.lookup_timeout, self.chain.get_block_time(detail.slot)).await {
            Ok(Ok(Some(block_time))) => (block_time, TimestampSource::SlotLookup),
            Ok(Ok(None)) => (wall_clock_secs(), TimestampSource::DetectedAt),
            Ok(Err(e)) => {
                debug!(slot = detail.slot, error = %e, "[Extractor] getBlockTime a échoué, repli sur l'heure de détection.");
                (wall_clock_secs(), TimestampSource::DetectedAt)
            }
            Err(_) => {
                debug!(slot = detail.slot, "[Extractor] getBlockTime expiré, repli sur l'heure de détection.");
                (wall_clock_secs(), TimestampSource::DetectedAt)
            }
        }
    }

    async fn decimals_for(&self, detail: &TransactionDetail, mint: &Pubkey) -> u8 {
        match detail.embedded_decimals(mint) {
            Some(decimals) => {
                self.decimals.record(*mint, decimals);
                decimals
            }
            None => self.decimals.resolve_decimals(mint).await,
        }
    }
}

/// Les deux réconciliations : l'entrée doit baisser, la sortie doit monter.
pub fn measure_amounts(
    detail: &TransactionDetail,
    pair: &TrackedPair,
    input_decimals: u8,
    output_decimals: u8,
) -> Option<(f64, f64)> {
    let (pre_in, post_in) = detail.snapshots(&pair.input_mint, input_decimals);
    let (pre_out, post_out) = detail.snapshots(&pair.output_mint, output_decimals);

    let input = net_movement(&pre_in, &post_in, &pair.input_mint, ExpectedDirection::Decrease)?;
    let output = net_movement(&pre_out, &post_out, &pair.output_mint, ExpectedDirection::Increase)?;

    if input <= 0.0 || output <= 0.0 {
        return None;
    }
    Some((input, output))
}

/// Un montant exactement égal au minimum passe.
pub fn passes_thresholds(pair: &TrackedPair, input_amount: f64, output_amount: f64) -> bool {
    if let Some(min) = pair.min_input_amount {
        if input_amount < min {
            return false;
        }
    }
    if let Some(min) = pair.min_output_amount {
        if output_amount < min {
            return false;
        }
    }
    true
}

/// Attribue la transaction à un programme surveillé.
///
/// 1. le champ `program_id` des instructions (externes puis internes) ;
/// 2. les lignes de log `Program <id> invoke` ;
/// 3. à défaut, le premier programme surveillé.
pub fn attribute_program(detail: &TransactionDetail, programs: &ProgramSet) -> Pubkey {
    program_from_instructions(detail, programs)
        .or_else(|| program_from_logs(&detail.log_messages, programs))
        .unwrap_or_else(|| programs.primary())
}

fn program_from_instructions(detail: &TransactionDetail, programs: &ProgramSet) -> Option<Pubkey> {
    detail
        .instructions
        .iter()
        .filter_map(|ix| ix.program_id)
        .find(|id| programs.contains(id))
}

fn program_from_logs(logs: &[String], programs: &ProgramSet) -> Option<Pubkey> {
    logs.iter().find_map(|line| {
        let mut parts = line.strip_prefix("Program ")?.split_whitespace();
        let id = parts.next()?;
        if parts.next()? != "invoke" {
            return None;
        }
        Pubkey::from_str(id).ok().filter(|id| programs.contains(id))
    })
}

fn touches_mint(detail: &TransactionDetail, mint: &Pubkey) -> bool {
    detail
        .pre_token_balances
        .iter()
        .chain(detail.post_token_balances.iter())
        .any(|b| &b.mint == mint)
}

fn wall_clock_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
