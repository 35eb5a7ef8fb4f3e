// DANS : src/config.rs

use crate::error::{Result, SwapWatchError};
use crate::state::dedup::DEFAULT_DEDUP_CAPACITY;
use crate::subscription::manager::MonitorOptions;
use crate::swaps::TrackedPair;
use crate::communication::DEFAULT_EVENT_CAPACITY;
use serde::Deserialize;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::{str::FromStr, time::Duration};

/// Configuration brute, lue depuis l'environnement (et `.env`).
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub solana_rpc_url: String,
    pub solana_ws_url: Option<String>,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    /// Liste de program ids séparés par des virgules.
    pub program_ids: String,
    pub input_mint: String,
    pub output_mint: String,
    pub min_input_amount: Option<f64>,
    pub min_output_amount: Option<f64>,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_rpc_max_retries")]
    pub rpc_max_retries: u8,
    #[serde(default = "default_rpc_retry_delay_ms")]
    pub rpc_retry_delay_ms: u64,
    pub metrics_port: Option<u16>,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_rpc_max_retries() -> u8 {
    3
}

fn default_rpc_retry_delay_ms() -> u64 {
    250
}

/// Les réglages validés et typés dont le binaire a besoin pour câbler le moniteur.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub rpc_url: String,
    pub ws_url: String,
    pub commitment: CommitmentConfig,
    pub program_ids: Vec<Pubkey>,
    pub dedup_capacity: usize,
    pub fetch_timeout: Duration,
    pub rpc_max_retries: u8,
    pub rpc_retry_delay_ms: u64,
    pub metrics_port: Option<u16>,
}

impl MonitorSettings {
    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            commitment: self.commitment,
            dedup_capacity: self.dedup_capacity,
            fetch_timeout: self.fetch_timeout,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| SwapWatchError::Config(e.to_string()))
    }

    pub fn monitor_settings(&self) -> Result<MonitorSettings> {
        let program_ids = parse_program_ids(&self.program_ids)?;
        if self.dedup_capacity == 0 {
            return Err(SwapWatchError::Config("DEDUP_CAPACITY doit être > 0".to_string()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(SwapWatchError::Config("FETCH_TIMEOUT_MS doit être > 0".to_string()));
        }

        Ok(MonitorSettings {
            rpc_url: self.solana_rpc_url.clone(),
            ws_url: match &self.solana_ws_url {
                Some(url) => url.clone(),
                None => derive_ws_url(&self.solana_rpc_url)?,
            },
            commitment: parse_commitment(&self.commitment)?,
            program_ids,
            dedup_capacity: self.dedup_capacity,
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            rpc_max_retries: self.rpc_max_retries,
            rpc_retry_delay_ms: self.rpc_retry_delay_ms,
            metrics_port: self.metrics_port,
        })
    }

    pub fn tracked_pair(&self) -> Result<TrackedPair> {
        let input_mint = parse_pubkey("INPUT_MINT", &self.input_mint)?;
        let output_mint = parse_pubkey("OUTPUT_MINT", &self.output_mint)?;
        if input_mint == output_mint {
            return Err(SwapWatchError::Config(
                "INPUT_MINT et OUTPUT_MINT doivent être différents".to_string(),
            ));
        }

        let mut pair = TrackedPair::new(input_mint, output_mint);
        if let Some(min) = self.min_input_amount {
            pair = pair.with_min_input(check_threshold("MIN_INPUT_AMOUNT", min)?);
        }
        if let Some(min) = self.min_output_amount {
            pair = pair.with_min_output(check_threshold("MIN_OUTPUT_AMOUNT", min)?);
        }
        Ok(pair)
    }
}

fn parse_pubkey(name: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|e| SwapWatchError::Config(format!("{name} invalide '{value}': {e}")))
}

fn parse_program_ids(raw: &str) -> Result<Vec<Pubkey>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_pubkey("PROGRAM_IDS", s))
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(SwapWatchError::Config(
            "PROGRAM_IDS doit contenir au moins un program id".to_string(),
        ));
    }
    Ok(ids)
}

fn parse_commitment(raw: &str) -> Result<CommitmentConfig> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => Err(SwapWatchError::Config(format!(
            "COMMITMENT inconnu '{other}' (processed, confirmed ou finalized)"
        ))),
    }
}

fn check_threshold(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SwapWatchError::Config(format!("{name} doit être un nombre positif, reçu {value}")))
    }
}

fn derive_ws_url(rpc_url: &str) -> Result<String> {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else {
        Err(SwapWatchError::Config(format!(
            "impossible de déduire SOLANA_WS_URL depuis '{rpc_url}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            solana_rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            solana_ws_url: None,
            commitment: default_commitment(),
            program_ids: format!("{}, {}", Pubkey::new_unique(), Pubkey::new_unique()),
            input_mint: Pubkey::new_unique().to_string(),
            output_mint: Pubkey::new_unique().to_string(),
            min_input_amount: None,
            min_output_amount: None,
            dedup_capacity: default_dedup_capacity(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            rpc_max_retries: default_rpc_max_retries(),
            rpc_retry_delay_ms: default_rpc_retry_delay_ms(),
            metrics_port: None,
        }
    }

    #[test]
    fn deserializes_from_env_pairs_with_defaults() {
        let program = Pubkey::new_unique();
        let vars = vec![
            ("SOLANA_RPC_URL".to_string(), "http://127.0.0.1:8899".to_string()),
            ("PROGRAM_IDS".to_string(), program.to_string()),
            ("INPUT_MINT".to_string(), Pubkey::new_unique().to_string()),
            ("OUTPUT_MINT".to_string(), Pubkey::new_unique().to_string()),
            ("MIN_INPUT_AMOUNT".to_string(), "50".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.commitment, "confirmed");
        assert_eq!(config.dedup_capacity, DEFAULT_DEDUP_CAPACITY);
        assert_eq!(config.min_input_amount, Some(50.0));

        let settings = config.monitor_settings().unwrap();
        assert_eq!(settings.ws_url, "ws://127.0.0.1:8899");
        assert_eq!(settings.program_ids, vec![program]);
        assert_eq!(settings.commitment, CommitmentConfig::confirmed());
        assert_eq!(settings.fetch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn ws_url_is_derived_from_https() {
        let settings = base_config().monitor_settings().unwrap();
        assert_eq!(settings.ws_url, "wss://api.mainnet-beta.solana.com");
        assert_eq!(settings.program_ids.len(), 2);
    }

    #[test]
    fn empty_program_list_is_rejected() {
        let mut config = base_config();
        config.program_ids = " , ".to_string();
        assert!(matches!(config.monitor_settings(), Err(SwapWatchError::Config(_))));
    }

    #[test]
    fn malformed_program_id_is_rejected() {
        let mut config = base_config();
        config.program_ids = "pas-une-pubkey".to_string();
        assert!(matches!(config.monitor_settings(), Err(SwapWatchError::Config(_))));
    }

    #[test]
    fn unknown_commitment_is_rejected() {
        let mut config = base_config();
        config.commitment = "eventually".to_string();
        assert!(config.monitor_settings().is_err());
    }

    #[test]
    fn identical_mints_are_rejected() {
        let mut config = base_config();
        config.output_mint = config.input_mint.clone();
        assert!(matches!(config.tracked_pair(), Err(SwapWatchError::Config(_))));
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let mut config = base_config();
        config.min_output_amount = Some(-1.0);
        assert!(config.tracked_pair().is_err());
    }

    #[test]
    fn tracked_pair_carries_thresholds() {
        let mut config = base_config();
        config.min_input_amount = Some(50.0);
        let pair = config.tracked_pair().unwrap();
        assert_eq!(pair.min_input_amount, Some(50.0));
        assert_eq!(pair.min_output_amount, None);
        assert_eq!(pair.input_mint.to_string(), config.input_mint);
    }
}
