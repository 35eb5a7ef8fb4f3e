// DANS : src/data_pipeline/transaction.rs

use crate::error::{Result, SwapWatchError};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta,
    EncodedTransaction, UiInstruction, UiMessage, UiParsedInstruction, UiTransactionTokenBalance,
};
use std::str::FromStr;

/// Identité d'un détenteur dans les snapshots de soldes d'une transaction.
/// Si le propriétaire n'est pas enregistré, on retombe sur l'index positionnel du compte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Holder {
    Owner(Pubkey),
    AccountIndex(u8),
}

/// Un solde de token brut (unités de base) tel que rapporté par le méta de la transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub account_index: u8,
    pub owner: Option<Pubkey>,
    pub mint: Pubkey,
    pub amount: u64,
    /// Décimales embarquées dans le solde, si le nœud les a fournies.
    pub decimals: Option<u8>,
}

impl TokenBalance {
    pub fn holder(&self) -> Holder {
        match self.owner {
            Some(owner) => Holder::Owner(owner),
            None => Holder::AccountIndex(self.account_index),
        }
    }

    /// Montant en unités UI, avec les décimales embarquées en priorité.
    pub fn ui_amount(&self, fallback_decimals: u8) -> f64 {
        let decimals = self.decimals.unwrap_or(fallback_decimals);
        self.amount as f64 / 10f64.powi(decimals as i32)
    }
}

/// (détenteur, mint, montant UI) : l'entrée manipulée par le réconciliateur.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshotEntry {
    pub holder: Holder,
    pub mint: Pubkey,
    pub ui_amount: f64,
}

impl BalanceSnapshotEntry {
    pub fn new(holder: Holder, mint: Pubkey, ui_amount: f64) -> Self {
        Self { holder, mint, ui_amount }
    }
}

/// Une instruction invoquée (externe ou interne). Le program id est absent
/// quand il n'a pas pu être résolu depuis les clés de compte.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionRef {
    pub program_id: Option<Pubkey>,
}

/// Le détail complet d'une transaction, tel que consommé par l'extracteur.
#[derive(Debug, Clone, Default)]
pub struct TransactionDetail {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    pub instructions: Vec<InstructionRef>,
    pub log_messages: Vec<String>,
}

impl TransactionDetail {
    /// Convertit la réponse `getTransaction` (encodage jsonParsed ou json).
    pub fn from_encoded(
        signature: Signature,
        tx: &EncodedConfirmedTransactionWithStatusMeta,
    ) -> Result<Self> {
        let meta = tx.transaction.meta.as_ref();

        let loaded_keys: Vec<String> = meta
            .and_then(|m| present(&m.loaded_addresses))
            .map(|loaded| {
                loaded
                    .writable
                    .iter()
                    .chain(loaded.readonly.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut account_keys: Vec<Option<Pubkey>> = Vec::new();
        let mut ui_instructions: Vec<&UiInstruction> = Vec::new();
        let mut compiled_outer: Vec<Option<Pubkey>> = Vec::new();

        if let EncodedTransaction::Json(ui_tx) = &tx.transaction.transaction {
            match &ui_tx.message {
                UiMessage::Parsed(message) => {
                    // Les comptes chargés via lookup table sont déjà inclus ici.
                    account_keys = message
                        .account_keys
                        .iter()
                        .map(|a| Pubkey::from_str(&a.pubkey).ok())
                        .collect();
                    ui_instructions.extend(message.instructions.iter());
                }
                UiMessage::Raw(message) => {
                    account_keys = message
                        .account_keys
                        .iter()
                        .chain(loaded_keys.iter())
                        .map(|k| Pubkey::from_str(k).ok())
                        .collect();
                    compiled_outer = message
                        .instructions
                        .iter()
                        .map(|ix| key_at(&account_keys, ix.program_id_index))
                        .collect();
                }
            }
        }

        if let Some(inner) = meta.and_then(|m| present(&m.inner_instructions)) {
            for group in inner {
                ui_instructions.extend(group.instructions.iter());
            }
        }

        let mut instructions: Vec<InstructionRef> = compiled_outer
            .into_iter()
            .map(|program_id| InstructionRef { program_id })
            .collect();
        instructions.extend(ui_instructions.into_iter().map(|ix| InstructionRef {
            program_id: instruction_program_id(ix, &account_keys),
        }));

        let pre_token_balances = match meta.and_then(|m| present(&m.pre_token_balances)) {
            Some(balances) => convert_balances(balances)?,
            None => Vec::new(),
        };
        let post_token_balances = match meta.and_then(|m| present(&m.post_token_balances)) {
            Some(balances) => convert_balances(balances)?,
            None => Vec::new(),
        };

        Ok(Self {
            signature,
            slot: tx.slot,
            block_time: tx.block_time,
            failed: meta.map(|m| m.err.is_some()).unwrap_or(false),
            pre_token_balances,
            post_token_balances,
            instructions,
            log_messages: meta
                .and_then(|m| present(&m.log_messages))
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// Décimales embarquées pour ce mint dans n'importe lequel des soldes.
    pub fn embedded_decimals(&self, mint: &Pubkey) -> Option<u8> {
        self.pre_token_balances
            .iter()
            .chain(self.post_token_balances.iter())
            .filter(|b| &b.mint == mint)
            .find_map(|b| b.decimals)
    }

    /// Snapshots UI (pré, post) restreints à un mint.
    pub fn snapshots(
        &self,
        mint: &Pubkey,
        fallback_decimals: u8,
    ) -> (Vec<BalanceSnapshotEntry>, Vec<BalanceSnapshotEntry>) {
        let scale = |balances: &[TokenBalance]| {
            balances
                .iter()
                .filter(|b| &b.mint == mint)
                .map(|b| BalanceSnapshotEntry::new(b.holder(), b.mint, b.ui_amount(fallback_decimals)))
                .collect::<Vec<_>>()
        };
        (scale(&self.pre_token_balances), scale(&self.post_token_balances))
    }
}

fn present<T>(value: &OptionSerializer<T>) -> Option<&T> {
    match value {
        OptionSerializer::Some(v) => Some(v),
        _ => None,
    }
}

fn key_at(account_keys: &[Option<Pubkey>], index: u8) -> Option<Pubkey> {
    account_keys.get(index as usize).copied().flatten()
}

fn instruction_program_id(ix: &UiInstruction, account_keys: &[Option<Pubkey>]) -> Option<Pubkey> {
    match ix {
        UiInstruction::Compiled(compiled) => key_at(account_keys, compiled.program_id_index),
        UiInstruction::Parsed(UiParsedInstruction::Parsed(parsed)) => {
            Pubkey::from_str(&parsed.program_id).ok()
        }
        UiInstruction::Parsed(UiParsedInstruction::PartiallyDecoded(partial)) => {
            Pubkey::from_str(&partial.program_id).ok()
        }
    }
}

fn convert_balances(balances: &[UiTransactionTokenBalance]) -> Result<Vec<TokenBalance>> {
    balances
        .iter()
        .map(|b| {
            let mint = Pubkey::from_str(&b.mint)
                .map_err(|e| SwapWatchError::Decode(format!("mint invalide '{}': {e}", b.mint)))?;
            let amount = b.ui_token_amount.amount.parse::<u64>().map_err(|e| {
                SwapWatchError::Decode(format!(
                    "montant invalide '{}' pour le compte #{}: {e}",
                    b.ui_token_amount.amount, b.account_index
                ))
            })?;
            Ok(TokenBalance {
                account_index: b.account_index,
                owner: present(&b.owner).and_then(|o| Pubkey::from_str(o).ok()),
                mint,
                amount,
                decimals: Some(b.ui_token_amount.decimals),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(value: serde_json::Value) -> EncodedConfirmedTransactionWithStatusMeta {
        serde_json::from_value(value).expect("fixture getTransaction valide")
    }

    fn token_balance(index: u8, mint: &Pubkey, owner: &Pubkey, amount: &str, decimals: u8) -> serde_json::Value {
        json!({
            "accountIndex": index,
            "mint": mint.to_string(),
            "owner": owner.to_string(),
            "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
            "uiTokenAmount": {
                "uiAmount": null,
                "decimals": decimals,
                "amount": amount,
                "uiAmountString": "0"
            }
        })
    }

    #[test]
    fn converts_parsed_transaction_balances_and_programs() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let inner_program = Pubkey::new_unique();

        let tx = encoded(json!({
            "slot": 321,
            "blockTime": 1_700_000_123,
            "transaction": {
                "signatures": [Signature::default().to_string()],
                "message": {
                    "accountKeys": [
                        { "pubkey": owner.to_string(), "writable": true, "signer": true, "source": "transaction" },
                        { "pubkey": program.to_string(), "writable": false, "signer": false, "source": "transaction" }
                    ],
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": [
                        { "programId": program.to_string(), "accounts": [], "data": "", "stackHeight": null }
                    ]
                }
            },
            "meta": {
                "err": null,
                "status": { "Ok": null },
                "fee": 5000,
                "preBalances": [0, 0],
                "postBalances": [0, 0],
                "innerInstructions": [
                    { "index": 0, "instructions": [
                        { "programId": inner_program.to_string(), "accounts": [], "data": "", "stackHeight": 2 }
                    ]}
                ],
                "logMessages": [format!("Program {program} invoke [1]")],
                "preTokenBalances": [token_balance(2, &mint, &owner, "100000000", 6)],
                "postTokenBalances": [token_balance(2, &mint, &owner, "40000000", 6)],
                "rewards": []
            }
        }));

        let detail = TransactionDetail::from_encoded(Signature::default(), &tx).unwrap();

        assert_eq!(detail.slot, 321);
        assert_eq!(detail.block_time, Some(1_700_000_123));
        assert!(!detail.failed);
        assert_eq!(detail.instructions.len(), 2);
        assert_eq!(detail.instructions[0].program_id, Some(program));
        assert_eq!(detail.instructions[1].program_id, Some(inner_program));
        assert_eq!(detail.log_messages.len(), 1);

        let (pre, post) = detail.snapshots(&mint, 0);
        assert_eq!(pre, vec![BalanceSnapshotEntry::new(Holder::Owner(owner), mint, 100.0)]);
        assert_eq!(post, vec![BalanceSnapshotEntry::new(Holder::Owner(owner), mint, 40.0)]);
        assert_eq!(detail.embedded_decimals(&mint), Some(6));
    }

    #[test]
    fn holder_falls_back_to_account_index() {
        let balance = TokenBalance {
            account_index: 7,
            owner: None,
            mint: Pubkey::new_unique(),
            amount: 1_500,
            decimals: None,
        };
        assert_eq!(balance.holder(), Holder::AccountIndex(7));
        // Sans décimales embarquées, on utilise celles du résolveur.
        assert_eq!(balance.ui_amount(3), 1.5);
    }

    #[test]
    fn rejects_malformed_amount() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let tx = encoded(json!({
            "slot": 1,
            "blockTime": null,
            "transaction": {
                "signatures": [Signature::default().to_string()],
                "message": {
                    "accountKeys": [],
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": []
                }
            },
            "meta": {
                "err": null,
                "status": { "Ok": null },
                "fee": 0,
                "preBalances": [],
                "postBalances": [],
                "innerInstructions": [],
                "logMessages": [],
                "preTokenBalances": [token_balance(0, &mint, &owner, "abc", 6)],
                "postTokenBalances": [],
                "rewards": []
            }
        }));

        let err = TransactionDetail::from_encoded(Signature::default(), &tx).unwrap_err();
        assert!(matches!(err, SwapWatchError::Decode(_)));
    }
}
