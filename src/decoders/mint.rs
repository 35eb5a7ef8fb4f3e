// src/decoders/mint.rs

use crate::error::{Result, SwapWatchError};
use solana_sdk::pubkey::Pubkey;
use spl_token_2022::{extension::StateWithExtensions, state::Mint};

// Contient les informations que nous extrayons d'un compte de mint.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMint {
    pub address: Pubkey,
    pub decimals: u8,
    pub supply: u64,
}

/// Décode les données brutes d'un compte de mint (SPL Token ou Token-2022).
///
/// `StateWithExtensions` lit à la fois les anciens mints (sans extensions)
/// et les nouveaux ; les extensions ne nous intéressent pas ici.
pub fn decode_mint(address: &Pubkey, data: &[u8]) -> Result<DecodedMint> {
    let mint_state = StateWithExtensions::<Mint>::unpack(data)
        .map_err(|e| SwapWatchError::Decode(format!("mint {address} illisible : {e}")))?;

    Ok(DecodedMint {
        address: *address,
        decimals: mint_state.base.decimals,
        supply: mint_state.base.supply,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Un mint SPL de base (82 octets), sans autorité.
    fn raw_mint(supply: u64, decimals: u8) -> Vec<u8> {
        let mut data = vec![0u8; 36]; // mint_authority: COption::None
        data.extend_from_slice(&supply.to_le_bytes());
        data.push(decimals);
        data.push(1); // is_initialized
        data.extend_from_slice(&[0u8; 36]); // freeze_authority: COption::None
        data
    }

    #[test]
    fn decodes_legacy_mint_layout() {
        let address = Pubkey::new_unique();
        let decoded = decode_mint(&address, &raw_mint(1_000_000, 6)).unwrap();

        assert_eq!(decoded, DecodedMint { address, decimals: 6, supply: 1_000_000 });
    }

    #[test]
    fn rejects_truncated_data() {
        let err = decode_mint(&Pubkey::new_unique(), &[0u8; 10]).unwrap_err();
        assert!(matches!(err, SwapWatchError::Decode(_)));
    }

    #[test]
    fn rejects_uninitialized_mint() {
        let mut data = raw_mint(0, 9);
        data[45] = 0;
        assert!(decode_mint(&Pubkey::new_unique(), &data).is_err());
    }
}
