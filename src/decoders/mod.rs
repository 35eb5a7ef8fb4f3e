// src/decoders/mod.rs

pub mod mint;

pub use mint::{decode_mint, DecodedMint};
