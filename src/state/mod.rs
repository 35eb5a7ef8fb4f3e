// DANS : src/state/mod.rs

// L'état local d'une instance de moniteur. Rien ici n'est global.
pub mod decimals_cache;
pub mod dedup;
