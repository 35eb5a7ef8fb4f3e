// DANS : src/filtering/mod.rs

// Pré-filtrage bon marché des notifications, avant tout appel RPC.
pub mod classifier;

pub use classifier::may_be_swap;
