// DANS : src/rpc/mod.rs

// Les implémentations réseau des traits de `subscription::transport`.
pub mod pubsub;
pub mod resilient_client;

pub use pubsub::PubsubLogTransport;
pub use resilient_client::ResilientRpcClient;
