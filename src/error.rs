// DANS : src/error.rs

use thiserror::Error;

/// Erreurs de la librairie.
///
/// Seules les erreurs `Config` sont fatales (à la construction du moniteur).
/// Toutes les autres restent locales à une signature ou à un abonnement et
/// sont remontées sur le canal d'événements.
#[derive(Debug, Error)]
pub enum SwapWatchError {
    /// Configuration invalide (liste de programmes vide, pubkey mal formée...).
    #[error("Configuration invalide : {0}")]
    Config(String),

    /// Échec d'un appel RPC après épuisement des ré-essais.
    #[error("Erreur RPC : {0}")]
    Rpc(String),

    /// Échec de l'abonnement ou du flux WebSocket.
    #[error("Erreur de transport : {0}")]
    Transport(String),

    /// Un appel n'a pas répondu avant son échéance.
    #[error("Délai dépassé après {0} ms : {1}")]
    Timeout(u64, String),

    /// Données on-chain illisibles (mint, transaction).
    #[error("Erreur de décodage : {0}")]
    Decode(String),

    /// Échec de libération d'un abonnement pendant `unsubscribe_all`.
    #[error("Échec de la libération de l'abonnement {program_id} : {message}")]
    Teardown { program_id: String, message: String },
}

pub type Result<T> = std::result::Result<T, SwapWatchError>;

impl From<solana_client::client_error::ClientError> for SwapWatchError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        SwapWatchError::Rpc(err.to_string())
    }
}

impl From<solana_client::nonblocking::pubsub_client::PubsubClientError> for SwapWatchError {
    fn from(err: solana_client::nonblocking::pubsub_client::PubsubClientError) -> Self {
        SwapWatchError::Transport(err.to_string())
    }
}
