// src/lib.rs

// On déclare tous nos modules principaux pour les rendre publics et
// utilisables par le binaire (swap_watcher.rs) et les tests d'intégration.
pub mod communication;
pub mod config;
pub mod data_pipeline;
pub mod decoders;
pub mod error;
pub mod filtering;
pub mod monitoring;
pub mod rpc;
pub mod state;
pub mod subscription;
pub mod swaps;

pub use communication::{EventBus, MonitorEvent};
pub use error::{Result, SwapWatchError};
pub use subscription::manager::SwapMonitor;
pub use subscription::{MonitorState, MonitorStatus, ProgramSet};
pub use swaps::{SwapEvent, TimestampSource, TrackedPair};
