//! Error type for the peripheral bus

use emu_core::state::StateError;
use thiserror::Error;

/// Peripheral bus errors
///
/// Normal bus traffic never fails; these cover slot management, save state
/// restoring and configuration parsing.
#[derive(Debug, Error)]
pub enum PadError {
    #[error("Invalid controller/memory card slot {0}")]
    InvalidSlot(usize),
    #[error("Invalid port {0}")]
    InvalidPort(usize),
    #[error("Save state error: {0}")]
    State(#[from] StateError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
