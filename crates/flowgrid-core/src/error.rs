// ── Core error types ──
//
// Nothing in this crate is fatal to the controller process: every failure
// path either retries, skips-and-defers, or abandons a single task while
// the rest of the system keeps operating. These errors surface on the
// command channel and in logs.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The control loop has stopped; no further commands are accepted.
    #[error("Controller stopped")]
    ControllerStopped,

    /// A remove was requested for a pair that is not in the allowlist.
    #[error("Allowed pair not found: {src} -> {dst}")]
    PairNotFound { src: String, dst: String },

    /// A control request carried malformed input; rejected locally.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Routing service interaction failed after retries.
    #[error("Routing service error: {0}")]
    Api(#[from] flowgrid_api::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
