use thiserror::Error;

/// Top-level error type for the `flowgrid-api` crate.
///
/// Covers transport failures, non-2xx responses, and undecodable bodies.
/// `flowgrid-core` maps these into domain-level diagnostics; nothing here
/// is ever fatal to the controller process.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The routing service answered with an unexpected status code.
    #[error("Routing service returned HTTP {status} for {path}")]
    Status { path: String, status: u16 },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error is worth retrying.
    ///
    /// Every failure mode of the routing service is treated as transient:
    /// the service is frequently mid-restart while switches come up, and
    /// a later attempt regularly succeeds where an earlier one failed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Status { .. } | Self::Deserialization { .. } => true,
            Self::InvalidUrl(_) => false,
        }
    }
}
