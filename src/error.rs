//! Error types for the certificate lifecycle client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortalError>;

#[derive(Debug, Error)]
pub enum PortalError {
    /// Network failure, non-2xx without a usable error body, or an
    /// undecodable response body.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or missing PEM/base64 input.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Private key not recognized by any supported encoding.
    #[error("Private key should be a PEM or plain PKCS1 or PKCS8; parse error: {0}")]
    KeyParse(String),

    /// The portal answered with a structured error; the detail is verbatim.
    #[error("{0}")]
    Issuance(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    OperationFailed(String),

    #[error("PKCS#12 packaging failed: {0}")]
    Packaging(String),

    #[error("CSR generation failed: {0}")]
    CsrGeneration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for PortalError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("Request to developer portal timed out: {e}"))
        } else if e.is_connect() {
            Self::Transport(format!(
                "Could not connect to developer portal. Check network/firewall settings: {e}"
            ))
        } else {
            Self::Transport(format!("Network error: {e}"))
        }
    }
}

impl PortalError {
    /// True for errors that carry a detail string supplied by the portal.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Issuance(_))
    }
}
