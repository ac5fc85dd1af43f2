/// Errors surfaced by the client seam.
///
/// `Sdk` carries the backend's own error code verbatim so callers can key
/// remediation hints off it; everything else is plumbing between this process
/// and the helper.
#[derive(Debug, thiserror::Error)]
pub enum XmtpError {
    #[error("{message}")]
    Sdk { code: String, message: String },

    #[error("helper protocol error: {0}")]
    Protocol(String),

    #[error("helper i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for the helper")]
    Timeout,

    #[error("helper exited before responding")]
    Closed,
}

/// Backend error code reported when the counterparty has never registered on
/// the network.
pub const CODE_NOT_ON_NETWORK: &str = "not_on_network";

impl XmtpError {
    /// Stable backend error code, when one was reported.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Sdk { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}
