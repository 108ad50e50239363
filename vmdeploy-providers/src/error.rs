use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Rejected credentials. Fatal for the whole run.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A fault raised by the management server (duplicate name, missing
    /// permission, bad spec, ...).
    #[error("{kind}: {message}")]
    Fault { kind: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("session is no longer connected")]
    NotConnected,
}

impl ProviderError {
    pub fn fault(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fault {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, ProviderError::Authentication(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::Transport(format!("connection failed: {e}"))
        } else {
            Self::Transport(format!("HTTP error: {e}"))
        }
    }
}

impl From<quick_xml::Error> for ProviderError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Protocol(format!("XML error: {e}"))
    }
}
