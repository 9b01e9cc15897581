//! Error types for the relay.

/// Errors raised while forwarding a call.
///
/// Over HTTP every variant except the policy ones is reported to the caller
/// as plain text with a `200` status, so only the message matters there.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request body could not be read as a call descriptor.
    #[error("Invalid relay call: {0}")]
    InvalidCall(String),

    /// The descriptor's method is not a valid HTTP method.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The descriptor's URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The target host is not on the allow-list.
    #[error("host not allowed: {0}")]
    HostNotAllowed(String),

    /// The caller did not present the relay token.
    #[error("missing or invalid relay token")]
    Unauthorized,

    /// The remote answered with a non-success status.
    #[error("Request failed with status code {0}")]
    Status(u16),

    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

impl RelayError {
    /// Policy errors are refused outright instead of being relayed as text
    pub fn is_policy(&self) -> bool {
        matches!(self, RelayError::HostNotAllowed(_) | RelayError::Unauthorized)
    }
}
