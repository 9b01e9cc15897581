//! Where a script's `http(...)` call goes.

use coderun_relay::{Forwarder, RelayCall, RelayClient, RelayError};

/// Route for outbound calls made by scripts.
///
/// Both routes report a failed remote call the same way: the message text
/// comes back in place of the body. Only policy refusals (token, allow-list)
/// and failures to reach the relay itself are errors.
#[derive(Debug, Clone)]
pub enum HttpRoute {
    /// Perform the call in-process
    Direct(Forwarder),
    /// Hand the call to a running relay
    Relay(RelayClient),
}

impl HttpRoute {
    /// Response body, or the failure message, as text
    pub async fn call(&self, call: &RelayCall) -> Result<String, RelayError> {
        match self {
            HttpRoute::Direct(forwarder) => match forwarder.forward(call).await {
                Ok(forwarded) => Ok(forwarded.text()),
                Err(e) if e.is_policy() => Err(e),
                Err(e) => {
                    tracing::debug!(url = %call.url, "direct call failed: {e}");
                    Ok(e.to_string())
                }
            },
            HttpRoute::Relay(client) => client.call(call).await,
        }
    }
}
