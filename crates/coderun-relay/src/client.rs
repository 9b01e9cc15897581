//! Client for a running relay.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;

use crate::call::RelayCall;
use crate::error::RelayError;
use crate::server::RELAY_PATH;

/// Sends [`RelayCall`]s to a relay's forwarding endpoint
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl RelayClient {
    /// `base_url` is the relay origin, e.g. `http://127.0.0.1:3000`
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), RELAY_PATH),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Relay `call` and return the response body as text.
    ///
    /// A failed remote call still comes back as text: the relay answers with
    /// the error message in place of the body.
    pub async fn call(&self, call: &RelayCall) -> Result<String, RelayError> {
        let mut request = self.client.post(&self.endpoint).json(call);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = request.send().await?;
        match response.status().as_u16() {
            401 => Err(RelayError::Unauthorized),
            403 => Err(RelayError::HostNotAllowed(response.text().await?)),
            s if !(200..300).contains(&s) => Err(RelayError::Status(s)),
            _ => Ok(response.text().await?),
        }
    }
}
