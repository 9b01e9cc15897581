//! Performing a [`RelayCall`] against the remote host.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use url::Url;

use crate::call::{RelayCall, value_to_text};
use crate::error::RelayError;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Remote response as handed back to the caller
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl Forwarded {
    /// Body decoded as UTF-8, lossy
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outbound HTTP client plus the host allow-list
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    allowed_hosts: Vec<String>,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coderun-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            allowed_hosts: Vec::new(),
        })
    }

    /// Restrict calls to these hosts; empty allows any
    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = hosts;
        self
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    fn check_host(&self, url: &Url) -> Result<(), RelayError> {
        if self.allowed_hosts.is_empty() {
            return Ok(());
        }
        let host = url.host_str().unwrap_or_default();
        if self
            .allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(host))
        {
            Ok(())
        } else {
            Err(RelayError::HostNotAllowed(host.to_string()))
        }
    }

    /// Perform the call. Non-2xx answers are errors.
    pub async fn forward(&self, call: &RelayCall) -> Result<Forwarded, RelayError> {
        let method = parse_method(call.method())?;
        let url = Url::parse(&call.url).map_err(|e| RelayError::InvalidUrl(e.to_string()))?;
        self.check_host(&url)?;

        tracing::debug!(%method, %url, "forwarding call");

        let mut request = self.client.request(method.clone(), url);
        for (name, value) in call.headers() {
            request = request.header(name, value);
        }

        let data = call.data();
        let bodiless = matches!(method, Method::GET | Method::HEAD) && is_empty(&data);
        if !bodiless {
            let form = call
                .header(CONTENT_TYPE.as_str())
                .is_some_and(|ct| ct.to_ascii_lowercase().starts_with(FORM_URLENCODED));
            request = match (&data, form) {
                (Value::Object(fields), true) => {
                    let pairs: Vec<(&str, String)> = fields
                        .iter()
                        .map(|(k, v)| (k.as_str(), value_to_text(v)))
                        .collect();
                    request.form(&pairs)
                }
                _ => request.json(&data),
            };
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(Forwarded {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

fn parse_method(method: &str) -> Result<Method, RelayError> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| RelayError::InvalidMethod(method.to_string()))
}

fn is_empty(data: &Value) -> bool {
    match data {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forwarder() -> Forwarder {
        Forwarder::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn methods_are_case_insensitive() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert_eq!(parse_method("Get").unwrap(), Method::GET);
        assert!(matches!(
            parse_method("not a method"),
            Err(RelayError::InvalidMethod(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn get_returns_body_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"ok":true}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let call = RelayCall::new(format!("{}/data", server.uri()));
        let out = forwarder().forward(&call).await.unwrap();
        assert_eq!(out.status, 200);
        assert_eq!(out.text(), r#"{"ok":true}"#);
        assert_eq!(out.content_type.as_deref(), Some("application/json"));
    }

    #[test_log::test(tokio::test)]
    async fn post_sends_json_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "q": "hi" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .expect(1)
            .mount(&server)
            .await;

        let call = RelayCall::new(server.uri())
            .with_method("post")
            .with_data(json!({ "q": "hi" }));
        let out = forwarder().forward(&call).await.unwrap();
        assert_eq!(out.text(), "done");
    }

    #[test_log::test(tokio::test)]
    async fn post_form_encodes_when_asked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", FORM_URLENCODED))
            .and(body_string("from=zh&q=hi&to=en"))
            .respond_with(ResponseTemplate::new(200).set_body_string("translated"))
            .expect(1)
            .mount(&server)
            .await;

        let call = RelayCall::new(server.uri())
            .with_method("POST")
            .with_header("Content-Type", FORM_URLENCODED)
            .with_data(json!({ "q": "hi", "from": "zh", "to": "en" }));
        let out = forwarder().forward(&call).await.unwrap();
        assert_eq!(out.text(), "translated");
    }

    #[test_log::test(tokio::test)]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = forwarder()
            .forward(&RelayCall::new(server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status code 404");
    }

    #[test_log::test(tokio::test)]
    async fn unreachable_host_is_an_error() {
        let err = forwarder()
            .forward(&RelayCall::new("http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Request(_)));
        assert!(!err.to_string().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn allow_list_rejects_other_hosts() {
        let forwarder = forwarder().with_allowed_hosts(vec!["api.example.com".into()]);
        let err = forwarder
            .forward(&RelayCall::new("http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::HostNotAllowed(ref h) if h == "127.0.0.1"));
        assert!(err.is_policy());
    }

    #[test_log::test(tokio::test)]
    async fn bad_url_is_an_error() {
        let err = forwarder()
            .forward(&RelayCall::new("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidUrl(_)));
    }
}
