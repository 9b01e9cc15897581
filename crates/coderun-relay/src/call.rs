//! The relay call descriptor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RelayError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Description of an outbound HTTP call.
///
/// Every field but `url` is optional on the wire; `null` and missing are
/// treated the same.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Value>>,
}

impl RelayCall {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), Value::String(value.into()));
        self
    }

    /// Decode a request body sent to the relay.
    ///
    /// Form-encoded bodies are accepted as well as JSON. Anything without a
    /// form content-type is read as JSON.
    pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Self, RelayError> {
        let is_form = content_type.is_some_and(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        });
        if is_form {
            Self::from_form(body)
        } else {
            serde_json::from_slice(body).map_err(|e| RelayError::InvalidCall(e.to_string()))
        }
    }

    /// Read a form body. `data[key]` and `headers[key]` fill the nested maps.
    fn from_form(body: &[u8]) -> Result<Self, RelayError> {
        let mut method = None;
        let mut url = None;
        let mut data = Map::new();
        let mut headers = BTreeMap::new();

        for (key, value) in url::form_urlencoded::parse(body) {
            let value = value.into_owned();
            match nested_key(&key) {
                Some(("data", inner)) => {
                    data.insert(inner.to_string(), Value::String(value));
                }
                Some(("headers", inner)) => {
                    headers.insert(inner.to_string(), Value::String(value));
                }
                _ => match key.as_ref() {
                    "method" => method = Some(value),
                    "url" => url = Some(value),
                    other => tracing::debug!(field = other, "ignoring form field"),
                },
            }
        }

        let url = url.ok_or_else(|| RelayError::InvalidCall("missing field `url`".to_string()))?;
        Ok(Self {
            method,
            url,
            data: (!data.is_empty()).then_some(Value::Object(data)),
            headers: (!headers.is_empty()).then_some(headers),
        })
    }

    /// Method to use, `get` when absent or empty
    pub fn method(&self) -> &str {
        match self.method.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => "get",
        }
    }

    /// Request payload, `{}` when absent
    pub fn data(&self) -> Value {
        match &self.data {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(v) => v.clone(),
        }
    }

    /// Headers with values flattened to strings
    pub fn headers(&self) -> impl Iterator<Item = (&str, String)> {
        self.headers
            .iter()
            .flatten()
            .map(|(name, value)| (name.as_str(), value_to_text(value)))
    }

    /// Value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// Split `outer[inner]` into its two parts
fn nested_key(key: &str) -> Option<(&str, &str)> {
    let (outer, rest) = key.split_once('[')?;
    let inner = rest.strip_suffix(']')?;
    Some((outer, inner))
}

/// Strings pass through raw; everything else as JSON text
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_to_missing_and_null_fields() {
        let call: RelayCall =
            serde_json::from_value(json!({ "url": "http://x", "data": null, "method": "" }))
                .unwrap();
        assert_eq!(call.method(), "get");
        assert_eq!(call.data(), json!({}));
        assert_eq!(call.headers().count(), 0);
    }

    #[test]
    fn url_is_required() {
        let result: Result<RelayCall, _> = serde_json::from_value(json!({ "method": "get" }));
        assert!(result.is_err());
    }

    #[test]
    fn decodes_json_and_form_bodies() {
        let call = RelayCall::decode(
            Some("application/json"),
            br#"{"url":"http://x","method":"post"}"#,
        )
        .unwrap();
        assert_eq!(call.method(), "post");

        // Missing content-type is read as JSON
        let call = RelayCall::decode(None, br#"{"url":"http://x"}"#).unwrap();
        assert_eq!(call.url, "http://x");

        let call = RelayCall::decode(
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            b"method=post&url=http%3A%2F%2Fx%2Fq&data%5Bq%5D=hi&headers[X-Key]=k",
        )
        .unwrap();
        assert_eq!(call.method(), "post");
        assert_eq!(call.url, "http://x/q");
        assert_eq!(call.data(), json!({ "q": "hi" }));
        assert_eq!(call.header("x-key").as_deref(), Some("k"));
    }

    #[test]
    fn undecodable_bodies_are_invalid_calls() {
        let err = RelayCall::decode(None, br#"{"method":"get"}"#).unwrap_err();
        assert!(matches!(err, RelayError::InvalidCall(_)));
        assert!(err.to_string().contains("url"), "{err}");

        let err = RelayCall::decode(Some("application/x-www-form-urlencoded"), b"method=get")
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid relay call: missing field `url`");

        assert!(RelayCall::decode(None, b"").is_err());
        assert!(RelayCall::decode(Some("text/plain"), b"url=http://x").is_err());
    }

    #[test]
    fn header_values_are_flattened() {
        let call: RelayCall = serde_json::from_value(json!({
            "url": "http://x",
            "headers": { "X-Count": 3, "Content-Type": "text/plain" }
        }))
        .unwrap();
        assert_eq!(call.header("content-type").as_deref(), Some("text/plain"));
        assert_eq!(call.header("x-count").as_deref(), Some("3"));
        assert_eq!(call.header("accept"), None);
    }
}
