//! Generic paginated HTTP gateway.
//!
//! Executes exactly one REST call against the tracking service and
//! classifies the outcome into a [`CallResult`]. The gateway boundary never
//! lets an error escape: network failures, non-2xx statuses, and body-parse
//! problems all come back as tagged results. Absence of structure is not a
//! failure — a body that is not JSON degrades to a raw-text success.
//!
//! Pagination is surfaced, never followed: when the response body carries a
//! continuation link, the `$skip` value is extracted, a resumption hint is
//! appended to the returned text, and an informational notification carries
//! the same value. The caller decides whether to resupply it.

use base64::Engine;
use serde_json::Value;

use crate::config::Config;
use crate::models::CallResult;
use crate::notify::Notifier;

/// HTTP methods the tracking API is called with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

/// Executes single requests with PAT basic auth and fixed accept headers.
///
/// Cheap to clone via `Arc`; the underlying reqwest client pools
/// connections. No retries, no timeouts beyond reqwest defaults: each call
/// is attempted once.
pub struct Gateway {
    client: reqwest::Client,
    auth_header: String,
}

impl Gateway {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let pat = config.pat()?;
        let token = base64::engine::general_purpose::STANDARD.encode(format!(":{}", pat));
        Ok(Self {
            client: reqwest::Client::new(),
            auth_header: format!("Basic {}", token),
        })
    }

    /// Execute one request and classify the outcome.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        notify: &dyn Notifier,
    ) -> CallResult {
        notify.info(&format!("{} {}", method.as_str(), url));

        let mut request = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Patch => self.client.patch(url),
        }
        .header("Authorization", &self.auth_header)
        .header("Accept", "application/json, text/xml")
        .header("Prefer", "odata.maxpagesize=100");

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let msg = format!("request failed: {}", err);
                notify.error(&msg);
                return CallResult::fail(msg);
            }
        };

        let status = response.status();

        if status.as_u16() == 204 {
            return CallResult::ok("No content.", None);
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(err) => {
                let msg = format!("failed to read response body: {}", err);
                notify.error(&msg);
                return CallResult::fail(msg);
            }
        };

        if !status.is_success() {
            // Pretty-print structured error bodies; fall back to raw text.
            let detail = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|v| serde_json::to_string_pretty(&v).ok())
                .unwrap_or(raw);
            let msg = format!("HTTP {}: {}", status.as_u16(), detail);
            notify.error(&msg);
            return CallResult::fail(msg);
        }

        if content_type.starts_with("text/plain") || content_type.starts_with("application/xml") {
            return CallResult::ok(raw, None);
        }

        let json: Value = match serde_json::from_str(&raw) {
            Ok(json) => json,
            // Degraded success: the call worked, the body just is not JSON.
            Err(_) => return CallResult::ok(raw, None),
        };

        let mut text = serde_json::to_string_pretty(&json).unwrap_or(raw);

        if let Some(skip) = continuation_skip(&json) {
            text.push_str(&format!(
                "\nMore results available. Pass skip={} to continue.",
                skip
            ));
            notify.info(&format!("continuation available at skip={}", skip));
        }

        CallResult::ok(text, Some(json))
    }
}

/// Extract the `$skip` value from a continuation link embedded in the
/// response body, if any.
pub fn continuation_skip(body: &Value) -> Option<String> {
    let link = body
        .get("@odata.nextLink")
        .or_else(|| body.get("nextLink"))?
        .as_str()?;
    skip_param(link)
}

/// Pull the `$skip` query parameter out of a URL. Both the literal and the
/// percent-encoded spellings occur in the wild.
fn skip_param(url: &str) -> Option<String> {
    for marker in ["$skip=", "%24skip="] {
        if let Some(pos) = url.find(marker) {
            let rest = &url[pos + marker.len()..];
            let value: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_param_literal_and_encoded() {
        assert_eq!(
            skip_param("https://x/api?a=1&$skip=50&b=2"),
            Some("50".to_string())
        );
        assert_eq!(
            skip_param("https://x/api?%24skip=200"),
            Some("200".to_string())
        );
        assert_eq!(skip_param("https://x/api?a=1"), None);
        assert_eq!(skip_param("https://x/api?$skip="), None);
    }

    #[test]
    fn continuation_skip_reads_both_keys() {
        let body = serde_json::json!({ "@odata.nextLink": "https://x/api?$skip=50" });
        assert_eq!(continuation_skip(&body), Some("50".to_string()));

        let body = serde_json::json!({ "nextLink": "https://x/api?$skip=75" });
        assert_eq!(continuation_skip(&body), Some("75".to_string()));

        let body = serde_json::json!({ "value": [] });
        assert_eq!(continuation_skip(&body), None);
    }
}
