use std::time::Duration;

use log::{debug, error, info, warn};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use thiserror::Error;

use super::events::VERSION;
use super::retry::{SleepFn, retry_with_exponential_backoff, thread_sleep};

const BODY_PREVIEW_CHARS: usize = 200;

/// Longest per-attempt timeout applied to a delivery.
pub const MAX_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Why a single delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("HTTP {status}: {detail}")]
    Embedded { status: StatusCode, detail: String },
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Blocking webhook sender with bounded retries and exponential backoff.
pub struct WebhookClient {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
    sleep: SleepFn,
}

impl WebhookClient {
    pub fn new(timeout: Duration, retry_attempts: u32, retry_delay: Duration) -> Self {
        let timeout = clamp_timeout(timeout);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(format!("cloud-cert-renewer/{VERSION}"))
            .build()
            .unwrap_or_else(|err| {
                warn!("[webhook] failed to build HTTP client: {err}");
                Client::new()
            });
        Self {
            client,
            retry_attempts,
            retry_delay,
            sleep: thread_sleep(),
        }
    }

    /// Replaces the sleep between attempts.
    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    /// POSTs `payload` as JSON. Every failure mode, including exhausted
    /// retries, ends in `false`; nothing is raised to the caller.
    pub fn deliver(&self, url: &str, payload: &Value) -> bool {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(err) => {
                error!("[webhook] failed to serialize payload: {err}");
                return false;
            }
        };
        let target = redact_url(url);
        let total = self.retry_attempts.saturating_add(1);

        let result = retry_with_exponential_backoff(
            &format!("webhook delivery to {target}"),
            self.retry_attempts,
            self.retry_delay,
            &self.sleep,
            |attempt| {
                debug!("[webhook] sending to {target} (attempt {attempt}/{total})");
                self.attempt(url, &body)
            },
        );

        match result {
            Ok(status) => {
                info!("[webhook] delivered: status={}, url={target}", status.as_u16());
                true
            }
            Err(err) => {
                error!(
                    "[webhook] delivery failed after {total} attempt(s): url={target}, last_error={err}"
                );
                false
            }
        }
    }

    fn attempt(&self, url: &str, body: &[u8]) -> Result<StatusCode, DeliveryError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    DeliveryError::Timeout(err.to_string())
                } else {
                    DeliveryError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status,
                body: preview(&text),
            });
        }
        if let Some(detail) = detect_embedded_error(&text) {
            return Err(DeliveryError::Embedded { status, detail });
        }
        Ok(status)
    }
}

/// Compatibility shim for chat-webhook backends that answer HTTP 200 and
/// report failure in the body. Heuristic only; not part of the webhook
/// protocol in general.
///
/// Checked in order on a top-level JSON object:
/// - `errcode` present: anything but numeric zero is an error,
/// - otherwise a truthy `error` field is an error,
/// - otherwise a `status` field other than `"success"` or `"ok"` is an error.
///
/// Bodies that are not JSON objects are treated as success.
pub fn detect_embedded_error(body: &str) -> Option<String> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return None;
    };

    if let Some(errcode) = map.get("errcode") {
        let is_zero = errcode.as_f64().is_some_and(|code| code == 0.0);
        if is_zero {
            return None;
        }
        let errmsg = map
            .get("errmsg")
            .map(render_scalar)
            .unwrap_or_else(|| "Unknown error".to_string());
        return Some(format!("errcode={}, errmsg={errmsg}", render_scalar(errcode)));
    }

    if let Some(err) = map.get("error").filter(|value| is_truthy(value)) {
        return Some(format!("error={}", render_scalar(err)));
    }

    if let Some(status) = map.get("status") {
        let ok = matches!(status.as_str(), Some("success") | Some("ok"));
        if !ok {
            return Some(format!("status={}", render_scalar(status)));
        }
    }

    None
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW_CHARS).collect()
}

fn clamp_timeout(timeout: Duration) -> Duration {
    if timeout > MAX_ATTEMPT_TIMEOUT {
        warn!(
            "[webhook] timeout of {}s exceeds the {}s limit, using the limit",
            timeout.as_secs(),
            MAX_ATTEMPT_TIMEOUT.as_secs()
        );
        return MAX_ATTEMPT_TIMEOUT;
    }
    timeout
}

/// Webhook URLs often carry their access key in the query string.
fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?***"),
        None => url.to_string(),
    }
}
