//! Outbound HTTP request component.
//!
//! Demonstrates the retry/deferred-action contract: attempt state lives in
//! the execution's metadata, retries are scheduled as `retryRequest`
//! action calls, and the scheduler delivers them back through
//! `handle_action`, which short-circuits once the execution is finished.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::time::Duration;

use super::{ActionSpec, Component, ComponentError};
use crate::execution::context::{ActionContext, ExecutionContext};
use crate::schema::{Field, FieldType, SelectOption, ValidationRule};
use crate::types::{DEFAULT_CHANNEL, ExecutionResult};

/// Emitted on the default channel when a request completes successfully.
pub const EVENT_REQUEST_FINISHED: &str = "http.request.finished";

/// Action name used for scheduled retries.
pub const ACTION_RETRY_REQUEST: &str = "retryRequest";

/// Per-attempt timeout ceiling for the exponential strategy.
const MAX_TIMEOUT: Duration = Duration::from_secs(120);

const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct HttpComponent;

impl HttpComponent {
    fn cfg_str<'a>(cfg: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
        cfg.get(key).and_then(Value::as_str)
    }

    fn cfg_u64(cfg: &Map<String, Value>, key: &str, default: u64) -> u64 {
        cfg.get(key)
            .and_then(Value::as_f64)
            .map(|n| n.max(0.0) as u64)
            .unwrap_or(default)
    }

    fn attempt_from_metadata(metadata: &Value) -> u64 {
        metadata
            .get("attempt")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    async fn perform_attempt(
        &self,
        ctx: &mut ExecutionContext,
        attempt: u64,
    ) -> Result<(), ComponentError> {
        let cfg = ctx.configuration().clone();
        let url = Self::cfg_str(&cfg, "url")
            .ok_or_else(|| ComponentError::Configuration("url is required".into()))?
            .to_string();
        let method = Self::cfg_str(&cfg, "method").unwrap_or("GET");
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| ComponentError::Configuration(format!("invalid method: {method}")))?;
        let retries = Self::cfg_u64(&cfg, "retries", 0);
        let timeout = attempt_timeout(&cfg, attempt);

        let mut request = ctx.http().request(method, &url);
        if let Some(headers) = cfg.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }
        if let Some(body) = Self::cfg_str(&cfg, "body") {
            request = request.body(body.to_string());
        }

        let outcome = match tokio::time::timeout(timeout, request.send()).await {
            Err(_) => Err(format!("request timed out after {timeout:?}")),
            Ok(Err(e)) => Err(format!("request failed: {e}")),
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                let success_codes = Self::cfg_str(&cfg, "successCodes").unwrap_or_default();
                if matches_success_code(status, success_codes) {
                    let body = response.text().await.unwrap_or_default();
                    Ok((status, body))
                } else {
                    Err(format!("unexpected status code: {status}"))
                }
            }
        };

        match outcome {
            Ok((status, body)) => {
                ctx.set_metadata(json!({
                    "totalRetries": attempt,
                    "finalStatus": status,
                }));
                ctx.emit(
                    DEFAULT_CHANNEL,
                    EVENT_REQUEST_FINISHED,
                    vec![json!({ "status": status, "body": body })],
                );
                Ok(())
            }
            Err(message) if attempt < retries => {
                ctx.set_metadata(json!({ "attempt": attempt + 1, "lastError": message }));
                ctx.schedule_action_call(ACTION_RETRY_REQUEST, json!({}), RETRY_DELAY)?;
                Ok(())
            }
            Err(message) => {
                ctx.set_metadata(json!({ "totalRetries": attempt, "lastError": message }));
                ctx.fail(ExecutionResult::Error, message);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Component for HttpComponent {
    fn name(&self) -> &str {
        "http"
    }

    fn label(&self) -> &str {
        "HTTP Request"
    }

    fn description(&self) -> &str {
        "Issues an outbound HTTP request with per-attempt timeouts and self-managed retries."
    }

    fn icon(&self) -> &str {
        "globe"
    }

    fn color(&self) -> &str {
        "blue"
    }

    fn configuration(&self) -> Vec<Field> {
        let methods = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];
        vec![
            {
                let mut f = Field::new("method", "Method", FieldType::Select)
                    .with_default(json!("GET"));
                f.type_options.options = methods
                    .iter()
                    .map(|m| SelectOption {
                        value: (*m).to_string(),
                        label: (*m).to_string(),
                    })
                    .collect();
                f
            },
            Field::new("url", "URL", FieldType::String)
                .required()
                .with_description("Request URL; expressions are allowed."),
            Field::new("headers", "Headers", FieldType::Object).with_default(json!({})),
            Field::new("body", "Body", FieldType::Text).visible_when(
                "method",
                vec![json!("POST"), json!("PUT"), json!("PATCH")],
            ),
            {
                let mut f = Field::new("timeoutStrategy", "Timeout strategy", FieldType::Select)
                    .with_default(json!("fixed"));
                f.type_options.options = vec![
                    SelectOption {
                        value: "fixed".into(),
                        label: "Fixed".into(),
                    },
                    SelectOption {
                        value: "exponential".into(),
                        label: "Exponential".into(),
                    },
                ];
                f
            },
            Field::new("timeoutSeconds", "Timeout (seconds)", FieldType::Number)
                .with_default(json!(30))
                .with_rule(ValidationRule::Min {
                    min: 1.0,
                    message: "timeout must be at least 1 second".into(),
                }),
            Field::new("retries", "Retries", FieldType::Number).with_default(json!(0)),
            Field::new("successCodes", "Success codes", FieldType::String).with_description(
                "Comma-separated codes; \"2xx\" matches the block. Empty means 2xx.",
            ),
        ]
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![ActionSpec::new(ACTION_RETRY_REQUEST, "Retry request")]
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ComponentError> {
        self.perform_attempt(ctx, 0).await
    }

    async fn handle_action(&self, ctx: &mut ActionContext) -> Result<(), ComponentError> {
        if ctx.is_finished() {
            return Ok(());
        }
        if ctx.action_name != ACTION_RETRY_REQUEST {
            return Ok(());
        }
        let attempt = Self::attempt_from_metadata(ctx.metadata());
        self.perform_attempt(ctx, attempt).await
    }
}

/// Per-attempt timeout under the configured strategy.
///
/// `fixed`: every attempt uses `timeoutSeconds`. `exponential`: attempt
/// `n` uses `timeoutSeconds · 2ⁿ`, capped at 120 s.
fn attempt_timeout(cfg: &Map<String, Value>, attempt: u64) -> Duration {
    let base = HttpComponent::cfg_u64(cfg, "timeoutSeconds", 30).max(1);
    match HttpComponent::cfg_str(cfg, "timeoutStrategy").unwrap_or("fixed") {
        "exponential" => {
            let factor = 2u64.saturating_pow(attempt.min(32) as u32);
            Duration::from_secs(base.saturating_mul(factor)).min(MAX_TIMEOUT)
        }
        _ => Duration::from_secs(base),
    }
}

/// Match a status code against a comma-separated success-code list.
///
/// Items shaped `Nxx` match the whole hundreds block, bare integers match
/// exactly, and an empty list means `2xx`.
#[must_use]
pub fn matches_success_code(status: u16, codes: &str) -> bool {
    if codes.trim().is_empty() {
        return (200..=299).contains(&status);
    }
    codes.split(',').map(str::trim).any(|item| {
        if let Some(prefix) = item.strip_suffix("xx") {
            if prefix.len() == 1 && prefix.chars().all(|c| c.is_ascii_digit()) {
                let block = prefix.parse::<u16>().unwrap_or(0) * 100;
                return (block..block + 100).contains(&status);
            }
            return false;
        }
        item.parse::<u16>().map(|code| code == status).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_code_matching() {
        assert!(matches_success_code(204, "2xx"));
        assert!(!matches_success_code(301, "2xx"));
        assert!(matches_success_code(418, "200, 418"));
        assert!(!matches_success_code(500, ""));
        assert!(matches_success_code(200, ""));
        assert!(!matches_success_code(200, "5xx"));
        assert!(!matches_success_code(200, "xx"));
    }

    #[test]
    fn timeout_strategies() {
        let mut cfg = Map::new();
        cfg.insert("timeoutSeconds".into(), json!(2.0));
        cfg.insert("timeoutStrategy".into(), json!("fixed"));
        assert_eq!(attempt_timeout(&cfg, 5), Duration::from_secs(2));

        cfg.insert("timeoutStrategy".into(), json!("exponential"));
        assert_eq!(attempt_timeout(&cfg, 0), Duration::from_secs(2));
        assert_eq!(attempt_timeout(&cfg, 2), Duration::from_secs(8));
        assert_eq!(attempt_timeout(&cfg, 10), MAX_TIMEOUT);
    }
}
