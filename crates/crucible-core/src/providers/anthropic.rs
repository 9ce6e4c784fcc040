use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use super::retry::{with_retry, RetryPolicy};
use super::{classify_status, classify_transport, ModelAdapter, ProviderError};
use crate::model::{GenParams, GenerationResult, ToolCallRecord, ToolTrace};
use crate::tools;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const API_TIMEOUT: Duration = Duration::from_secs(120);
const TOOL_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AnthropicAdapter {
    model: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl AnthropicAdapter {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> anyhow::Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY is not set"))?;
        Ok(Self::new(model, api_key))
    }

    fn base_body(&self, params: &GenParams) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
        });
        if let Some(t) = params.temperature {
            body["temperature"] = json!(t);
        }
        body
    }

    async fn call_once(
        &self,
        body: serde_json::Value,
    ) -> Result<(serde_json::Value, f64), ProviderError> {
        let start = Instant::now();
        let resp = self
            .client
            .post(API_URL)
            .timeout(API_TIMEOUT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &text));
        }
        let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            ProviderError::new(
                super::FailureKind::Unknown,
                format!("malformed response body: {}", e),
            )
        })?;
        Ok((value, start.elapsed().as_secs_f64() * 1000.0))
    }

    async fn generate_single(
        &self,
        prompt: &str,
        system: &str,
        params: &GenParams,
    ) -> Result<GenerationResult, ProviderError> {
        let mut body = self.base_body(params);
        body["messages"] = json!([{"role": "user", "content": prompt}]);
        if !system.is_empty() {
            body["system"] = json!(system);
        }

        let (resp, latency_ms) = with_retry(&self.retry, || self.call_once(body.clone())).await?;

        Ok(GenerationResult {
            text: extract_text(&resp).unwrap_or_default(),
            latency_ms,
            tokens_in: token_count(&resp, "/usage/input_tokens"),
            tokens_out: token_count(&resp, "/usage/output_tokens"),
            tool_trace: None,
        })
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        system: &str,
        params: &GenParams,
    ) -> Result<GenerationResult, ProviderError> {
        let deadline = Instant::now() + params.case_timeout;
        let mut messages = vec![json!({"role": "user", "content": prompt})];
        let mut trace = ToolTrace::default();
        let mut total_latency_ms = 0.0;
        let mut tokens_in = 0u32;
        let mut tokens_out = 0u32;
        let mut last_text = String::new();

        for _ in 0..params.max_tool_turns {
            if Instant::now() >= deadline {
                trace.timed_out = true;
                break;
            }

            let mut body = self.base_body(params);
            body["messages"] = json!(messages);
            body["tools"] = json!([run_python_schema()]);
            if !system.is_empty() {
                body["system"] = json!(system);
            }

            let (resp, latency_ms) =
                with_retry(&self.retry, || self.call_once(body.clone())).await?;
            total_latency_ms += latency_ms;
            tokens_in += token_count(&resp, "/usage/input_tokens").unwrap_or(0);
            tokens_out += token_count(&resp, "/usage/output_tokens").unwrap_or(0);
            if let Some(text) = extract_text(&resp) {
                last_text = text;
            }

            let stop_reason = resp
                .pointer("/stop_reason")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let content = resp
                .pointer("/content")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let tool_uses: Vec<serde_json::Value> = content
                .iter()
                .filter(|b| b.pointer("/type").and_then(|t| t.as_str()) == Some("tool_use"))
                .cloned()
                .collect();

            if stop_reason == "end_turn" || tool_uses.is_empty() {
                return Ok(GenerationResult {
                    text: last_text,
                    latency_ms: total_latency_ms,
                    tokens_in: Some(tokens_in),
                    tokens_out: Some(tokens_out),
                    tool_trace: if trace.is_empty() { None } else { Some(trace) },
                });
            }

            messages.push(json!({"role": "assistant", "content": content}));

            let mut tool_results = Vec::new();
            for block in &tool_uses {
                let id = block
                    .pointer("/id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let name = block
                    .pointer("/name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let args = block.pointer("/input").cloned().unwrap_or(json!({}));

                let result = if name == tools::RUN_PYTHON {
                    let code = args.pointer("/code").and_then(|v| v.as_str()).unwrap_or("");
                    serde_json::to_value(tools::run_python(code, TOOL_EXEC_TIMEOUT).await)
                        .unwrap_or(json!({}))
                } else {
                    json!({"error": format!("Unknown tool: {}", name)})
                };

                trace.calls.push(ToolCallRecord {
                    tool: name.to_string(),
                    args,
                    result: result.clone(),
                });
                tool_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": result.to_string(),
                }));
            }
            messages.push(json!({"role": "user", "content": tool_results}));
        }

        if !trace.timed_out {
            trace.max_turns_reached = true;
        }
        Ok(GenerationResult {
            text: last_text,
            latency_ms: total_latency_ms,
            tokens_in: Some(tokens_in),
            tokens_out: Some(tokens_out),
            tool_trace: Some(trace),
        })
    }
}

#[async_trait]
impl ModelAdapter for AnthropicAdapter {
    async fn generate(
        &self,
        prompt: &str,
        system: &str,
        params: &GenParams,
    ) -> Result<GenerationResult, ProviderError> {
        if params.tools_enabled {
            self.generate_with_tools(prompt, system, params).await
        } else {
            self.generate_single(prompt, system, params).await
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "anthropic"
    }
}

fn extract_text(resp: &serde_json::Value) -> Option<String> {
    resp.pointer("/content")?
        .as_array()?
        .iter()
        .find(|b| b.pointer("/type").and_then(|t| t.as_str()) == Some("text"))
        .and_then(|b| b.pointer("/text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
}

fn token_count(resp: &serde_json::Value, pointer: &str) -> Option<u32> {
    resp.pointer(pointer)
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
}

fn run_python_schema() -> serde_json::Value {
    json!({
        "name": tools::RUN_PYTHON,
        "description": "Execute Python code and return stdout/stderr. \
                        Use this to write and run code that helps you solve the task.",
        "input_schema": {
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Python code to execute"}
            },
            "required": ["code"]
        }
    })
}
