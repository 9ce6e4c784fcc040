use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use super::retry::{with_retry, RetryPolicy};
use super::{classify_status, classify_transport, FailureKind, ModelAdapter, ProviderError};
use crate::model::{GenParams, GenerationResult, ToolCallRecord, ToolTrace};
use crate::tools;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const API_TIMEOUT: Duration = Duration::from_secs(120);
const TOOL_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat-completions adapter; also serves local OpenAI-compatible servers
/// (e.g. ollama) through a custom base URL.
pub struct OpenAiAdapter {
    model: String,
    api_key: String,
    base_url: String,
    provider: &'static str,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiAdapter {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            provider: "openai",
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        Ok(Self::new(model, api_key))
    }

    /// Local ollama server speaking the OpenAI wire protocol.
    pub fn ollama(model: impl Into<String>) -> Self {
        let mut a = Self::new(model, "ollama");
        a.base_url = "http://localhost:11434/v1".to_string();
        a.provider = "ollama";
        a
    }

    fn base_body(&self, messages: &[serde_json::Value], params: &GenParams) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": params.max_tokens,
        });
        if let Some(t) = params.temperature {
            body["temperature"] = json!(t);
        }
        body
    }

    fn initial_messages(prompt: &str, system: &str) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));
        messages
    }

    async fn call_once(
        &self,
        body: serde_json::Value,
    ) -> Result<(serde_json::Value, f64), ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .timeout(API_TIMEOUT)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
                FailureKind::Unknown,
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
        let messages = Self::initial_messages(prompt, system);
        let body = self.base_body(&messages, params);
        let (resp, latency_ms) = with_retry(&self.retry, || self.call_once(body.clone())).await?;

        let text = resp
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(GenerationResult {
            text,
            latency_ms,
            tokens_in: token_count(&resp, "/usage/prompt_tokens"),
            tokens_out: token_count(&resp, "/usage/completion_tokens"),
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
        let mut messages = Self::initial_messages(prompt, system);
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

            let mut body = self.base_body(&messages, params);
            body["tools"] = json!([run_python_schema()]);

            let (resp, latency_ms) =
                with_retry(&self.retry, || self.call_once(body.clone())).await?;
            total_latency_ms += latency_ms;
            tokens_in += token_count(&resp, "/usage/prompt_tokens").unwrap_or(0);
            tokens_out += token_count(&resp, "/usage/completion_tokens").unwrap_or(0);

            let message = resp
                .pointer("/choices/0/message")
                .cloned()
                .unwrap_or(json!({}));
            if let Some(content) = message.pointer("/content").and_then(|v| v.as_str()) {
                if !content.is_empty() {
                    last_text = content.to_string();
                }
            }

            let tool_calls = message
                .pointer("/tool_calls")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if tool_calls.is_empty() {
                return Ok(GenerationResult {
                    text: last_text,
                    latency_ms: total_latency_ms,
                    tokens_in: Some(tokens_in),
                    tokens_out: Some(tokens_out),
                    tool_trace: if trace.is_empty() { None } else { Some(trace) },
                });
            }

            messages.push(message.clone());

            for call in &tool_calls {
                let id = call
                    .pointer("/id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let name = call
                    .pointer("/function/name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let args: serde_json::Value = call
                    .pointer("/function/arguments")
                    .and_then(|v| v.as_str())
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or(json!({}));

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
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": result.to_string(),
                }));
            }
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
impl ModelAdapter for OpenAiAdapter {
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
        self.provider
    }
}

fn token_count(resp: &serde_json::Value, pointer: &str) -> Option<u32> {
    resp.pointer(pointer)
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
}

fn run_python_schema() -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": tools::RUN_PYTHON,
            "description": "Execute Python code and return stdout/stderr. \
                            Use this to write and run code that helps you solve the task.",
            "parameters": {
                "type": "object",
                "properties": {
                    "code": {"type": "string", "description": "Python code to execute"}
                },
                "required": ["code"]
            }
        }
    })
}
