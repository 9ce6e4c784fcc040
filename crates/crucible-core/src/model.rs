use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A model under evaluation, addressed as `provider:name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: String,
    pub name: String,
}

impl ModelSpec {
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        match spec.split_once(':') {
            Some((provider, name)) if !provider.is_empty() && !name.is_empty() => Ok(Self {
                provider: provider.to_string(),
                name: name.to_string(),
            }),
            _ => anyhow::bail!(
                "invalid model spec '{}': expected provider:model_name",
                spec
            ),
        }
    }

    pub fn id(&self) -> String {
        format!("{}:{}", self.provider, self.name)
    }
}

/// Parameters fixed for the lifetime of one Run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParams {
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub tools_enabled: bool,
    pub max_tool_turns: u32,
    pub case_timeout_secs: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            n: 1,
            temperature: None,
            max_tokens: 1024,
            tools_enabled: false,
            max_tool_turns: 10,
            case_timeout_secs: 120,
        }
    }
}

impl RunParams {
    pub fn case_timeout(&self) -> Duration {
        Duration::from_secs(self.case_timeout_secs)
    }

    pub fn gen_params(&self) -> GenParams {
        GenParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools_enabled: self.tools_enabled,
            max_tool_turns: self.max_tool_turns,
            case_timeout: self.case_timeout(),
        }
    }
}

/// Per-generation knobs handed to an adapter.
#[derive(Debug, Clone)]
pub struct GenParams {
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub tools_enabled: bool,
    pub max_tool_turns: u32,
    pub case_timeout: Duration,
}

impl Default for GenParams {
    fn default() -> Self {
        RunParams::default().gen_params()
    }
}

/// One tool invocation inside an agentic generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: serde_json::Value,
    pub result: serde_json::Value,
}

/// Trace of tool activity across one generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolTrace {
    pub calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub max_turns_reached: bool,
}

impl ToolTrace {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && !self.timed_out && !self.max_turns_reached
    }
}

/// Raw result of one successful adapter call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub latency_ms: f64,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_trace: Option<ToolTrace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => RunStatus::Running,
            "complete" => RunStatus::Complete,
            _ => RunStatus::Failed,
        }
    }
}

/// One persisted model response, keyed by (run, case, rep).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub raw_text: String,
    pub latency_ms: f64,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub tool_trace: Option<ToolTrace>,
    pub error: bool,
}

impl OutputRecord {
    pub fn from_generation(gen: GenerationResult) -> Self {
        Self {
            raw_text: gen.text,
            latency_ms: gen.latency_ms,
            tokens_in: gen.tokens_in,
            tokens_out: gen.tokens_out,
            tool_trace: gen.tool_trace,
            error: false,
        }
    }

    pub fn from_failure() -> Self {
        Self {
            raw_text: String::new(),
            latency_ms: 0.0,
            tokens_in: None,
            tokens_out: None,
            tool_trace: None,
            error: true,
        }
    }
}

/// Joined output + score + case row returned by store queries.
#[derive(Debug, Clone, Serialize)]
pub struct GradedRow {
    pub run_id: i64,
    pub model_id: String,
    pub pack_id: String,
    pub case_id: String,
    pub scheme: Option<String>,
    pub rep: u32,
    pub raw_text: String,
    pub latency_ms: f64,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub error: bool,
    pub score: f64,
    pub label: String,
    pub reason: Option<String>,
    pub details: serde_json::Value,
}
