use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::{FailureKind, ModelAdapter, ProviderError};
use crate::model::{GenParams, GenerationResult};

/// Deterministic in-process adapter for tests and dry runs.
pub struct FakeAdapter {
    model: String,
    reply: FakeReply,
    /// 1-based call index that fails with a timeout, if set.
    fail_on_call: Option<u32>,
    calls: AtomicU32,
}

pub enum FakeReply {
    /// Echo the prompt back verbatim.
    Echo,
    Fixed(String),
}

impl FakeAdapter {
    pub fn echo(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reply: FakeReply::Echo,
            fail_on_call: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn fixed(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reply: FakeReply::Fixed(text.into()),
            fail_on_call: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn fail_on_call(mut self, call: u32) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelAdapter for FakeAdapter {
    async fn generate(
        &self,
        prompt: &str,
        _system: &str,
        _params: &GenParams,
    ) -> Result<GenerationResult, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(ProviderError::permanent(
                FailureKind::Timeout,
                "scripted failure",
            ));
        }
        let text = match &self.reply {
            FakeReply::Echo => prompt.to_string(),
            FakeReply::Fixed(s) => s.clone(),
        };
        Ok(GenerationResult {
            tokens_in: Some(prompt.split_whitespace().count() as u32),
            tokens_out: Some(text.split_whitespace().count() as u32),
            text,
            latency_ms: 1.0,
            tool_trace: None,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "fake"
    }
}
