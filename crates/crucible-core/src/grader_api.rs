use serde::{Deserialize, Serialize};

/// Deterministic classification of one model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeResult {
    pub score: f64,
    pub label: String,
    pub reason: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl GradeResult {
    pub fn new(score: f64, label: &str, reason: impl Into<String>) -> Self {
        Self {
            score,
            label: label.to_string(),
            reason: reason.into(),
            details: serde_json::json!({}),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// A pack's grading function.
///
/// Grading is a pure mapping over (output text, expected value, case
/// metadata); it never consults other outputs or runs, and it must
/// classify any well-formed text — including the empty string — rather
/// than fail.
pub trait Grader: Send + Sync {
    fn pack_id(&self) -> &'static str;

    fn grade(
        &self,
        output: &str,
        expected: Option<&str>,
        metadata: &serde_json::Value,
    ) -> GradeResult;
}
