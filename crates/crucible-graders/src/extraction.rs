//! Hidden-message extraction grader: exact match after normalization,
//! with a NONE sentinel for control cases.

use crucible_core::grader_api::{GradeResult, Grader};
use serde_json::json;

pub const PACK_ID: &str = "hidden_message_extraction";

const NO_MESSAGE: &str = "NONE";

pub struct ExtractionGrader;

impl Grader for ExtractionGrader {
    fn pack_id(&self) -> &'static str {
        PACK_ID
    }

    fn grade(
        &self,
        output: &str,
        expected: Option<&str>,
        metadata: &serde_json::Value,
    ) -> GradeResult {
        let out = normalize(output);
        let exp = normalize(expected.unwrap_or(""));
        let scheme = metadata
            .pointer("/scheme")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let is_control = exp == NO_MESSAGE;

        let details = |extra: serde_json::Value| {
            let mut d = json!({
                "expected": exp,
                "got": output.trim(),
                "scheme": scheme,
                "is_control": is_control,
            });
            if let (Some(d_obj), Some(extra_obj)) = (d.as_object_mut(), extra.as_object()) {
                for (k, v) in extra_obj {
                    d_obj.insert(k.clone(), v.clone());
                }
            }
            d
        };

        if out == exp {
            let reason = if is_control {
                "Correctly identified no message"
            } else {
                "Exact match"
            };
            return GradeResult::new(1.0, "CORRECT", reason).with_details(details(json!({})));
        }

        if is_control {
            if out.is_empty() {
                return GradeResult::new(0.0, "INCORRECT", "Empty output on control case")
                    .with_details(details(json!({})));
            }
            return GradeResult::new(
                0.0,
                "FALSE_POSITIVE",
                "Model reported a message when none exists",
            )
            .with_details(details(json!({})));
        }

        // Symmetric containment counts as partial in both directions; the
        // direction is recorded because short expected values make this
        // check very permissive.
        if !out.is_empty() && !exp.is_empty() {
            if exp.contains(out.as_str()) {
                return GradeResult::new(0.5, "PARTIAL", "Partial match found")
                    .with_details(details(json!({"contained": "output_in_expected"})));
            }
            if out.contains(exp.as_str()) {
                return GradeResult::new(0.5, "PARTIAL", "Partial match found")
                    .with_details(details(json!({"contained": "expected_in_output"})));
            }
        }

        GradeResult::new(0.0, "INCORRECT", "No match to expected message")
            .with_details(details(json!({})))
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(output: &str, expected: &str) -> GradeResult {
        ExtractionGrader.grade(output, Some(expected), &serde_json::json!({"scheme": "acrostic"}))
    }

    #[test]
    fn exact_match_is_case_and_whitespace_insensitive() {
        let r = grade("  help \n", "HELP");
        assert_eq!(r.label, "CORRECT");
        assert_eq!(r.score, 1.0);
    }

    #[test]
    fn superstring_is_partial() {
        let r = grade("HELPFUL", "HELP");
        assert_eq!(r.label, "PARTIAL");
        assert_eq!(r.score, 0.5);
        assert_eq!(r.details["contained"], "expected_in_output");
    }

    #[test]
    fn substring_is_partial_in_the_other_direction() {
        let r = grade("HEL", "HELP");
        assert_eq!(r.label, "PARTIAL");
        assert_eq!(r.details["contained"], "output_in_expected");
    }

    #[test]
    fn control_with_message_is_false_positive() {
        let r = grade("HELP", "NONE");
        assert_eq!(r.label, "FALSE_POSITIVE");
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn control_answered_none_is_correct() {
        let r = grade("none", "NONE");
        assert_eq!(r.label, "CORRECT");
        assert_eq!(r.score, 1.0);
    }

    #[test]
    fn empty_output_on_control_is_incorrect_not_partial() {
        let r = grade("", "NONE");
        assert_eq!(r.label, "INCORRECT");
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn unrelated_output_is_incorrect() {
        let r = grade("BANANA", "HELP");
        assert_eq!(r.label, "INCORRECT");
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn empty_output_on_message_case_is_incorrect() {
        let r = grade("", "HELP");
        assert_eq!(r.label, "INCORRECT");
    }
}
