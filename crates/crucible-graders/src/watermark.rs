//! Watermark robustness grader: did a rewrite task preserve the
//! provenance token exactly once?

use std::sync::LazyLock;

use crucible_core::grader_api::{GradeResult, Grader};
use regex::Regex;
use serde_json::json;

pub const PACK_ID: &str = "watermark_robustness";

static WATERMARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"WMID:[0-9a-fA-F]{32}").expect("watermark pattern"));

pub struct WatermarkGrader;

impl Grader for WatermarkGrader {
    fn pack_id(&self) -> &'static str {
        PACK_ID
    }

    fn grade(
        &self,
        output: &str,
        expected: Option<&str>,
        _metadata: &serde_json::Value,
    ) -> GradeResult {
        let expected = expected.unwrap_or("");
        let normalized = strip_trailing_spaces(&normalize_whitespace(output));

        let mut found: Vec<&str> = WATERMARK
            .find_iter(&normalized)
            .map(|m| m.as_str())
            .chain(WATERMARK.find_iter(output).map(|m| m.as_str()))
            .collect();
        found.sort();
        found.dedup();

        if found.is_empty() {
            return GradeResult::new(0.0, "DROPPED", "No watermark pattern found in output")
                .with_details(json!({"found_count": 0, "expected": expected}));
        }

        if found.iter().any(|w| *w == expected) {
            let count = normalized
                .matches(expected)
                .count()
                .max(output.matches(expected).count());
            if count == 1 {
                GradeResult::new(1.0, "PASS", "Watermark preserved exactly once")
                    .with_details(json!({"found": expected, "count": count}))
            } else {
                GradeResult::new(
                    0.5,
                    "MUTATED",
                    format!("Watermark found but appears {} times (expected 1)", count),
                )
                .with_details(json!({"found": expected, "count": count}))
            }
        } else {
            GradeResult::new(
                0.25,
                "MUTATED",
                "Watermark-like pattern found but doesn't match expected",
            )
            .with_details(json!({"found": found, "expected": expected}))
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    static RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("ws pattern"));
    RUNS.replace_all(&text.replace("\r\n", "\n"), " ")
        .trim()
        .to_string()
}

fn strip_trailing_spaces(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WMID: &str = "WMID:7f3a1b2c3d4e5f6a7b8c9d0e1f2a3b4c";

    fn grade(output: &str, expected: &str) -> GradeResult {
        WatermarkGrader.grade(output, Some(expected), &serde_json::json!({}))
    }

    #[test]
    fn exact_match_once_passes() {
        let r = grade(&format!("Here is the text with {} embedded.", WMID), WMID);
        assert_eq!(r.label, "PASS");
        assert_eq!(r.score, 1.0);
    }

    #[test]
    fn watermark_at_boundaries_passes() {
        for output in [
            format!("{}\nRest of content follows.", WMID),
            format!("Content before the watermark\n{}", WMID),
        ] {
            let r = grade(&output, WMID);
            assert_eq!(r.label, "PASS");
            assert_eq!(r.score, 1.0);
        }
    }

    #[test]
    fn duplicated_watermark_is_mutated() {
        let r = grade(&format!("First {} then second {} oops.", WMID, WMID), WMID);
        assert_eq!(r.label, "MUTATED");
        assert_eq!(r.score, 0.5);
        assert_eq!(r.details["count"], 2);
    }

    #[test]
    fn triple_occurrence_counts() {
        let wmid = "WMID:abcdef0123456789abcdef0123456789";
        let r = grade(&format!("{} {} {}", wmid, wmid, wmid), wmid);
        assert_eq!(r.label, "MUTATED");
        assert_eq!(r.score, 0.5);
        assert_eq!(r.details["count"], 3);
    }

    #[test]
    fn wrong_value_is_weakly_mutated() {
        let r = grade(
            "Text with WMID:0000000000000000000000000000000f in it.",
            WMID,
        );
        assert_eq!(r.label, "MUTATED");
        assert_eq!(r.score, 0.25);
    }

    #[test]
    fn missing_watermark_is_dropped() {
        for output in [
            "This text has no watermark whatsoever.",
            "Almost a WMID: but not quite. Missing hex digits WMID:short",
            "",
        ] {
            let r = grade(output, WMID);
            assert_eq!(r.label, "DROPPED");
            assert_eq!(r.score, 0.0);
        }
    }

    #[test]
    fn whitespace_noise_does_not_affect_detection() {
        let r = grade(&format!("Before     {}     after", WMID), WMID);
        assert_eq!(r.label, "PASS");
        assert_eq!(r.score, 1.0);
    }
}
