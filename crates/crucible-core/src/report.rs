//! Markdown summary tables over graded rows.

use std::collections::BTreeMap;

use crate::model::GradedRow;
use crate::storage::store::RunRow;

/// Renders a per-run Markdown summary: label breakdown, mean score,
/// latency and token totals, and the failure tally.
pub fn markdown_report(run: &RunRow, rows: &[GradedRow]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Run {} — {}\n\n", run.id, run.pack_id));
    out.push_str(&format!("- model: `{}`\n", run.model_id));
    out.push_str(&format!("- created: {}\n", run.created_at));
    if let Some(finished) = &run.finished_at {
        out.push_str(&format!("- finished: {}\n", finished));
    }
    out.push_str(&format!("- status: {}\n", run.status.as_str()));
    if let Some(sha) = &run.git_sha {
        out.push_str(&format!("- revision: `{}`\n", sha));
    }
    if let Some(params) = &run.params_json {
        out.push_str(&format!("- params: `{}`\n", params));
    }
    out.push('\n');

    if rows.is_empty() {
        out.push_str("No graded outputs.\n");
        return out;
    }

    let total = rows.len();
    let errors = rows.iter().filter(|r| r.error).count();
    let mean_score = rows.iter().map(|r| r.score).sum::<f64>() / total as f64;
    let total_latency: f64 = rows.iter().map(|r| r.latency_ms).sum();
    let tokens_in: u64 = rows.iter().filter_map(|r| r.tokens_in).map(u64::from).sum();
    let tokens_out: u64 = rows
        .iter()
        .filter_map(|r| r.tokens_out)
        .map(u64::from)
        .sum();

    out.push_str(&format!(
        "{} outputs, {} failed generations, mean score {:.3}\n\n",
        total, errors, mean_score
    ));
    out.push_str(&format!(
        "Total latency {:.0} ms; tokens in/out {}/{}\n\n",
        total_latency, tokens_in, tokens_out
    ));

    out.push_str("| label | count | share | mean score |\n");
    out.push_str("|---|---:|---:|---:|\n");
    let mut by_label: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for row in rows {
        let entry = by_label.entry(row.label.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += row.score;
    }
    for (label, (count, score_sum)) in &by_label {
        out.push_str(&format!(
            "| {} | {} | {:.1}% | {:.3} |\n",
            label,
            count,
            *count as f64 * 100.0 / total as f64,
            score_sum / *count as f64
        ));
    }

    let mut by_scheme: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for row in rows {
        if let Some(scheme) = &row.scheme {
            let entry = by_scheme.entry(scheme.as_str()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += row.score;
        }
    }
    if !by_scheme.is_empty() {
        out.push_str("\n| scheme | count | mean score |\n");
        out.push_str("|---|---:|---:|\n");
        for (scheme, (count, score_sum)) in &by_scheme {
            out.push_str(&format!(
                "| {} | {} | {:.3} |\n",
                scheme,
                count,
                score_sum / *count as f64
            ));
        }
    }

    out
}
