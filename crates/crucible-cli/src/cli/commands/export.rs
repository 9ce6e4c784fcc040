use crucible_core::model::GradedRow;
use crucible_core::storage::store::{QueryFilter, Store};

use crate::cli::args::ExportArgs;

pub fn execute(args: ExportArgs) -> anyhow::Result<i32> {
    let store = Store::open(&args.db)?;
    let run_id = match args.run.or(store.latest_run_id()?) {
        Some(id) => id,
        None => {
            println!("No runs found in database.");
            return Ok(1);
        }
    };

    let rows = store.fetch_graded(&QueryFilter {
        run_id: Some(run_id),
        ..Default::default()
    })?;

    let body = match args.format.as_str() {
        "csv" => to_csv(&rows),
        "json" => serde_json::to_string_pretty(&rows)?,
        other => anyhow::bail!("unknown export format '{}' (expected csv or json)", other),
    };

    match &args.out {
        Some(path) => {
            std::fs::write(path, body)?;
            println!("Exported {} rows to {}", rows.len(), path.display());
        }
        None => println!("{}", body),
    }
    Ok(0)
}

const COLUMNS: [&str; 14] = [
    "run_id",
    "model_id",
    "pack_id",
    "case_id",
    "scheme",
    "rep",
    "score",
    "label",
    "reason",
    "latency_ms",
    "tokens_in",
    "tokens_out",
    "error",
    "raw_text",
];

fn to_csv(rows: &[GradedRow]) -> String {
    let mut out = String::new();
    out.push_str(&COLUMNS.join(","));
    out.push('\n');
    for r in rows {
        let fields = [
            r.run_id.to_string(),
            r.model_id.clone(),
            r.pack_id.clone(),
            r.case_id.clone(),
            r.scheme.clone().unwrap_or_default(),
            r.rep.to_string(),
            r.score.to_string(),
            r.label.clone(),
            r.reason.clone().unwrap_or_default(),
            format!("{:.1}", r.latency_ms),
            r.tokens_in.map(|v| v.to_string()).unwrap_or_default(),
            r.tokens_out.map(|v| v.to_string()).unwrap_or_default(),
            (r.error as u8).to_string(),
            r.raw_text.clone(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escaping() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("two\nlines"), "\"two\nlines\"");
    }
}
