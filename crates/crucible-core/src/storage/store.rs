use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};

use crate::fingerprint::case_fingerprint;
use crate::grader_api::GradeResult;
use crate::model::{GradedRow, ModelSpec, OutputRecord, RunParams, RunStatus};
use crate::pack::CaseConfig;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone)]
pub struct RunRow {
    pub id: i64,
    pub pack_id: String,
    pub model_id: String,
    pub created_at: String,
    pub finished_at: Option<String>,
    pub git_sha: Option<String>,
    pub params_json: Option<String>,
    pub status: RunStatus,
}

/// Filter for joined output+score reads; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub pack: Option<String>,
    pub model: Option<String>,
    pub run_id: Option<i64>,
    pub case_id: Option<String>,
    pub scheme: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    pub copied: usize,
    pub skipped: usize,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        // WAL keeps report readers from blocking the writer.
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn register_model(&self, spec: &ModelSpec) -> anyhow::Result<String> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO models(model_id, name, provider) VALUES (?1, ?2, ?3)",
            params![spec.id(), spec.name, spec.provider],
        )?;
        Ok(spec.id())
    }

    pub fn create_run(
        &self,
        pack_id: &str,
        model_id: &str,
        git_sha: Option<&str>,
        run_params: &RunParams,
    ) -> anyhow::Result<i64> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs(pack_id, model_id, created_at, git_sha, params_json, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                pack_id,
                model_id,
                created_at,
                git_sha,
                serde_json::to_string(run_params)?,
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finalize_run(&self, run_id: i64, status: RunStatus) -> anyhow::Result<()> {
        let finished_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE runs SET status=?1, finished_at=?2 WHERE id=?3",
            params![status.as_str(), finished_at, run_id],
        )?;
        Ok(())
    }

    pub fn run_info(&self, run_id: i64) -> anyhow::Result<RunRow> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, pack_id, model_id, created_at, finished_at, git_sha, params_json, status
             FROM runs WHERE id=?1",
            params![run_id],
            |row| {
                Ok(RunRow {
                    id: row.get(0)?,
                    pack_id: row.get(1)?,
                    model_id: row.get(2)?,
                    created_at: row.get(3)?,
                    finished_at: row.get(4)?,
                    git_sha: row.get(5)?,
                    params_json: row.get(6)?,
                    status: RunStatus::parse(&row.get::<_, String>(7)?),
                })
            },
        )
        .with_context(|| format!("run {} not found", run_id))
    }

    pub fn latest_run_id(&self) -> anyhow::Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row("SELECT id FROM runs ORDER BY id DESC LIMIT 1", [], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(id)
    }

    /// Idempotent on case id; content is immutable after first persist. A
    /// re-load with different content keeps the original and logs it.
    pub fn upsert_case(&self, pack_id: &str, case: &CaseConfig) -> anyhow::Result<()> {
        let sha = case_fingerprint(
            pack_id,
            &case.id,
            &case.prompt,
            case.expected.as_deref(),
            &case.metadata,
        );
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT content_sha FROM cases WHERE case_id=?1",
                params![case.id],
                |r| r.get(0),
            )
            .optional()?;

        match existing {
            Some(prev) => {
                if prev != sha {
                    tracing::warn!(
                        case_id = %case.id,
                        "case content changed since first persisted; keeping original"
                    );
                }
            }
            None => {
                conn.execute(
                    "INSERT OR IGNORE INTO cases(case_id, pack_id, scheme, prompt, expected, metadata_json, content_sha)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        case.id,
                        pack_id,
                        case.scheme,
                        case.prompt,
                        case.expected,
                        serde_json::to_string(&case.metadata)?,
                        sha
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// Persists one output and its score in a single transaction; a score
    /// is never visible without its output. A failed write is retried once
    /// at the pair boundary.
    pub fn insert_graded(
        &self,
        run_id: i64,
        case_id: &str,
        rep: u32,
        output: &OutputRecord,
        grade: &GradeResult,
    ) -> anyhow::Result<i64> {
        match self.try_insert_graded(run_id, case_id, rep, output, grade, None) {
            Ok(id) => Ok(id),
            Err(first) => {
                tracing::warn!(run_id, case_id, rep, error = %first, "output write failed, retrying once");
                self.try_insert_graded(run_id, case_id, rep, output, grade, None)
            }
        }
    }

    fn try_insert_graded(
        &self,
        run_id: i64,
        case_id: &str,
        rep: u32,
        output: &OutputRecord,
        grade: &GradeResult,
        origin: Option<&str>,
    ) -> anyhow::Result<i64> {
        let tool_json = output
            .tool_trace
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO outputs(run_id, case_id, rep, raw_text, latency_ms, tokens_in, tokens_out, tool_json, error, origin)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_id,
                case_id,
                rep,
                output.raw_text,
                output.latency_ms,
                output.tokens_in,
                output.tokens_out,
                tool_json,
                output.error,
                origin
            ],
        )
        .context("insert output")?;
        let output_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO scores(output_id, score, label, reason, details_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                output_id,
                grade.score,
                grade.label,
                grade.reason,
                serde_json::to_string(&grade.details)?
            ],
        )
        .context("insert score")?;
        tx.commit()?;
        Ok(output_id)
    }

    /// Highest repetition index present for (run, case), if any.
    pub fn max_rep(&self, run_id: i64, case_id: &str) -> anyhow::Result<Option<u32>> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(rep) FROM outputs WHERE run_id=?1 AND case_id=?2",
            params![run_id, case_id],
            |r| r.get(0),
        )?;
        Ok(max.map(|v| v as u32))
    }

    pub fn count_outputs(&self, run_id: i64) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row(
            "SELECT COUNT(*) FROM outputs WHERE run_id=?1",
            params![run_id],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    pub fn count_failures(&self, run_id: i64) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row(
            "SELECT COUNT(*) FROM outputs WHERE run_id=?1 AND error=1",
            params![run_id],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// Joined output + score + case rows matching the filter, ordered by
    /// (run, case, rep).
    pub fn fetch_graded(&self, filter: &QueryFilter) -> anyhow::Result<Vec<GradedRow>> {
        let mut sql = String::from(
            "SELECT o.run_id, r.model_id, r.pack_id, o.case_id, c.scheme, o.rep,
                    o.raw_text, o.latency_ms, o.tokens_in, o.tokens_out, o.error,
                    s.score, s.label, s.reason, s.details_json
             FROM outputs o
             JOIN runs r ON r.id = o.run_id
             JOIN scores s ON s.output_id = o.id
             LEFT JOIN cases c ON c.case_id = o.case_id
             WHERE 1=1",
        );
        let mut args: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(pack) = &filter.pack {
            sql.push_str(&format!(" AND r.pack_id = ?{}", args.len() + 1));
            args.push(pack.clone().into());
        }
        if let Some(model) = &filter.model {
            sql.push_str(&format!(" AND r.model_id = ?{}", args.len() + 1));
            args.push(model.clone().into());
        }
        if let Some(run_id) = filter.run_id {
            sql.push_str(&format!(" AND o.run_id = ?{}", args.len() + 1));
            args.push(run_id.into());
        }
        if let Some(case_id) = &filter.case_id {
            sql.push_str(&format!(" AND o.case_id = ?{}", args.len() + 1));
            args.push(case_id.clone().into());
        }
        if let Some(scheme) = &filter.scheme {
            sql.push_str(&format!(" AND c.scheme = ?{}", args.len() + 1));
            args.push(scheme.clone().into());
        }
        sql.push_str(" ORDER BY o.run_id, o.case_id, o.rep");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
            let details_str: Option<String> = row.get(14)?;
            Ok(GradedRow {
                run_id: row.get(0)?,
                model_id: row.get(1)?,
                pack_id: row.get(2)?,
                case_id: row.get(3)?,
                scheme: row.get(4)?,
                rep: row.get::<_, i64>(5)? as u32,
                raw_text: row.get(6)?,
                latency_ms: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                tokens_in: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
                tokens_out: row.get::<_, Option<i64>>(9)?.map(|v| v as u32),
                error: row.get::<_, i64>(10)? != 0,
                score: row.get(11)?,
                label: row.get(12)?,
                reason: row.get(13)?,
                details: details_str
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_else(|| serde_json::json!({})),
            })
        })?;

        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Merges a source run (possibly from another database file) into a
    /// target run, appending repetitions after the target's existing ones.
    ///
    /// Each copied output carries an origin marker derived from its source
    /// coordinates, so re-merging the same source run is a no-op.
    pub fn merge_run(
        &self,
        src: &Store,
        src_run_id: i64,
        dst_run_id: i64,
    ) -> anyhow::Result<MergeStats> {
        let src_run = src.run_info(src_run_id)?;
        let dst_run = self.run_info(dst_run_id)?;
        if src_run.pack_id != dst_run.pack_id {
            anyhow::bail!(
                "cannot merge run for pack '{}' into run for pack '{}'",
                src_run.pack_id,
                dst_run.pack_id
            );
        }

        let rows = src.fetch_graded(&QueryFilter {
            run_id: Some(src_run_id),
            ..Default::default()
        })?;
        let cases = src.fetch_cases_for_run(src_run_id)?;
        for case in &cases {
            self.copy_case(case)?;
        }

        let mut stats = MergeStats::default();
        for row in rows {
            let origin = format!(
                "{}/{}/{}#{}",
                src_run.created_at, src_run_id, row.case_id, row.rep
            );
            if self.has_origin(dst_run_id, &origin)? {
                stats.skipped += 1;
                continue;
            }
            let rep = match self.max_rep(dst_run_id, &row.case_id)? {
                Some(max) => max + 1,
                None => 0,
            };
            let output = OutputRecord {
                raw_text: row.raw_text.clone(),
                latency_ms: row.latency_ms,
                tokens_in: row.tokens_in,
                tokens_out: row.tokens_out,
                tool_trace: None,
                error: row.error,
            };
            let grade = GradeResult {
                score: row.score,
                label: row.label.clone(),
                reason: row.reason.clone().unwrap_or_default(),
                details: row.details.clone(),
            };
            self.try_insert_graded(
                dst_run_id,
                &row.case_id,
                rep,
                &output,
                &grade,
                Some(&origin),
            )?;
            stats.copied += 1;
        }
        Ok(stats)
    }

    fn has_origin(&self, run_id: i64, origin: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM outputs WHERE run_id=?1 AND origin=?2",
                params![run_id, origin],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn fetch_cases_for_run(&self, run_id: i64) -> anyhow::Result<Vec<CaseRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT c.case_id, c.pack_id, c.scheme, c.prompt, c.expected, c.metadata_json, c.content_sha
             FROM cases c JOIN outputs o ON o.case_id = c.case_id
             WHERE o.run_id = ?1",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(CaseRow {
                case_id: row.get(0)?,
                pack_id: row.get(1)?,
                scheme: row.get(2)?,
                prompt: row.get(3)?,
                expected: row.get(4)?,
                metadata_json: row.get(5)?,
                content_sha: row.get(6)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn copy_case(&self, case: &CaseRow) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO cases(case_id, pack_id, scheme, prompt, expected, metadata_json, content_sha)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                case.case_id,
                case.pack_id,
                case.scheme,
                case.prompt,
                case.expected,
                case.metadata_json,
                case.content_sha
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CaseRow {
    case_id: String,
    pack_id: String,
    scheme: Option<String>,
    prompt: String,
    expected: Option<String>,
    metadata_json: Option<String>,
    content_sha: String,
}
