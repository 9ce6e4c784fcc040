pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS models (
  model_id TEXT PRIMARY KEY,
  name     TEXT NOT NULL,
  provider TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  pack_id     TEXT NOT NULL,
  model_id    TEXT NOT NULL REFERENCES models(model_id),
  created_at  TEXT NOT NULL,
  finished_at TEXT,
  git_sha     TEXT,
  params_json TEXT,
  status      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cases (
  case_id       TEXT PRIMARY KEY,
  pack_id       TEXT NOT NULL,
  scheme        TEXT,
  prompt        TEXT NOT NULL,
  expected      TEXT,
  metadata_json TEXT,
  content_sha   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS outputs (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id     INTEGER NOT NULL REFERENCES runs(id),
  case_id    TEXT NOT NULL REFERENCES cases(case_id),
  rep        INTEGER NOT NULL,
  raw_text   TEXT NOT NULL,
  latency_ms REAL,
  tokens_in  INTEGER,
  tokens_out INTEGER,
  tool_json  TEXT,
  error      INTEGER NOT NULL DEFAULT 0,
  origin     TEXT,
  UNIQUE(run_id, case_id, rep)
);

CREATE TABLE IF NOT EXISTS scores (
  output_id    INTEGER PRIMARY KEY REFERENCES outputs(id),
  score        REAL NOT NULL,
  label        TEXT NOT NULL,
  reason       TEXT,
  details_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_outputs_run_case ON outputs(run_id, case_id);
CREATE INDEX IF NOT EXISTS idx_runs_model ON runs(model_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_outputs_origin ON outputs(run_id, origin);
"#;
