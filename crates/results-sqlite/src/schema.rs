pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE results (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  url             TEXT NOT NULL,
  status_code     INTEGER NOT NULL CHECK (status_code BETWEEN 0 AND 999),
  error           TEXT,
  timestamp       TEXT NOT NULL
);

CREATE TABLE runs (
  run_id          TEXT PRIMARY KEY,
  started_at      TEXT NOT NULL,
  finished_at     TEXT,
  tool_version    TEXT NOT NULL,
  config_json     TEXT NOT NULL,
  resumed         INTEGER NOT NULL CHECK (resumed IN (0,1)) DEFAULT 0,
  checked         INTEGER DEFAULT 0,
  error_count     INTEGER DEFAULT 0,
  stopped         INTEGER NOT NULL CHECK (stopped IN (0,1)) DEFAULT 0
);

CREATE INDEX idx_results_url ON results(url);
CREATE INDEX idx_results_status ON results(status_code);

COMMIT;
"#
;
