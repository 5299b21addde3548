use crate::{Db, Outcome, RunMeta};
use anyhow::Result;
use rusqlite::params;
use uuid::Uuid;

impl Db {
    pub fn insert_outcome(&self, outcome: &Outcome) -> Result<()> {
        self.conn.execute(
            "INSERT INTO results(url,status_code,error,timestamp) VALUES (?,?,?,?)",
            params![outcome.url, outcome.status_code as i64, outcome.error, outcome.timestamp_rfc3339()],
        )?;
        Ok(())
    }

    /// Drop every recorded outcome. Returns the number of rows removed.
    pub fn clear_results(&self) -> Result<usize> {
        let n = self.conn.execute("DELETE FROM results", [])?;
        Ok(n)
    }

    pub fn begin_run(&self, meta: &RunMeta) -> Result<Uuid> {
        self.conn.execute(
            "INSERT INTO runs(run_id, started_at, tool_version, config_json, resumed) VALUES (?,?,?,?,?)",
            params![meta.run_id.to_string(), meta.started_at, meta.tool_version, meta.config_json, meta.resumed as i64],
        )?;
        Ok(meta.run_id)
    }

    pub fn finish_run(&self, run_id: &Uuid, finished_at: &str, checked: i64, error_count: i64, stopped: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET finished_at=?, checked=?, error_count=?, stopped=? WHERE run_id=?",
            params![finished_at, checked, error_count, stopped as i64, run_id.to_string()],
        )?;
        Ok(())
    }
}
