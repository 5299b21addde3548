use crate::{Db, Outcome, ResultSummary, RunRecord};
use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row};
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    /// URLs that already have a recorded outcome. This is the resume checkpoint.
    pub fn checked_urls(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT url FROM results")?;
        let urls = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(urls)
    }

    pub fn outcomes(&self) -> Result<Vec<Outcome>> {
        let mut stmt = self.conn.prepare("SELECT url, status_code, error, timestamp FROM results ORDER BY id")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(outcome_from_row(row)?);
        }
        Ok(out)
    }

    pub fn summary(&self) -> Result<ResultSummary> {
        let s = self.conn.query_row(
            "SELECT COUNT(1),
                    COALESCE(SUM(CASE WHEN status_code = 0 OR status_code >= 400 THEN 1 ELSE 0 END), 0),
                    COUNT(DISTINCT url)
             FROM results",
            [],
            |r| Ok(ResultSummary { total: r.get(0)?, errors: r.get(1)?, distinct_urls: r.get(2)? }),
        )?;
        Ok(s)
    }

    pub fn last_run(&self) -> Result<Option<RunRecord>> {
        let rec = self.conn.query_row(
            "SELECT run_id, started_at, finished_at, tool_version, config_json, resumed, checked, error_count, stopped
             FROM runs ORDER BY started_at DESC, rowid DESC LIMIT 1",
            [],
            |r| Ok(RunRecord {
                run_id: r.get(0)?,
                started_at: r.get(1)?,
                finished_at: r.get(2)?,
                tool_version: r.get(3)?,
                config_json: r.get(4)?,
                resumed: r.get::<_, i64>(5)? != 0,
                checked: r.get::<_, Option<i64>>(6)?.unwrap_or(0),
                error_count: r.get::<_, Option<i64>>(7)?.unwrap_or(0),
                stopped: r.get::<_, i64>(8)? != 0,
            }),
        ).optional()?;
        Ok(rec)
    }
}

pub(crate) fn outcome_from_row(row: &Row) -> Result<Outcome> {
    let url: String = row.get(0)?;
    let status: i64 = row.get(1)?;
    let ts: String = row.get(3)?;
    let timestamp = OffsetDateTime::parse(&ts, &Rfc3339)
        .with_context(|| format!("bad timestamp {ts:?} for {url}"))?;
    Ok(Outcome {
        status_code: u16::try_from(status).with_context(|| format!("bad status {status} for {url}"))?,
        error: row.get(2)?,
        url,
        timestamp,
    })
}
