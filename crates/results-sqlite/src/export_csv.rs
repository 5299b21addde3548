use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::query::outcome_from_row;
use crate::Db;

pub const CSV_HEADER: [&str; 4] = ["url", "status_code", "error", "timestamp"];

impl Db {
    /// Stream every outcome as CSV (header row first). Returns the row count.
    pub fn export_csv<W: Write>(&self, out: W) -> Result<usize> {
        let mut stmt = self.conn.prepare("SELECT url, status_code, error, timestamp FROM results ORDER BY id")?;
        let mut rows = stmt.query([])?;
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(CSV_HEADER)?;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            let o = outcome_from_row(row)?;
            let status = o.status_code.to_string();
            let ts = o.timestamp_rfc3339();
            wtr.write_record([
                o.url.as_str(),
                status.as_str(),
                o.error.as_deref().unwrap_or_default(),
                ts.as_str(),
            ])?;
            count += 1;
        }
        wtr.flush()?;
        Ok(count)
    }

    pub fn export_csv_file(&self, path: &Path) -> Result<usize> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        self.export_csv(std::io::BufWriter::new(file))
    }
}
