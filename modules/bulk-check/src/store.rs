//! Durable outcome log, also the resume checkpoint.

use anyhow::{anyhow, Result};
use results_sqlite::{Db, Outcome, RunMeta};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Storage seam used by the engine. Calls are blocking; the engine runs them
/// on the blocking pool.
pub trait ResultStore: Send + Sync + 'static {
    /// Remove every recorded outcome (fresh, non-resume run).
    fn clear(&self) -> Result<()>;
    /// Append one outcome. Each call is atomic on its own.
    fn record(&self, outcome: &Outcome) -> Result<()>;
    fn checked_urls(&self) -> Result<HashSet<String>>;
    fn outcomes(&self) -> Result<Vec<Outcome>>;
    fn export_csv(&self, out: &mut dyn Write) -> Result<usize>;

    fn begin_run(&self, _meta: &RunMeta) -> Result<()> {
        Ok(())
    }

    fn finish_run(&self, _run_id: &Uuid, _checked: usize, _errors: usize, _stopped: bool) -> Result<()> {
        Ok(())
    }
}

/// SQLite-backed store. The connection is not `Sync`, so writes from the pool
/// are serialized through a mutex.
pub struct SqliteStore {
    db: Mutex<Db>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_db(Db::open_or_create(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_db(Db::open_in_memory()?))
    }

    pub fn from_db(db: Db) -> Self {
        SqliteStore { db: Mutex::new(db) }
    }

    fn db(&self) -> Result<MutexGuard<'_, Db>> {
        self.db.lock().map_err(|_| anyhow!("results db lock poisoned"))
    }
}

impl ResultStore for SqliteStore {
    fn clear(&self) -> Result<()> {
        let removed = self.db()?.clear_results()?;
        tracing::debug!(removed, "cleared previous results");
        Ok(())
    }

    fn record(&self, outcome: &Outcome) -> Result<()> {
        self.db()?.insert_outcome(outcome)
    }

    fn checked_urls(&self) -> Result<HashSet<String>> {
        self.db()?.checked_urls()
    }

    fn outcomes(&self) -> Result<Vec<Outcome>> {
        self.db()?.outcomes()
    }

    fn export_csv(&self, out: &mut dyn Write) -> Result<usize> {
        self.db()?.export_csv(out)
    }

    fn begin_run(&self, meta: &RunMeta) -> Result<()> {
        self.db()?.begin_run(meta)?;
        Ok(())
    }

    fn finish_run(&self, run_id: &Uuid, checked: usize, errors: usize, stopped: bool) -> Result<()> {
        let finished_at = crate::now_rfc3339();
        self.db()?.finish_run(run_id, &finished_at, checked as i64, errors as i64, stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_store_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        store.record(&Outcome::new("https://a.com", 200, None)).unwrap();
        store.record(&Outcome::new("https://b.com", 0, Some("refused".into()))).unwrap();
        assert_eq!(store.checked_urls().unwrap().len(), 2);
        assert_eq!(store.outcomes().unwrap()[1].status_code, 0);

        let mut buf = Vec::new();
        assert_eq!(store.export_csv(&mut buf).unwrap(), 2);

        store.clear().unwrap();
        assert!(store.outcomes().unwrap().is_empty());
    }
}
