use rusqlite::{params, Connection};

use crate::batch::JobDescriptor;
use crate::error::{Result, RoiError};

/// Ordered list of saved jobs. Jobs are never edited after they are saved;
/// they can only be appended or deleted.
pub trait JobStore {
    fn append(&mut self, job: &JobDescriptor) -> Result<()>;

    /// Every job, oldest first.
    fn list(&self) -> Result<Vec<JobDescriptor>>;

    /// Delete the job at a zero-based position in `list()` order.
    fn delete(&mut self, index: usize) -> Result<JobDescriptor>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn out_of_range(index: usize, len: usize) -> RoiError {
    RoiError::config(format!(
        "no saved job at position {} ({} saved)",
        index + 1,
        len
    ))
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Vec<JobDescriptor>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn append(&mut self, job: &JobDescriptor) -> Result<()> {
        self.jobs.push(job.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<JobDescriptor>> {
        Ok(self.jobs.clone())
    }

    fn delete(&mut self, index: usize) -> Result<JobDescriptor> {
        if index >= self.jobs.len() {
            return Err(out_of_range(index, self.jobs.len()));
        }
        Ok(self.jobs.remove(index))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.jobs.len())
    }
}

/// Jobs persisted as one JSON payload per row, ordered by row id.
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS saved_jobs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              payload_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn rows(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload_json FROM saved_jobs ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl JobStore for SqliteJobStore {
    fn append(&mut self, job: &JobDescriptor) -> Result<()> {
        let payload_json = serde_json::to_string(job)?;
        self.conn.execute(
            "INSERT INTO saved_jobs(name, payload_json) VALUES (?1, ?2)",
            params![job.name, payload_json],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<JobDescriptor>> {
        self.rows()?
            .into_iter()
            .map(|(_, payload)| serde_json::from_str(&payload).map_err(RoiError::from))
            .collect()
    }

    fn delete(&mut self, index: usize) -> Result<JobDescriptor> {
        let rows = self.rows()?;
        let len = rows.len();
        let (id, payload) = rows
            .into_iter()
            .nth(index)
            .ok_or_else(|| out_of_range(index, len))?;
        let job: JobDescriptor = serde_json::from_str(&payload)?;
        self.conn
            .execute("DELETE FROM saved_jobs WHERE id = ?1", params![id])?;
        Ok(job)
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM saved_jobs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
