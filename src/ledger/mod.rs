//! Completion ledger: the durable, append-only record of which repositories
//! have been processed.
//!
//! At-most-once processing rests on the `UNIQUE` constraint on `repository_id`,
//! not on anything held in memory. Recording a repository twice is expected
//! after a crash between pushing and recording, so it is logged and ignored.

mod schema;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use crate::models::{CompletionRecord, Outcome, Repository};

#[derive(Clone)]
pub struct Ledger {
    conn: Arc<Mutex<Connection>>,
}

impl Ledger {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Ledger path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        schema::run_migrations(&conn)
    }

    /// Record that `repo` has been processed.
    ///
    /// Returns `Ok(false)` without touching the existing row when the
    /// repository is already recorded.
    pub fn record(&self, repo: &Repository, outcome: Outcome) -> Result<bool> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let inserted = conn.execute(
            "INSERT INTO repositories (display_name, owner, repository_id, created_at, did_migrate)
             VALUES (?, ?, ?, ?, ?)",
            (
                &repo.name,
                &repo.owner,
                repo.id,
                Utc::now().to_rfc3339(),
                outcome.did_migrate(),
            ),
        );

        match inserted {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                tracing::info!(
                    repo_id = repo.id,
                    repo = %repo.full_name(),
                    outcome = outcome.as_str(),
                    "Repository is already registered as processed"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Identifiers of every repository recorded so far.
    pub fn processed_ids(&self) -> Result<HashSet<i64>> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let mut stmt = conn.prepare("SELECT repository_id FROM repositories")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<HashSet<i64>, _>>()?;
        Ok(ids)
    }

    pub fn records(&self) -> Result<Vec<CompletionRecord>> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, display_name, owner, repository_id, created_at, did_migrate
             FROM repositories ORDER BY id",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(CompletionRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    owner: row.get(2)?,
                    repository_id: row.get(3)?,
                    created_at: parse_datetime(row.get::<_, String>(4)?),
                    outcome: Outcome::from_did_migrate(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
