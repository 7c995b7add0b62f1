// ============================================================
// Layer 6 — Corpus Stores
// ============================================================
// Two CorpusStore implementations:
//
//   SqliteCorpusStore   → the durable store used by the CLI
//   InMemoryCorpusStore → same semantics in a Vec, for tests and
//                         throwaway runs
//
// Concepts are stored as a JSON array column; enums as their
// lowercase names; timestamps as RFC 3339 text.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, types::Type, Connection, Row};

use crate::domain::example::{
    ExampleId, NewExample, TrainingExample, TrainingSession, ValidationStatus,
};
use crate::domain::traits::CorpusStore;
use crate::error::{PipelineError, Result};
use crate::infra::now_rfc3339;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS training_examples (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        problem_text      TEXT    NOT NULL,
        solution_text     TEXT    NOT NULL,
        concepts          TEXT    NOT NULL DEFAULT '[]',
        difficulty        TEXT    NOT NULL DEFAULT 'intermediate',
        contributor       TEXT    NOT NULL DEFAULT 'Anonymous',
        created_at        TEXT    NOT NULL,
        consumed          INTEGER NOT NULL DEFAULT 0,
        validation_status TEXT    NOT NULL DEFAULT 'pending'
    );
    CREATE INDEX IF NOT EXISTS idx_examples_trainable
        ON training_examples (consumed, validation_status);
    CREATE TABLE IF NOT EXISTS training_sessions (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        training_id   TEXT    NOT NULL,
        model_name    TEXT    NOT NULL,
        version       TEXT    NOT NULL,
        accuracy      REAL    NOT NULL,
        corpus_size   INTEGER NOT NULL,
        duration_secs REAL    NOT NULL,
        created_at    TEXT    NOT NULL
    );";

const EXAMPLE_COLUMNS: &str = "id, problem_text, solution_text, concepts, difficulty, \
                               contributor, created_at, consumed, validation_status";

// ─── SQLite ───────────────────────────────────────────────────────────────────

pub struct SqliteCorpusStore {
    conn: Mutex<Connection>,
}

impl SqliteCorpusStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn row_to_example(row: &Row<'_>) -> rusqlite::Result<TrainingExample> {
    let concepts: String = row.get(3)?;
    let difficulty: String = row.get(4)?;
    let status: String = row.get(8)?;
    Ok(TrainingExample {
        id: row.get(0)?,
        problem_text: row.get(1)?,
        solution_text: row.get(2)?,
        concepts: serde_json::from_str(&concepts).map_err(|e| conversion_error(3, e))?,
        difficulty: difficulty.parse().map_err(|e: String| conversion_error(4, e))?,
        contributor: row.get(5)?,
        created_at: row.get(6)?,
        consumed: row.get(7)?,
        validation_status: status.parse().map_err(|e: String| conversion_error(8, e))?,
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<TrainingSession> {
    let corpus_size: i64 = row.get(4)?;
    Ok(TrainingSession {
        training_id: row.get(0)?,
        model_name: row.get(1)?,
        version: row.get(2)?,
        accuracy: row.get(3)?,
        corpus_size: corpus_size.max(0) as usize,
        duration_secs: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn conversion_error(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

impl CorpusStore for SqliteCorpusStore {
    fn fetch_unconsumed_approved(&self) -> Result<Vec<TrainingExample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXAMPLE_COLUMNS} FROM training_examples
             WHERE consumed = 0 AND validation_status = 'approved'
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_example)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn mark_consumed(&self, ids: &[ExampleId]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE training_examples SET consumed = 1 WHERE id = ?1 AND consumed = 0",
            )?;
            for id in ids {
                updated += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    fn append_submission(&self, example: NewExample) -> Result<ExampleId> {
        let concepts = serde_json::to_string(&example.concepts)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO training_examples
                (problem_text, solution_text, concepts, difficulty, contributor,
                 created_at, consumed, validation_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                example.problem_text,
                example.solution_text,
                concepts,
                example.difficulty.as_str(),
                example.contributor,
                now_rfc3339(),
                example.validation_status.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn append_training_session(&self, session: &TrainingSession) -> Result<()> {
        self.conn().execute(
            "INSERT INTO training_sessions
                (training_id, model_name, version, accuracy, corpus_size, duration_secs, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.training_id,
                session.model_name,
                session.version,
                session.accuracy,
                session.corpus_size as i64,
                session.duration_secs,
                session.created_at,
            ],
        )?;
        Ok(())
    }

    fn set_validation_status(&self, id: ExampleId, status: ValidationStatus) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE training_examples SET validation_status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        if updated == 0 {
            return Err(PipelineError::ExampleNotFound(id));
        }
        Ok(())
    }

    fn list_examples(&self, page: usize, per_page: usize) -> Result<Vec<TrainingExample>> {
        let offset = page.max(1).saturating_sub(1).saturating_mul(per_page);
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXAMPLE_COLUMNS} FROM training_examples
             ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![per_page as i64, offset as i64], row_to_example)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn training_history(&self) -> Result<Vec<TrainingSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT training_id, model_name, version, accuracy, corpus_size, duration_secs, created_at
             FROM training_sessions ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

// ─── In-memory ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    rows:     Vec<TrainingExample>,
    sessions: Vec<TrainingSession>,
    next_id:  ExampleId,
}

#[derive(Default)]
pub struct InMemoryCorpusStore {
    state: Mutex<MemoryState>,
}

impl InMemoryCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CorpusStore for InMemoryCorpusStore {
    fn fetch_unconsumed_approved(&self) -> Result<Vec<TrainingExample>> {
        Ok(self.state().rows.iter().filter(|r| r.is_trainable()).cloned().collect())
    }

    fn mark_consumed(&self, ids: &[ExampleId]) -> Result<usize> {
        let mut state = self.state();
        let mut updated = 0;
        for row in state.rows.iter_mut().filter(|r| ids.contains(&r.id) && !r.consumed) {
            row.consumed = true;
            updated += 1;
        }
        Ok(updated)
    }

    fn append_submission(&self, example: NewExample) -> Result<ExampleId> {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.rows.push(TrainingExample {
            id,
            problem_text: example.problem_text,
            solution_text: example.solution_text,
            concepts: example.concepts,
            difficulty: example.difficulty,
            contributor: example.contributor,
            created_at: now_rfc3339(),
            consumed: false,
            validation_status: example.validation_status,
        });
        Ok(id)
    }

    fn append_training_session(&self, session: &TrainingSession) -> Result<()> {
        self.state().sessions.push(session.clone());
        Ok(())
    }

    fn set_validation_status(&self, id: ExampleId, status: ValidationStatus) -> Result<()> {
        let mut state = self.state();
        let row = state
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(PipelineError::ExampleNotFound(id))?;
        row.validation_status = status;
        Ok(())
    }

    fn list_examples(&self, page: usize, per_page: usize) -> Result<Vec<TrainingExample>> {
        let offset = page.max(1).saturating_sub(1).saturating_mul(per_page);
        Ok(self.state().rows.iter().rev().skip(offset).take(per_page).cloned().collect())
    }

    fn training_history(&self) -> Result<Vec<TrainingSession>> {
        Ok(self.state().sessions.clone())
    }
}
