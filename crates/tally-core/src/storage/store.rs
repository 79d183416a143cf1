use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::ResultSink;
use crate::model::{EvaluationResult, StageResult, Verdict};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

type RawRow = (String, String, String, String, String, String, f64, String);

const SELECT_COLUMNS: &str = "evaluation_id, submission_id, evaluated_at, task_id, commit_sha, \
                              final_verdict, score, stage_results_json";

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("result store mutex poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(super::schema::DDL)
            .context("failed to initialize result store schema")?;
        Ok(())
    }

    pub fn insert(&self, r: &EvaluationResult) -> anyhow::Result<()> {
        let stages = serde_json::to_string(&r.stage_results)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO evaluations (evaluation_id, submission_id, evaluated_at, task_id, commit_sha,
                                      final_verdict, score, stage_results_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                r.evaluation_id.to_string(),
                r.submission_id,
                r.evaluated_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                r.task_id,
                r.commit_sha,
                r.final_verdict.as_str(),
                r.score,
                stages,
            ],
        )
        .with_context(|| format!("failed to store evaluation for {}", r.submission_id))?;
        Ok(())
    }

    /// All evaluations of a submission, oldest first.
    pub fn history(&self, submission_id: &str) -> anyhow::Result<Vec<EvaluationResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM evaluations WHERE submission_id = ?1 ORDER BY evaluated_at ASC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![submission_id], read_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode).collect()
    }

    pub fn latest(&self, submission_id: &str) -> anyhow::Result<Option<EvaluationResult>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM evaluations WHERE submission_id = ?1
                     ORDER BY evaluated_at DESC LIMIT 1",
                    SELECT_COLUMNS
                ),
                params![submission_id],
                read_raw,
            )
            .optional()?;
        raw.map(decode).transpose()
    }

    /// Distinct submission ids with at least one stored evaluation, sorted.
    pub fn graded_submissions(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT submission_id FROM evaluations ORDER BY submission_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode(raw: RawRow) -> anyhow::Result<EvaluationResult> {
    let (evaluation_id, submission_id, evaluated_at, task_id, commit_sha, verdict, score, stages) =
        raw;
    let stage_results: Vec<StageResult> = serde_json::from_str(&stages)
        .with_context(|| format!("corrupt stage results for {}", evaluation_id))?;
    Ok(EvaluationResult {
        evaluation_id: Uuid::parse_str(&evaluation_id)
            .with_context(|| format!("corrupt evaluation id {}", evaluation_id))?,
        final_verdict: Verdict::parse(&verdict)
            .ok_or_else(|| anyhow::anyhow!("unknown verdict {} in {}", verdict, evaluation_id))?,
        evaluated_at: DateTime::parse_from_rfc3339(&evaluated_at)
            .with_context(|| format!("corrupt timestamp {}", evaluated_at))?
            .with_timezone(&Utc),
        submission_id,
        task_id,
        commit_sha,
        stage_results,
        score,
    })
}

impl ResultSink for Store {
    fn append(&self, result: &EvaluationResult) -> anyhow::Result<()> {
        self.insert(result)
    }
}
