pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS evaluations (
  evaluation_id TEXT NOT NULL UNIQUE,
  submission_id TEXT NOT NULL,
  evaluated_at TEXT NOT NULL,
  task_id TEXT NOT NULL,
  commit_sha TEXT NOT NULL,
  final_verdict TEXT NOT NULL,
  score REAL NOT NULL,
  stage_results_json TEXT NOT NULL,
  PRIMARY KEY (submission_id, evaluated_at)
);

CREATE INDEX IF NOT EXISTS idx_evaluations_commit
  ON evaluations(submission_id, commit_sha);

CREATE TRIGGER IF NOT EXISTS evaluations_no_update
BEFORE UPDATE ON evaluations
BEGIN
  SELECT RAISE(ABORT, 'evaluations are append-only');
END;

CREATE TRIGGER IF NOT EXISTS evaluations_no_delete
BEFORE DELETE ON evaluations
BEGIN
  SELECT RAISE(ABORT, 'evaluations are append-only');
END;
"#;
