use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use time::OffsetDateTime;

use super::{StateStore, StoreError};
use crate::domain::pr::{PrIdentity, RepoName};
use crate::domain::state::{IssueKind, IssueMarkers, PrState};

const SELECT_COLUMNS: &str = "repo, number, last_seen_review_id, last_seen_review_submitted_at, \
     last_nudged_review_id, last_nudge_at, review_nudge_count, failed_checks_notified_at, \
     merge_conflict_notified_at, changes_requested_notified_at, updated_at";

/// SQLite-backed state, one row per pull request. Timestamps are unix seconds.
pub struct SqliteStateStore {
    conn: Connection,
}

impl SqliteStateStore {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(default_state_path())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(StoreError::sqlite("open"))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, pr: &PrIdentity) -> Result<Option<PrState>, StoreError> {
        fetch_state(&self.conn, pr)
    }

    fn upsert_seen_review(
        &mut self,
        pr: &PrIdentity,
        review_id: u64,
        submitted_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO pr_state (repo, number, last_seen_review_id, last_seen_review_submitted_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(repo, number) DO UPDATE SET
                   last_seen_review_id = excluded.last_seen_review_id,
                   last_seen_review_submitted_at = excluded.last_seen_review_submitted_at,
                   updated_at = excluded.updated_at",
                params![
                    pr.repo.as_str(),
                    pr.number as i64,
                    review_id as i64,
                    to_unix(submitted_at),
                    to_unix(OffsetDateTime::now_utc()),
                ],
            )
            .map_err(StoreError::sqlite("upsert seen review"))?;
        Ok(())
    }

    fn record_nudge(
        &mut self,
        pr: &PrIdentity,
        review_id: u64,
        submitted_at: OffsetDateTime,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO pr_state (repo, number, last_seen_review_id, last_seen_review_submitted_at,
                                       last_nudged_review_id, last_nudge_at, review_nudge_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?3, ?5, 1, ?5)
                 ON CONFLICT(repo, number) DO UPDATE SET
                   last_seen_review_id = excluded.last_seen_review_id,
                   last_seen_review_submitted_at = excluded.last_seen_review_submitted_at,
                   last_nudged_review_id = excluded.last_nudged_review_id,
                   last_nudge_at = excluded.last_nudge_at,
                   review_nudge_count = pr_state.review_nudge_count + 1,
                   updated_at = excluded.updated_at",
                params![
                    pr.repo.as_str(),
                    pr.number as i64,
                    review_id as i64,
                    to_unix(submitted_at),
                    to_unix(at),
                ],
            )
            .map_err(StoreError::sqlite("record nudge"))?;
        Ok(())
    }

    fn upsert_issue_marker(
        &mut self,
        pr: &PrIdentity,
        kind: IssueKind,
        present: bool,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let column = marker_column(kind);
        let sql = format!(
            "INSERT INTO pr_state (repo, number, {column}, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(repo, number) DO UPDATE SET
               {column} = excluded.{column},
               updated_at = excluded.updated_at"
        );
        let marker = present.then(|| to_unix(at));
        self.conn
            .execute(
                &sql,
                params![pr.repo.as_str(), pr.number as i64, marker, to_unix(at)],
            )
            .map_err(StoreError::sqlite("upsert issue marker"))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<PrState>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM pr_state ORDER BY repo ASC, number ASC");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(StoreError::sqlite("prepare list"))?;
        let rows = stmt
            .query_map([], row_to_state)
            .map_err(StoreError::sqlite("list"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::sqlite("decode row"))
    }

    fn reset_review_counter(&mut self, pr: &PrIdentity) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE pr_state SET review_nudge_count = 0, updated_at = ?3
                 WHERE repo = ?1 AND number = ?2",
                params![
                    pr.repo.as_str(),
                    pr.number as i64,
                    to_unix(OffsetDateTime::now_utc())
                ],
            )
            .map_err(StoreError::sqlite("reset review counter"))?;
        Ok(changed > 0)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS pr_state (
  repo TEXT NOT NULL,
  number INTEGER NOT NULL,
  last_seen_review_id INTEGER NULL,
  last_seen_review_submitted_at INTEGER NULL,
  last_nudged_review_id INTEGER NULL,
  last_nudge_at INTEGER NULL,
  review_nudge_count INTEGER NOT NULL DEFAULT 0,
  failed_checks_notified_at INTEGER NULL,
  merge_conflict_notified_at INTEGER NULL,
  changes_requested_notified_at INTEGER NULL,
  updated_at INTEGER NOT NULL,
  PRIMARY KEY (repo, number)
);
"#,
    )
    .map_err(StoreError::sqlite("initialize schema"))
}

fn marker_column(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::FailedChecks => "failed_checks_notified_at",
        IssueKind::MergeConflict => "merge_conflict_notified_at",
        IssueKind::ChangesRequested => "changes_requested_notified_at",
    }
}

fn row_to_state(row: &Row) -> rusqlite::Result<PrState> {
    let repo: String = row.get("repo")?;
    let repo: RepoName = repo
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let number: i64 = row.get("number")?;

    Ok(PrState {
        pr: PrIdentity::new(repo, number as u64),
        last_seen_review_id: row.get::<_, Option<i64>>("last_seen_review_id")?.map(|v| v as u64),
        last_seen_review_submitted_at: opt_time(row, "last_seen_review_submitted_at")?,
        last_nudged_review_id: row
            .get::<_, Option<i64>>("last_nudged_review_id")?
            .map(|v| v as u64),
        last_nudge_at: opt_time(row, "last_nudge_at")?,
        review_nudge_count: row.get::<_, i64>("review_nudge_count")?.max(0) as u32,
        markers: IssueMarkers {
            failed_checks: opt_time(row, "failed_checks_notified_at")?,
            merge_conflict: opt_time(row, "merge_conflict_notified_at")?,
            changes_requested: opt_time(row, "changes_requested_notified_at")?,
        },
        updated_at: from_unix(row.get("updated_at")?)?,
    })
}

fn opt_time(row: &Row, column: &str) -> rusqlite::Result<Option<OffsetDateTime>> {
    row.get::<_, Option<i64>>(column)?.map(from_unix).transpose()
}

fn fetch_state(conn: &Connection, pr: &PrIdentity) -> Result<Option<PrState>, StoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM pr_state WHERE repo = ?1 AND number = ?2");
    conn.query_row(&sql, params![pr.repo.as_str(), pr.number as i64], row_to_state)
        .optional()
        .map_err(StoreError::sqlite("get"))
}

fn to_unix(time: OffsetDateTime) -> i64 {
    time.unix_timestamp()
}

fn from_unix(secs: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(e)))
}

pub fn default_state_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gh-nudger")
        .join("state.sqlite3")
}
