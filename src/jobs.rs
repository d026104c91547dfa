use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{BudgeryError, Result};
use crate::models::{ImportJob, ImportJobStatus};

const JOB_COLUMNS: &str = "id, account_id, owner, filename, checksum, status, institution, \
     error_reason, error_detail, created_at, finished_at";

fn job_from_row(row: &Row) -> rusqlite::Result<ImportJob> {
    let raw_status: String = row.get(5)?;
    let status = ImportJobStatus::parse(&raw_status).ok_or_else(|| {
        let err = BudgeryError::Other(format!("unknown import job status {raw_status:?}"));
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(ImportJob {
        id: row.get(0)?,
        account_id: row.get(1)?,
        owner: row.get(2)?,
        filename: row.get(3)?,
        checksum: row.get(4)?,
        status,
        institution: row.get(6)?,
        error_reason: row.get(7)?,
        error_detail: row.get(8)?,
        created_at: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        finished_at: row.get(10)?,
    })
}

pub fn create(
    conn: &Connection,
    account_id: i64,
    owner: &str,
    filename: &str,
    checksum: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO import_jobs (account_id, owner, filename, checksum, status) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![account_id, owner, filename, checksum, ImportJobStatus::Started.as_str()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(job_id = id, account_id, filename, "created import job");
    Ok(id)
}

/// Moves a job out of `started`. A job that already reached a terminal state is left alone.
fn resolve(
    conn: &Connection,
    job_id: i64,
    status: ImportJobStatus,
    reason: Option<&str>,
    detail: Option<&str>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE import_jobs SET status = ?1, error_reason = ?2, error_detail = ?3, \
         finished_at = datetime('now') WHERE id = ?4 AND status = 'started'",
        rusqlite::params![status.as_str(), reason, detail, job_id],
    )?;
    if changed == 0 {
        let exists: bool = conn
            .query_row("SELECT 1 FROM import_jobs WHERE id = ?1", [job_id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(BudgeryError::UnknownJob(job_id));
        }
        tracing::warn!(job_id, status = status.as_str(), "import job already resolved");
    }
    Ok(())
}

pub fn finish(conn: &Connection, job_id: i64) -> Result<()> {
    resolve(conn, job_id, ImportJobStatus::Finished, None, None)
}

pub fn fail(conn: &Connection, job_id: i64, reason: &str, detail: &str) -> Result<()> {
    resolve(conn, job_id, ImportJobStatus::Error, Some(reason), Some(detail))
}

pub fn set_institution(conn: &Connection, job_id: i64, institution: &str) -> Result<()> {
    conn.execute(
        "UPDATE import_jobs SET institution = ?1 WHERE id = ?2",
        rusqlite::params![institution, job_id],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, job_id: i64) -> Result<ImportJob> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = ?1");
    conn.query_row(&sql, [job_id], job_from_row)
        .optional()?
        .ok_or(BudgeryError::UnknownJob(job_id))
}

/// Oldest first.
pub fn list(conn: &Connection) -> Result<Vec<ImportJob>> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM import_jobs ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], job_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::ledger::account_create;

    fn new_job(conn: &Connection) -> i64 {
        let account_id = account_create(conn, "Checking", None).unwrap();
        create(conn, account_id, "alice", "ally.csv", "abc123").unwrap()
    }

    #[test]
    fn test_new_job_is_started() {
        let (_dir, conn) = test_db();
        let id = new_job(&conn);
        let job = get(&conn, id).unwrap();
        assert_eq!(job.status, ImportJobStatus::Started);
        assert_eq!(job.owner, "alice");
        assert_eq!(job.filename, "ally.csv");
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_finish_sets_terminal_state() {
        let (_dir, conn) = test_db();
        let id = new_job(&conn);
        finish(&conn, id).unwrap();
        let job = get(&conn, id).unwrap();
        assert_eq!(job.status, ImportJobStatus::Finished);
        assert!(job.finished_at.is_some());
        assert!(job.error_reason.is_none());
    }

    #[test]
    fn test_fail_records_reason() {
        let (_dir, conn) = test_db();
        let id = new_job(&conn);
        fail(&conn, id, "unrecognized_schema", "header [\"A\"]").unwrap();
        let job = get(&conn, id).unwrap();
        assert_eq!(job.status, ImportJobStatus::Error);
        assert_eq!(job.error_reason.as_deref(), Some("unrecognized_schema"));
    }

    #[test]
    fn test_job_resolves_only_once() {
        let (_dir, conn) = test_db();
        let id = new_job(&conn);
        fail(&conn, id, "malformed_row", "row 2").unwrap();
        finish(&conn, id).unwrap();
        assert_eq!(get(&conn, id).unwrap().status, ImportJobStatus::Error);
    }

    #[test]
    fn test_unknown_job() {
        let (_dir, conn) = test_db();
        assert!(matches!(finish(&conn, 99), Err(BudgeryError::UnknownJob(99))));
        assert!(matches!(get(&conn, 99), Err(BudgeryError::UnknownJob(99))));
    }

    #[test]
    fn test_unknown_status_is_a_read_error() {
        let (_dir, conn) = test_db();
        let id = new_job(&conn);
        conn.execute("UPDATE import_jobs SET status = 'paused' WHERE id = ?1", [id])
            .unwrap();
        let err = get(&conn, id).unwrap_err();
        assert!(matches!(
            err,
            BudgeryError::Db(rusqlite::Error::FromSqlConversionFailure(5, _, _))
        ));
        assert!(list(&conn).is_err());
    }

    #[test]
    fn test_list_in_creation_order() {
        let (_dir, conn) = test_db();
        let first = new_job(&conn);
        let account_id = crate::ledger::account_id_by_name(&conn, "Checking").unwrap();
        let second = create(&conn, account_id, "alice", "amex.xlsx", "def456").unwrap();
        set_institution(&conn, second, "Amex").unwrap();
        let jobs = list(&conn).unwrap();
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(jobs[1].institution.as_deref(), Some("Amex"));
    }
}
