use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::error::{BudgeryError, Result};

pub const DB_FILE: &str = "budgery.db";

const AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    institution TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sourcinks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    account_id INTEGER,
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS import_jobs (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    owner TEXT NOT NULL DEFAULT '',
    filename TEXT NOT NULL,
    checksum TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'started',
    institution TEXT,
    error_reason TEXT,
    error_detail TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    finished_at TEXT,
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS budget_history (
    id INTEGER NOT NULL,
    version INTEGER NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    changed_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (id, version)
);

CREATE TABLE IF NOT EXISTS budget_entries (
    id INTEGER PRIMARY KEY,
    budget_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    amount REAL NOT NULL,
    category TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    version INTEGER NOT NULL DEFAULT 1,
    FOREIGN KEY (budget_id) REFERENCES budgets(id)
);

CREATE TABLE IF NOT EXISTS budget_entry_history (
    id INTEGER NOT NULL,
    version INTEGER NOT NULL,
    budget_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    amount REAL NOT NULL,
    category TEXT,
    changed_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (id, version)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    account_id_from INTEGER,
    account_id_to INTEGER,
    amount REAL NOT NULL,
    at TEXT NOT NULL,
    description TEXT,
    category TEXT,
    sourcink_id_from INTEGER,
    sourcink_id_to INTEGER,
    import_job_id INTEGER,
    budget_entry_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (account_id_from) REFERENCES accounts(id),
    FOREIGN KEY (account_id_to) REFERENCES accounts(id),
    FOREIGN KEY (sourcink_id_from) REFERENCES sourcinks(id),
    FOREIGN KEY (sourcink_id_to) REFERENCES sourcinks(id),
    FOREIGN KEY (import_job_id) REFERENCES import_jobs(id),
    FOREIGN KEY (budget_entry_id) REFERENCES budget_entries(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_at ON transactions(at);
CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    // Import workers write concurrently; wait on the lock instead of failing with SQLITE_BUSY.
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn format_at(at: &NaiveDateTime) -> String {
    at.format(AT_FORMAT).to_string()
}

pub fn parse_at(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, AT_FORMAT)
        .map_err(|_| BudgeryError::InvalidDate(raw.to_string()))
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| BudgeryError::InvalidDate(raw.to_string()))
}

/// Accepts `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` (also with a `T` separator).
pub fn parse_user_at(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for fmt in [AT_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(at);
        }
    }
    parse_date(raw).map(|d| d.and_time(chrono::NaiveTime::MIN))
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "accounts",
            "sourcinks",
            "import_jobs",
            "budgets",
            "budget_history",
            "budget_entries",
            "budget_entry_history",
            "transactions",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_sourcink_names_are_unique() {
        let (_dir, conn) = test_db();
        conn.execute("INSERT INTO sourcinks (name) VALUES ('Unknown')", []).unwrap();
        assert!(conn.execute("INSERT INTO sourcinks (name) VALUES ('Unknown')", []).is_err());
    }

    #[test]
    fn test_at_roundtrip() {
        let at = NaiveDate::from_ymd_opt(2023, 1, 12).unwrap().and_hms_opt(18, 42, 7).unwrap();
        assert_eq!(format_at(&at), "2023-01-12 18:42:07");
        assert_eq!(parse_at("2023-01-12 18:42:07").unwrap(), at);
        assert!(parse_at("01/12/2023").is_err());
    }

    #[test]
    fn test_parse_user_at_accepts_date_only() {
        let at = parse_user_at("2024-03-05").unwrap();
        assert_eq!(format_at(&at), "2024-03-05 00:00:00");
        let at = parse_user_at("2024-03-05T09:30:00").unwrap();
        assert_eq!(format_at(&at), "2024-03-05 09:30:00");
        assert!(parse_user_at("March 5").is_err());
    }
}
