use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::db::{format_at, parse_at};
use crate::error::{BudgeryError, Result};
use crate::models::{Account, NewTransaction, Sourcink, Transaction};

// ---------------------------------------------------------------------------
// Persistence contract used by the import orchestrator
// ---------------------------------------------------------------------------

/// The narrow write surface an import job needs. Implemented for a SQLite
/// connection; tests substitute their own.
pub trait Ledger {
    fn find_or_create_sourcink(&self, name: &str) -> Result<i64>;
    fn create_transaction(&self, txn: &NewTransaction) -> Result<i64>;
    fn mark_job_finished(&self, job_id: i64) -> Result<()>;
    fn mark_job_errored(&self, job_id: i64, reason: &str, detail: &str) -> Result<()>;
    fn set_job_institution(&self, job_id: i64, institution: &str) -> Result<()>;
}

impl Ledger for Connection {
    fn find_or_create_sourcink(&self, name: &str) -> Result<i64> {
        sourcink_get_or_create(self, name)
    }

    fn create_transaction(&self, txn: &NewTransaction) -> Result<i64> {
        transaction_create(self, txn)
    }

    fn mark_job_finished(&self, job_id: i64) -> Result<()> {
        crate::jobs::finish(self, job_id)
    }

    fn mark_job_errored(&self, job_id: i64, reason: &str, detail: &str) -> Result<()> {
        crate::jobs::fail(self, job_id, reason, detail)
    }

    fn set_job_institution(&self, job_id: i64, institution: &str) -> Result<()> {
        crate::jobs::set_institution(self, job_id, institution)
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Creates the account and the sourcink that stands for it in transactions.
pub fn account_create(conn: &Connection, name: &str, institution: Option<&str>) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO accounts (name, institution) VALUES (?1, ?2)",
        rusqlite::params![name, institution],
    )?;
    let account_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO sourcinks (name, account_id) VALUES (?1, ?2) \
         ON CONFLICT(name) DO UPDATE SET account_id = excluded.account_id \
         WHERE sourcinks.account_id IS NULL",
        rusqlite::params![name, account_id],
    )?;
    tx.commit()?;
    tracing::info!(account_id, name, "created account");
    Ok(account_id)
}

pub fn account_list(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt =
        conn.prepare("SELECT id, name, institution, created_at FROM accounts ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
                institution: row.get(2)?,
                created_at: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn account_id_by_name(conn: &Connection, name: &str) -> Result<i64> {
    conn.query_row("SELECT id FROM accounts WHERE name = ?1", [name], |row| row.get(0))
        .optional()?
        .ok_or_else(|| BudgeryError::UnknownAccount(name.to_string()))
}

// ---------------------------------------------------------------------------
// Sourcinks
// ---------------------------------------------------------------------------

/// Insert-or-ignore then select, so concurrent importers racing on the same
/// name all end up with the single row the UNIQUE constraint lets through.
pub fn sourcink_get_or_create(conn: &Connection, name: &str) -> Result<i64> {
    let inserted = conn.execute(
        "INSERT INTO sourcinks (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
        [name],
    )?;
    if inserted > 0 {
        tracing::debug!(name, "created sourcink");
    }
    let id = conn.query_row("SELECT id FROM sourcinks WHERE name = ?1", [name], |row| row.get(0))?;
    Ok(id)
}

pub fn sourcink_list(conn: &Connection, name_filter: Option<&str>) -> Result<Vec<Sourcink>> {
    let pattern = format!("%{}%", name_filter.unwrap_or(""));
    let mut stmt = conn.prepare(
        "SELECT id, name, account_id FROM sourcinks WHERE name LIKE ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map([pattern], |row| {
            Ok(Sourcink {
                id: row.get(0)?,
                name: row.get(1)?,
                account_id: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

pub fn transaction_create(conn: &Connection, txn: &NewTransaction) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions (account_id_from, account_id_to, amount, at, description, category, \
         sourcink_id_from, sourcink_id_to, import_job_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            txn.account_id_from,
            txn.account_id_to,
            txn.amount,
            format_at(&txn.at),
            txn.description,
            txn.category,
            txn.sourcink_id_from,
            txn.sourcink_id_to,
            txn.import_job_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Filter for [`transaction_list`]. `category` of `"None"` selects uncategorized rows.
#[derive(Debug, Default)]
pub struct TransactionFilter<'a> {
    pub category: Option<&'a str>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

const TRANSACTION_COLUMNS: &str = "id, account_id_from, account_id_to, amount, at, description, category, \
     sourcink_id_from, sourcink_id_to, import_job_id, budget_entry_id";

fn transaction_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    let raw_at: String = row.get(4)?;
    let at = parse_at(&raw_at).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Transaction {
        id: row.get(0)?,
        account_id_from: row.get(1)?,
        account_id_to: row.get(2)?,
        amount: row.get(3)?,
        at,
        description: row.get(5)?,
        category: row.get(6)?,
        sourcink_id_from: row.get(7)?,
        sourcink_id_to: row.get(8)?,
        import_job_id: row.get(9)?,
        budget_entry_id: row.get(10)?,
    })
}

/// Newest first.
pub fn transaction_list(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<String> = Vec::new();
    match filter.category {
        Some("None") => clauses.push("category IS NULL"),
        Some(category) => {
            params.push(category.to_string());
            clauses.push("category = ?");
        }
        None => {}
    }
    if let Some(start) = &filter.start {
        params.push(format_at(start));
        clauses.push("at >= ?");
    }
    if let Some(end) = &filter.end {
        params.push(format_at(end));
        clauses.push("at <= ?");
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions{where_clause} ORDER BY at DESC, id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), transaction_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn transactions_for_job(conn: &Connection, job_id: i64) -> Result<Vec<Transaction>> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE import_job_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([job_id], transaction_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct CategoryCount {
    pub name: Option<String>,
    pub transaction_count: i64,
}

pub fn category_list(conn: &Connection) -> Result<Vec<CategoryCount>> {
    let mut stmt = conn.prepare(
        "SELECT category, count(*) FROM transactions GROUP BY category ORDER BY category",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CategoryCount {
                name: row.get(0)?,
                transaction_count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn txn(amount: f64, when: NaiveDateTime, category: Option<&str>) -> NewTransaction {
        NewTransaction {
            account_id_from: None,
            account_id_to: None,
            amount,
            at: when,
            description: Some("test".to_string()),
            category: category.map(str::to_string),
            sourcink_id_from: None,
            sourcink_id_to: None,
            import_job_id: None,
        }
    }

    #[test]
    fn test_account_create_adds_linked_sourcink() {
        let (_dir, conn) = test_db();
        let id = account_create(&conn, "Ally Checking", Some("Ally")).unwrap();
        let sourcinks = sourcink_list(&conn, None).unwrap();
        assert_eq!(sourcinks.len(), 1);
        assert_eq!(sourcinks[0].name, "Ally Checking");
        assert_eq!(sourcinks[0].account_id, Some(id));
        assert_eq!(account_id_by_name(&conn, "Ally Checking").unwrap(), id);
    }

    #[test]
    fn test_unknown_account_errors() {
        let (_dir, conn) = test_db();
        assert!(matches!(
            account_id_by_name(&conn, "Nope"),
            Err(BudgeryError::UnknownAccount(_))
        ));
    }

    #[test]
    fn test_sourcink_get_or_create_is_idempotent() {
        let (_dir, conn) = test_db();
        let a = sourcink_get_or_create(&conn, "Unknown").unwrap();
        let b = sourcink_get_or_create(&conn, "Unknown").unwrap();
        assert_eq!(a, b);
        assert_eq!(sourcink_list(&conn, None).unwrap().len(), 1);
    }

    #[test]
    fn test_sourcink_get_or_create_from_many_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        crate::db::init_db(&crate::db::get_connection(&path).unwrap()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let conn = crate::db::get_connection(&path).unwrap();
                    (0..20)
                        .map(|i| sourcink_get_or_create(&conn, &format!("Payee {}", i % 5)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<Vec<i64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &ids[1..] {
            assert_eq!(&ids[0], other);
        }
        let conn = crate::db::get_connection(&path).unwrap();
        assert_eq!(sourcink_list(&conn, Some("Payee")).unwrap().len(), 5);
    }

    #[test]
    fn test_sourcink_list_filters_by_substring() {
        let (_dir, conn) = test_db();
        sourcink_get_or_create(&conn, "Smith's Marketplace").unwrap();
        sourcink_get_or_create(&conn, "Maverik").unwrap();
        let found = sourcink_list(&conn, Some("Market")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Smith's Marketplace");
    }

    #[test]
    fn test_transaction_list_newest_first_and_filtered() {
        let (_dir, conn) = test_db();
        transaction_create(&conn, &txn(-10.0, at(2024, 1, 5), Some("Groceries"))).unwrap();
        transaction_create(&conn, &txn(-20.0, at(2024, 2, 5), None)).unwrap();
        transaction_create(&conn, &txn(100.0, at(2024, 3, 5), Some("Paycheck"))).unwrap();

        let all = transaction_list(&conn, &TransactionFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].amount, 100.0);
        assert_eq!(all[2].at, at(2024, 1, 5));

        let uncategorized = transaction_list(
            &conn,
            &TransactionFilter { category: Some("None"), ..Default::default() },
        )
        .unwrap();
        assert_eq!(uncategorized.len(), 1);
        assert_eq!(uncategorized[0].amount, -20.0);

        let groceries = transaction_list(
            &conn,
            &TransactionFilter { category: Some("Groceries"), ..Default::default() },
        )
        .unwrap();
        assert_eq!(groceries.len(), 1);

        let window = transaction_list(
            &conn,
            &TransactionFilter {
                start: Some(at(2024, 2, 1)),
                end: Some(at(2024, 2, 28)),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].amount, -20.0);
    }

    #[test]
    fn test_category_list_counts() {
        let (_dir, conn) = test_db();
        transaction_create(&conn, &txn(-1.0, at(2024, 1, 1), Some("Gas"))).unwrap();
        transaction_create(&conn, &txn(-2.0, at(2024, 1, 2), Some("Gas"))).unwrap();
        transaction_create(&conn, &txn(-3.0, at(2024, 1, 3), None)).unwrap();
        let cats = category_list(&conn).unwrap();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].name, None);
        assert_eq!(cats[0].transaction_count, 1);
        assert_eq!(cats[1].name.as_deref(), Some("Gas"));
        assert_eq!(cats[1].transaction_count, 2);
    }
}
