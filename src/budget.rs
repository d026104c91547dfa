use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::db::{format_date, parse_date};
use crate::error::{BudgeryError, Result};
use crate::ledger::{transaction_list, TransactionFilter};
use crate::models::{Budget, BudgetEntry, Transaction};

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_date(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn check_span(start: &NaiveDate, end: &NaiveDate) -> Result<()> {
    if start >= end {
        return Err(BudgeryError::Other(format!(
            "Budget must end after it starts ({start} .. {end})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

fn budget_from_row(row: &Row) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        start_date: date_column(row, 1)?,
        end_date: date_column(row, 2)?,
        version: row.get(3)?,
    })
}

/// `end` is exclusive.
pub fn budget_create(conn: &Connection, start: NaiveDate, end: NaiveDate) -> Result<i64> {
    check_span(&start, &end)?;
    conn.execute(
        "INSERT INTO budgets (start_date, end_date) VALUES (?1, ?2)",
        rusqlite::params![format_date(&start), format_date(&end)],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(budget_id = id, %start, %end, "created budget");
    Ok(id)
}

pub fn budget_get(conn: &Connection, id: i64) -> Result<Budget> {
    conn.query_row(
        "SELECT id, start_date, end_date, version FROM budgets WHERE id = ?1",
        [id],
        budget_from_row,
    )
    .optional()?
    .ok_or(BudgeryError::UnknownBudget(id))
}

pub fn budget_list(conn: &Connection) -> Result<Vec<Budget>> {
    let mut stmt =
        conn.prepare("SELECT id, start_date, end_date, version FROM budgets ORDER BY start_date, id")?;
    let rows = stmt
        .query_map([], budget_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Moves the current span into history and bumps the version.
pub fn budget_update(conn: &Connection, id: i64, start: NaiveDate, end: NaiveDate) -> Result<Budget> {
    check_span(&start, &end)?;
    let current = budget_get(conn, id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO budget_history (id, version, start_date, end_date) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            current.id,
            current.version,
            format_date(&current.start_date),
            format_date(&current.end_date)
        ],
    )?;
    tx.execute(
        "UPDATE budgets SET start_date = ?1, end_date = ?2, version = version + 1 WHERE id = ?3",
        rusqlite::params![format_date(&start), format_date(&end), id],
    )?;
    tx.commit()?;
    tracing::info!(budget_id = id, version = current.version + 1, "updated budget");
    budget_get(conn, id)
}

pub struct BudgetRevision {
    pub version: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub changed_at: String,
}

/// Superseded versions, oldest first. The live row is not included.
pub fn budget_history(conn: &Connection, id: i64) -> Result<Vec<BudgetRevision>> {
    budget_get(conn, id)?;
    let mut stmt = conn.prepare(
        "SELECT version, start_date, end_date, changed_at FROM budget_history \
         WHERE id = ?1 ORDER BY version",
    )?;
    let rows = stmt
        .query_map([id], |row| {
            Ok(BudgetRevision {
                version: row.get(0)?,
                start_date: date_column(row, 1)?,
                end_date: date_column(row, 2)?,
                changed_at: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn budget_transactions(conn: &Connection, budget: &Budget) -> Result<Vec<Transaction>> {
    let start = budget.start_date.and_time(chrono::NaiveTime::MIN);
    let rows = transaction_list(
        conn,
        &TransactionFilter {
            start: Some(start),
            ..Default::default()
        },
    )?;
    Ok(rows.into_iter().filter(|t| budget.contains(&t.at)).collect())
}

pub struct BudgetCounts {
    pub budgets: Vec<(Budget, i64)>,
    /// Transactions falling inside no budget's span.
    pub outside: i64,
}

pub fn transaction_count_by_budget(conn: &Connection) -> Result<BudgetCounts> {
    let budgets = budget_list(conn)?;
    let mut counts = Vec::with_capacity(budgets.len());
    for budget in budgets {
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM transactions WHERE at >= ?1 AND at < ?2",
            rusqlite::params![format_date(&budget.start_date), format_date(&budget.end_date)],
            |row| row.get(0),
        )?;
        counts.push((budget, count));
    }
    let outside: i64 = conn.query_row(
        "SELECT count(*) FROM transactions t WHERE NOT EXISTS \
         (SELECT 1 FROM budgets b WHERE t.at >= b.start_date AND t.at < b.end_date)",
        [],
        |row| row.get(0),
    )?;
    Ok(BudgetCounts {
        budgets: counts,
        outside,
    })
}

// ---------------------------------------------------------------------------
// Budget entries
// ---------------------------------------------------------------------------

const ENTRY_COLUMNS: &str = "id, budget_id, name, amount, category, created_at, version";

fn entry_from_row(row: &Row) -> rusqlite::Result<BudgetEntry> {
    Ok(BudgetEntry {
        id: row.get(0)?,
        budget_id: row.get(1)?,
        name: row.get(2)?,
        amount: row.get(3)?,
        category: row.get(4)?,
        created_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        version: row.get(6)?,
    })
}

pub fn entry_create(
    conn: &Connection,
    budget_id: i64,
    name: &str,
    amount: f64,
    category: Option<&str>,
) -> Result<i64> {
    budget_get(conn, budget_id)?;
    conn.execute(
        "INSERT INTO budget_entries (budget_id, name, amount, category) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![budget_id, name, amount, category],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(entry_id = id, budget_id, name, "created budget entry");
    Ok(id)
}

pub fn entry_get(conn: &Connection, id: i64) -> Result<BudgetEntry> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM budget_entries WHERE id = ?1");
    conn.query_row(&sql, [id], entry_from_row)
        .optional()?
        .ok_or(BudgeryError::UnknownBudgetEntry(id))
}

pub fn entry_list(conn: &Connection, budget_id: i64) -> Result<Vec<BudgetEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM budget_entries WHERE budget_id = ?1 ORDER BY category, name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([budget_id], entry_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Fields left `None` keep their current value. `category: Some(None)` clears it.
#[derive(Debug, Default)]
pub struct EntryChanges<'a> {
    pub name: Option<&'a str>,
    pub amount: Option<f64>,
    pub category: Option<Option<&'a str>>,
}

pub fn entry_update(conn: &Connection, id: i64, changes: &EntryChanges) -> Result<BudgetEntry> {
    let current = entry_get(conn, id)?;
    let name = changes.name.unwrap_or(&current.name);
    let amount = changes.amount.unwrap_or(current.amount);
    let category = changes.category.unwrap_or(current.category.as_deref());

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO budget_entry_history (id, version, budget_id, name, amount, category) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            current.id,
            current.version,
            current.budget_id,
            current.name,
            current.amount,
            current.category
        ],
    )?;
    tx.execute(
        "UPDATE budget_entries SET name = ?1, amount = ?2, category = ?3, version = version + 1 \
         WHERE id = ?4",
        rusqlite::params![name, amount, category, id],
    )?;
    tx.commit()?;
    tracing::info!(entry_id = id, version = current.version + 1, "updated budget entry");
    entry_get(conn, id)
}

pub struct EntryRevision {
    pub version: i64,
    pub name: String,
    pub amount: f64,
    pub category: Option<String>,
    pub changed_at: String,
}

/// Superseded versions, oldest first.
pub fn entry_history(conn: &Connection, id: i64) -> Result<Vec<EntryRevision>> {
    entry_get(conn, id)?;
    let mut stmt = conn.prepare(
        "SELECT version, name, amount, category, changed_at FROM budget_entry_history \
         WHERE id = ?1 ORDER BY version",
    )?;
    let rows = stmt
        .query_map([id], |row| {
            Ok(EntryRevision {
                version: row.get(0)?,
                name: row.get(1)?,
                amount: row.get(2)?,
                category: row.get(3)?,
                changed_at: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

pub struct EntryReport {
    pub entry: BudgetEntry,
    /// Sum of transactions whose category equals the entry name.
    pub actual: f64,
    pub transaction_count: usize,
}

pub struct CategoryReport {
    pub category: Option<String>,
    pub entries: Vec<EntryReport>,
    /// Planned total of the entries in this category.
    pub planned: f64,
}

pub struct UnbudgetedReport {
    pub category: Option<String>,
    pub net: f64,
    pub transaction_count: usize,
}

pub struct BudgetReport {
    pub budget: Budget,
    pub categories: Vec<CategoryReport>,
    pub unbudgeted: Vec<UnbudgetedReport>,
    /// Planned income (positive entries).
    pub total_in: f64,
    /// Planned expense (negative entries).
    pub total_out: f64,
    pub net: f64,
}

pub fn budget_report(conn: &Connection, budget_id: i64) -> Result<BudgetReport> {
    let budget = budget_get(conn, budget_id)?;
    let entries = entry_list(conn, budget_id)?;
    let transactions = budget_transactions(conn, &budget)?;
    Ok(build_report(budget, entries, &transactions))
}

fn build_report(budget: Budget, entries: Vec<BudgetEntry>, transactions: &[Transaction]) -> BudgetReport {
    let mut by_category: BTreeMap<Option<String>, Vec<&Transaction>> = BTreeMap::new();
    for txn in transactions {
        by_category.entry(txn.category.clone()).or_default().push(txn);
    }

    let total_in: f64 = entries.iter().map(|e| e.amount).filter(|a| *a > 0.0).sum();
    let total_out: f64 = entries.iter().map(|e| e.amount).filter(|a| *a < 0.0).sum();

    let entry_names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    let mut categories: BTreeMap<Option<String>, CategoryReport> = BTreeMap::new();
    for entry in entries {
        // Transactions attach to entries by name, not by the entry's own category.
        let matched = by_category.get(&Some(entry.name.clone()));
        let actual = matched.map_or(0.0, |txns| txns.iter().map(|t| t.amount).sum());
        let transaction_count = matched.map_or(0, Vec::len);
        let report = categories
            .entry(entry.category.clone())
            .or_insert_with(|| CategoryReport {
                category: entry.category.clone(),
                entries: Vec::new(),
                planned: 0.0,
            });
        report.planned += entry.amount;
        report.entries.push(EntryReport {
            entry,
            actual,
            transaction_count,
        });
    }

    let unbudgeted = by_category
        .into_iter()
        .filter(|(category, _)| !category.as_ref().is_some_and(|c| entry_names.contains(c)))
        .map(|(category, txns)| UnbudgetedReport {
            category,
            net: txns.iter().map(|t| t.amount).sum(),
            transaction_count: txns.len(),
        })
        .collect();

    BudgetReport {
        budget,
        categories: categories.into_values().collect(),
        unbudgeted,
        total_in,
        total_out,
        net: total_in + total_out,
    }
}
