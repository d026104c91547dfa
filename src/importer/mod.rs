pub mod delimited;
pub mod format;
pub mod institutions;
pub mod workbook;

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::error::{BudgeryError, Result};
use crate::ledger::{account_id_by_name, Ledger};
use crate::models::{ImportRow, NewTransaction};
use crate::queue::{ImportQueue, ImportRequest, JobHandle};
use format::Format;
pub use institutions::Institution;
use institutions::Record;

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Header names (stripped) plus the non-blank data rows, each tagged with its
/// 1-based position.
#[derive(Debug, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<(usize, Vec<String>)>,
}

impl Table {
    pub fn new(headers: impl IntoIterator<Item = String>) -> Self {
        Self {
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, values: Vec<String>) {
        if values.iter().all(|v| v.trim().is_empty()) {
            return;
        }
        let row = self.rows.len() + 1;
        self.rows.push((row, values));
    }
}

#[derive(Debug)]
pub struct Extraction {
    pub institution: Institution,
    pub rows: Vec<ImportRow>,
}

/// Detect → extract → match the header → normalize every row, in file order.
pub fn extract_rows(content: &[u8]) -> Result<Extraction> {
    let table = match format::detect(content)? {
        Format::Delimited(dialect) => delimited::extract(content, dialect)?,
        Format::Spreadsheet => workbook::extract(content)?,
    };
    let institution = Institution::for_header(&table.headers)?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for (row, values) in &table.rows {
        if values.len() != table.headers.len() {
            return Err(BudgeryError::malformed(
                *row,
                format!("expected {} fields, found {}", table.headers.len(), values.len()),
            ));
        }
        if let Some(parsed) = institution.process(&Record::new(&table.headers, values, *row))? {
            rows.push(parsed);
        }
    }
    Ok(Extraction { institution, rows })
}

// ---------------------------------------------------------------------------
// Job execution
// ---------------------------------------------------------------------------

fn persistence(err: BudgeryError) -> BudgeryError {
    match err {
        BudgeryError::PersistenceFailure(_) => err,
        other => BudgeryError::PersistenceFailure(other.to_string()),
    }
}

fn persist_row<L: Ledger + ?Sized>(ledger: &L, job_id: i64, account_id: i64, row: ImportRow) -> Result<i64> {
    let sourcink = |name: &Option<String>| -> Result<Option<i64>> {
        name.as_deref()
            .map(|n| ledger.find_or_create_sourcink(n).map_err(persistence))
            .transpose()
    };
    let (account_id_from, account_id_to) = if row.account_is_source {
        (Some(account_id), None)
    } else {
        (None, Some(account_id))
    };
    let txn = NewTransaction {
        account_id_from,
        account_id_to,
        amount: row.amount,
        at: row.at,
        sourcink_id_from: sourcink(&row.sourcink_from)?,
        sourcink_id_to: sourcink(&row.sourcink_to)?,
        description: row.description,
        category: row.category,
        import_job_id: Some(job_id),
    };
    ledger.create_transaction(&txn).map_err(persistence)
}

fn import_rows<L: Ledger + ?Sized>(ledger: &L, job_id: i64, account_id: i64, content: &[u8]) -> Result<usize> {
    let extraction = extract_rows(content)?;
    ledger
        .set_job_institution(job_id, extraction.institution.name())
        .map_err(persistence)?;
    tracing::debug!(
        job_id,
        institution = extraction.institution.key(),
        rows = extraction.rows.len(),
        "extracted statement rows"
    );
    let count = extraction.rows.len();
    for row in extraction.rows {
        persist_row(ledger, job_id, account_id, row)?;
    }
    Ok(count)
}

fn fail_job<L: Ledger + ?Sized>(ledger: &L, job_id: i64, err: &BudgeryError) {
    let reason = err.reason_code();
    tracing::warn!(job_id, reason, error = %err, "import failed");
    if let Err(mark_err) = ledger.mark_job_errored(job_id, reason, &err.to_string()) {
        tracing::error!(job_id, error = %mark_err, "could not record import failure");
    }
}

/// Runs one import job to a terminal state. Rows already written stay written
/// when a later row fails.
pub fn run_job<L: Ledger + ?Sized>(ledger: &L, job_id: i64, account_id: i64, content: &[u8]) -> Result<usize> {
    let result = import_rows(ledger, job_id, account_id, content)
        .and_then(|count| ledger.mark_job_finished(job_id).map_err(persistence).map(|()| count));
    match result {
        Ok(count) => {
            tracing::info!(job_id, rows = count, "import finished");
            Ok(count)
        }
        Err(err) => {
            fail_job(ledger, job_id, &err);
            Err(err)
        }
    }
}

pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Records a job for the upload and hands it to the worker pool.
pub fn upload(
    conn: &Connection,
    queue: &ImportQueue,
    account_name: &str,
    owner: &str,
    filename: &str,
    content: Vec<u8>,
) -> Result<JobHandle> {
    let account_id = account_id_by_name(conn, account_name)?;
    let job_id = crate::jobs::create(conn, account_id, owner, filename, &checksum(&content))?;
    queue.submit(ImportRequest {
        job_id,
        account_id,
        content,
    })
}
