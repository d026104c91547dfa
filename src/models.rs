use chrono::{NaiveDate, NaiveDateTime};

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub institution: Option<String>,
    pub created_at: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Sourcink {
    pub id: i64,
    pub name: String,
    pub account_id: Option<i64>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: i64,
    pub account_id_from: Option<i64>,
    pub account_id_to: Option<i64>,
    pub amount: f64,
    pub at: NaiveDateTime,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sourcink_id_from: Option<i64>,
    pub sourcink_id_to: Option<i64>,
    pub import_job_id: Option<i64>,
    pub budget_entry_id: Option<i64>,
}

/// Everything needed to write one transaction row.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id_from: Option<i64>,
    pub account_id_to: Option<i64>,
    pub amount: f64,
    pub at: NaiveDateTime,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sourcink_id_from: Option<i64>,
    pub sourcink_id_to: Option<i64>,
    pub import_job_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportJobStatus {
    Started,
    Finished,
    Error,
}

impl ImportJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "started" => Some(Self::Started),
            "finished" => Some(Self::Finished),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportJob {
    pub id: i64,
    pub account_id: i64,
    pub owner: String,
    pub filename: String,
    pub checksum: String,
    pub status: ImportJobStatus,
    pub institution: Option<String>,
    pub error_reason: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: String,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Budget {
    pub id: i64,
    pub start_date: NaiveDate,
    /// Exclusive.
    pub end_date: NaiveDate,
    pub version: i64,
}

impl Budget {
    pub fn contains(&self, at: &NaiveDateTime) -> bool {
        let day = at.date();
        self.start_date <= day && day < self.end_date
    }
}

/// A line in a budget. Positive amounts are planned income, negative planned expense.
#[derive(Debug, Clone)]
pub struct BudgetEntry {
    pub id: i64,
    pub budget_id: i64,
    pub name: String,
    pub amount: f64,
    pub category: Option<String>,
    pub created_at: String,
    pub version: i64,
}

/// A single statement row normalized across institutions, before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    /// True when the imported account is where the money left from.
    pub account_is_source: bool,
    /// Signed: positive for deposits/income, negative for withdrawals/expenses.
    pub amount: f64,
    pub at: NaiveDateTime,
    pub description: Option<String>,
    pub sourcink_from: Option<String>,
    pub sourcink_to: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub extended_details: Option<String>,
    pub reference: Option<String>,
    pub zipcode: Option<String>,
}

impl ImportRow {
    pub fn new(amount: f64, at: NaiveDateTime) -> Self {
        Self {
            account_is_source: amount < 0.0,
            amount,
            at,
            description: None,
            sourcink_from: None,
            sourcink_to: None,
            address: None,
            category: None,
            city: None,
            country: None,
            extended_details: None,
            reference: None,
            zipcode: None,
        }
    }
}
