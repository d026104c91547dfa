use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{BudgeryError, Result};
use crate::models::ImportRow;

// ---------------------------------------------------------------------------
// Record: one data row keyed by the (stripped) header names
// ---------------------------------------------------------------------------

pub struct Record<'a> {
    headers: &'a [String],
    values: &'a [String],
    /// 1-based data row number, for error messages.
    pub row: usize,
}

impl<'a> Record<'a> {
    pub fn new(headers: &'a [String], values: &'a [String], row: usize) -> Self {
        Self { headers, values, row }
    }

    /// Raw cell value. Columns are guaranteed by the header signature, so a
    /// missing one reads as empty.
    pub fn get(&self, column: &str) -> &str {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Verbatim value, or `None` when the cell is blank.
    pub fn optional(&self, column: &str) -> Option<String> {
        let value = self.get(column);
        if value.trim().is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> BudgeryError {
        BudgeryError::malformed(self.row, reason)
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Parses `1,234.56`, `$12.00`, `"50"`, and accounting negatives like `(75.25)`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

/// `M/D/YYYY`, zero padding optional.
pub fn parse_date_mdy(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%m/%d/%Y").ok()
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// RFC 3339 keeps the wall-clock time the provider recorded; the offset is dropped.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

// ---------------------------------------------------------------------------
// Institutions — enum dispatch over the closed set of known export formats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Institution {
    EveryDollar,
    Ally,
    Afcu,
    Amex,
}

const EVERYDOLLAR_HEADER: &[&str] = &[
    "user_id",
    "group_id",
    "journal_id",
    "created_at",
    "updated_at",
    "group_title",
    "type",
    "amount",
    "foreign_amount",
    "currency_code",
    "foreign_currency_code",
    "description",
    "date",
    "source_name",
    "source_iban",
    "source_type",
    "destination_name",
    "destination_iban",
    "destination_type",
    "reconciled",
    "category",
    "budget",
    "bill",
    "tags",
    "notes",
    "sepa_cc",
    "sepa_ct_op",
    "sepa_ct_id",
    "sepa_db",
    "sepa_country",
    "sepa_ep",
    "sepa_ci",
    "sepa_batch_id",
    "external_uri",
    "interest_date",
    "book_date",
    "process_date",
    "due_date",
    "payment_date",
    "invoice_date",
    "recurrence_id",
    "internal_reference",
    "bunq_payment_id",
    "import_hash",
    "import_hash_v2",
    "external_id",
    "original_source",
    "recurrence_total",
    "recurrence_count",
];

const ALLY_HEADER: &[&str] = &["Date", "Time", "Amount", "Type", "Description"];

const AFCU_HEADER: &[&str] = &["Date", "No.", "Description", "Debit", "Credit"];

const AMEX_HEADER: &[&str] = &[
    "Date",
    "Description",
    "Card Member",
    "Account #",
    "Amount",
    "Extended Details",
    "Appears On Your Statement As",
    "Address",
    "City/State",
    "Zip Code",
    "Country",
    "Reference",
    "Category",
];

/// AFCU lists authorizations that have not posted yet with this description prefix.
const PENDING_PREFIX: &str = "Pending -";

/// Every known export format. Header signatures must stay disjoint.
pub const REGISTRY: &[Institution] = &[
    Institution::EveryDollar,
    Institution::Ally,
    Institution::Afcu,
    Institution::Amex,
];

impl Institution {
    pub fn key(&self) -> &'static str {
        match self {
            Self::EveryDollar => "everydollar",
            Self::Ally => "ally",
            Self::Afcu => "afcu",
            Self::Amex => "amex",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EveryDollar => "EveryDollar",
            Self::Ally => "Ally Bank",
            Self::Afcu => "America First Credit Union",
            Self::Amex => "American Express",
        }
    }

    pub fn header(&self) -> &'static [&'static str] {
        match self {
            Self::EveryDollar => EVERYDOLLAR_HEADER,
            Self::Ally => ALLY_HEADER,
            Self::Afcu => AFCU_HEADER,
            Self::Amex => AMEX_HEADER,
        }
    }

    /// Exact match on names, order and count.
    pub fn for_header(header: &[String]) -> Result<Self> {
        REGISTRY
            .iter()
            .find(|inst| {
                let expected = inst.header();
                expected.len() == header.len() && expected.iter().zip(header).all(|(e, h)| e == h)
            })
            .copied()
            .ok_or_else(|| BudgeryError::UnrecognizedSchema(header.to_vec()))
    }

    /// `Ok(None)` means the row is deliberately skipped (a pending transaction).
    pub fn process(&self, record: &Record) -> Result<Option<ImportRow>> {
        match self {
            Self::EveryDollar => process_everydollar(record),
            Self::Ally => process_ally(record),
            Self::Afcu => process_afcu(record),
            Self::Amex => process_amex(record),
        }
    }
}

// ---------------------------------------------------------------------------
// EveryDollar
// ---------------------------------------------------------------------------

fn process_everydollar(record: &Record) -> Result<Option<ImportRow>> {
    let at = parse_timestamp(record.get("date"))
        .ok_or_else(|| record.malformed(format!("invalid date {:?}", record.get("date"))))?;
    let amount = parse_amount(record.get("amount"))
        .ok_or_else(|| record.malformed(format!("invalid amount {:?}", record.get("amount"))))?;

    let mut row = ImportRow::new(amount, at);
    // The export's own description column carries the budget line, i.e. our category.
    row.account_is_source = true;
    row.category = record.optional("description");
    row.sourcink_from = record.optional("source_name");
    row.sourcink_to = record.optional("destination_name");
    Ok(Some(row))
}

// ---------------------------------------------------------------------------
// Ally Bank
// ---------------------------------------------------------------------------

fn process_ally(record: &Record) -> Result<Option<ImportRow>> {
    let date = NaiveDate::parse_from_str(record.get("Date").trim(), "%Y-%m-%d")
        .map_err(|_| record.malformed(format!("invalid date {:?}", record.get("Date"))))?;
    let time = parse_time(record.get("Time"))
        .ok_or_else(|| record.malformed(format!("invalid time {:?}", record.get("Time"))))?;
    let amount = parse_amount(record.get("Amount"))
        .ok_or_else(|| record.malformed(format!("invalid amount {:?}", record.get("Amount"))))?;

    let amount = match record.get("Type").trim() {
        "Withdrawal" => -amount.abs(),
        "Deposit" => amount.abs(),
        other => return Err(record.malformed(format!("unknown type {other:?}"))),
    };

    let mut row = ImportRow::new(amount, date.and_time(time));
    row.description = record.optional("Description");
    Ok(Some(row))
}

// ---------------------------------------------------------------------------
// America First Credit Union
// ---------------------------------------------------------------------------

fn process_afcu(record: &Record) -> Result<Option<ImportRow>> {
    let description = record.get("Description");
    if description.starts_with(PENDING_PREFIX) {
        return Ok(None);
    }
    let date = parse_date_mdy(record.get("Date"))
        .ok_or_else(|| record.malformed(format!("invalid date {:?}", record.get("Date"))))?;

    let amount = match (record.optional("Debit"), record.optional("Credit")) {
        (Some(debit), _) => -parse_amount(&debit)
            .ok_or_else(|| record.malformed(format!("invalid debit {debit:?}")))?
            .abs(),
        (None, Some(credit)) => parse_amount(&credit)
            .ok_or_else(|| record.malformed(format!("invalid credit {credit:?}")))?
            .abs(),
        (None, None) => return Err(record.malformed("no value for debit or credit")),
    };

    let mut row = ImportRow::new(amount, date.and_time(NaiveTime::MIN));
    row.description = record.optional("Description");
    Ok(Some(row))
}

// ---------------------------------------------------------------------------
// American Express
// ---------------------------------------------------------------------------

fn process_amex(record: &Record) -> Result<Option<ImportRow>> {
    let date = parse_date_mdy(record.get("Date"))
        .ok_or_else(|| record.malformed(format!("invalid date {:?}", record.get("Date"))))?;
    // Amex reports charges as positive and payments/credits as negative.
    let charge = parse_amount(record.get("Amount"))
        .ok_or_else(|| record.malformed(format!("invalid amount {:?}", record.get("Amount"))))?;

    let mut row = ImportRow::new(-charge, date.and_time(NaiveTime::MIN));
    row.description = record.optional("Description");
    row.extended_details = record.optional("Extended Details");
    row.address = record.optional("Address");
    row.city = record.optional("City/State");
    row.zipcode = record.optional("Zip Code");
    row.country = record.optional("Country");
    row.reference = record.optional("Reference");
    row.category = record.optional("Category");
    Ok(Some(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn run(inst: Institution, values: &[&str]) -> Result<Option<ImportRow>> {
        let headers = strings(inst.header());
        let values = strings(values);
        inst.process(&Record::new(&headers, &values, 1))
    }

    #[test]
    fn test_header_signatures_are_disjoint() {
        for (i, a) in REGISTRY.iter().enumerate() {
            for b in &REGISTRY[i + 1..] {
                let (ha, hb) = (a.header(), b.header());
                let shorter = ha.len().min(hb.len());
                assert_ne!(
                    &ha[..shorter],
                    &hb[..shorter],
                    "{} and {} share a header prefix",
                    a.key(),
                    b.key()
                );
            }
        }
    }

    #[test]
    fn test_for_header_exact_match() {
        let header = strings(&["Date", "Time", "Amount", "Type", "Description"]);
        assert_eq!(Institution::for_header(&header).unwrap(), Institution::Ally);
        let header = strings(&["Date", "No.", "Description", "Debit", "Credit"]);
        assert_eq!(Institution::for_header(&header).unwrap(), Institution::Afcu);
    }

    #[test]
    fn test_for_header_rejects_renamed_reordered_or_resized() {
        for header in [
            vec!["Date", "Time", "Amount", "Kind", "Description"],
            vec!["Time", "Date", "Amount", "Type", "Description"],
            vec!["Date", "Time", "Amount", "Type"],
            vec!["Date", "Time", "Amount", "Type", "Description", "Balance"],
            vec!["date", "time", "amount", "type", "description"],
        ] {
            let result = Institution::for_header(&strings(&header));
            assert!(
                matches!(result, Err(BudgeryError::UnrecognizedSchema(_))),
                "expected UnrecognizedSchema for {header:?}"
            );
        }
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("\"2,310.77\""), Some(2310.77));
        assert_eq!(parse_amount(" -61.40 "), Some(-61.4));
        assert_eq!(parse_amount("(75.25)"), Some(-75.25));
        assert_eq!(parse_amount("$9.99"), Some(9.99));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn test_parse_date_mdy_unpadded() {
        assert_eq!(parse_date_mdy("1/5/2023"), NaiveDate::from_ymd_opt(2023, 1, 5));
        assert_eq!(parse_date_mdy("01/31/2023"), NaiveDate::from_ymd_opt(2023, 1, 31));
        assert_eq!(parse_date_mdy("2/30/2023"), None);
        assert_eq!(parse_date_mdy("2023-01-05"), None);
    }

    #[test]
    fn test_ally_withdrawal_and_deposit() {
        let row = run(Institution::Ally, &["2023-01-09", "16:20:45", "-61.40", "Withdrawal", "FRYS"])
            .unwrap()
            .unwrap();
        assert_eq!(row.amount, -61.40);
        assert!(row.account_is_source);
        assert_eq!(row.at.to_string(), "2023-01-09 16:20:45");

        let row = run(Institution::Ally, &["2023-01-11", "09:15:00", "2150.00", "Deposit", "PAYROLL"])
            .unwrap()
            .unwrap();
        assert_eq!(row.amount, 2150.0);
        assert!(!row.account_is_source);
        assert!(row.sourcink_from.is_none());
    }

    #[test]
    fn test_ally_unknown_type_is_malformed() {
        let err = run(Institution::Ally, &["2023-01-09", "16:20:45", "-1.00", "Transfer", "X"]).unwrap_err();
        assert!(matches!(err, BudgeryError::MalformedRow { row: 1, .. }));
    }

    #[test]
    fn test_afcu_pending_rows_are_skipped() {
        let row = run(Institution::Afcu, &["1/13/2023", "", "Pending - 01/13 - AMZN Mktp US", "-23.18", ""]).unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_afcu_debit_credit_columns() {
        let row = run(Institution::Afcu, &["1/6/2023", "", "COSTCO", "-95.11", ""]).unwrap().unwrap();
        assert_eq!(row.amount, -95.11);
        assert!(row.account_is_source);
        assert_eq!(row.at.to_string(), "2023-01-06 00:00:00");

        let row = run(Institution::Afcu, &["1/10/2023", "", "PAYROLL", "", "2,310.77"]).unwrap().unwrap();
        assert_eq!(row.amount, 2310.77);
        assert!(!row.account_is_source);
    }

    #[test]
    fn test_afcu_missing_debit_and_credit_is_malformed() {
        let err = run(Institution::Afcu, &["1/6/2023", "", "NOTHING", "", ""]).unwrap_err();
        assert_eq!(err.to_string(), "Malformed row 1: no value for debit or credit");
    }

    #[test]
    fn test_amex_negates_charges_and_keeps_metadata() {
        let row = run(
            Institution::Amex,
            &[
                "01/30/2023",
                "TRADER JOE S #123 PHOENIX AZ",
                "JANE DOE",
                "-51009",
                "64.18",
                "",
                "TRADER JOE S #123",
                "4821 E WARNER RD",
                "PHOENIX\nAZ",
                "85044",
                "UNITED STATES",
                "'320230131000001'",
                "Merchandise & Supplies-Groceries",
            ],
        )
        .unwrap()
        .unwrap();
        assert_eq!(row.amount, -64.18);
        assert!(row.account_is_source);
        assert_eq!(row.city.as_deref(), Some("PHOENIX\nAZ"));
        assert_eq!(row.reference.as_deref(), Some("'320230131000001'"));
        assert_eq!(row.zipcode.as_deref(), Some("85044"));
        assert_eq!(row.category.as_deref(), Some("Merchandise & Supplies-Groceries"));
        assert!(row.extended_details.is_none());
    }

    #[test]
    fn test_everydollar_maps_sourcinks_and_category() {
        let headers = strings(EVERYDOLLAR_HEADER);
        let mut values = vec![String::new(); headers.len()];
        let set = |values: &mut Vec<String>, column: &str, value: &str| {
            let i = headers.iter().position(|h| h == column).unwrap();
            values[i] = value.to_string();
        };
        set(&mut values, "amount", "-54.12");
        set(&mut values, "description", "Groceries");
        set(&mut values, "date", "2021-04-24T00:00:00-06:00");
        set(&mut values, "source_name", "America First Checking");
        set(&mut values, "destination_name", "Smith's Marketplace");

        let row = Institution::EveryDollar
            .process(&Record::new(&headers, &values, 1))
            .unwrap()
            .unwrap();
        assert_eq!(row.amount, -54.12);
        assert!(row.account_is_source);
        assert_eq!(row.at.to_string(), "2021-04-24 00:00:00");
        assert_eq!(row.category.as_deref(), Some("Groceries"));
        assert!(row.description.is_none());
        assert_eq!(row.sourcink_from.as_deref(), Some("America First Checking"));
        assert_eq!(row.sourcink_to.as_deref(), Some("Smith's Marketplace"));
    }
}
