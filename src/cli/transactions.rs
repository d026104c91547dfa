use std::collections::HashMap;

use chrono::{NaiveDateTime, NaiveTime};
use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;

use super::open_db;
use crate::db::{format_at, parse_date, parse_user_at};
use crate::error::Result;
use crate::fmt::{money, opt};
use crate::ledger::{
    account_id_by_name, account_list, sourcink_get_or_create, sourcink_list, transaction_create,
    transaction_list, TransactionFilter,
};
use crate::models::NewTransaction;
use crate::settings::load_settings;

pub struct AddArgs {
    pub account: String,
    pub amount: f64,
    pub at: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

pub fn add(args: AddArgs) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let account_id = account_id_by_name(&conn, &args.account)?;
    let at = match &args.at {
        Some(raw) => parse_user_at(raw)?,
        None => chrono::Local::now().naive_local(),
    };
    let sourcink = |name: &Option<String>| -> Result<Option<i64>> {
        name.as_deref().map(|n| sourcink_get_or_create(&conn, n)).transpose()
    };
    let (account_id_from, account_id_to) = if args.amount < 0.0 {
        (Some(account_id), None)
    } else {
        (None, Some(account_id))
    };

    let id = transaction_create(
        &conn,
        &NewTransaction {
            account_id_from,
            account_id_to,
            amount: args.amount,
            at,
            sourcink_id_from: sourcink(&args.from)?,
            sourcink_id_to: sourcink(&args.to)?,
            description: args.description,
            category: args.category,
            import_job_id: None,
        },
    )?;
    println!("Added transaction {id}: {} on {}", money(args.amount), format_at(&at));
    Ok(())
}

/// A bare date as an upper bound covers that whole day.
fn end_bound(raw: &str) -> Result<NaiveDateTime> {
    match parse_date(raw) {
        Ok(date) => Ok(date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))),
        Err(_) => parse_user_at(raw),
    }
}

/// Display names for the counterparty columns: sourcinks first, then accounts.
fn names(conn: &Connection) -> Result<(HashMap<i64, String>, HashMap<i64, String>)> {
    let accounts = account_list(conn)?.into_iter().map(|a| (a.id, a.name)).collect();
    let sourcinks = sourcink_list(conn, None)?.into_iter().map(|s| (s.id, s.name)).collect();
    Ok((accounts, sourcinks))
}

pub fn list(category: Option<String>, from_date: Option<String>, to_date: Option<String>) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let filter = TransactionFilter {
        category: category.as_deref(),
        start: from_date.as_deref().map(parse_user_at).transpose()?,
        end: to_date.as_deref().map(end_bound).transpose()?,
    };
    let rows = transaction_list(&conn, &filter)?;
    let (accounts, sourcinks) = names(&conn)?;
    let party = |sourcink: Option<i64>, account: Option<i64>| -> String {
        sourcink
            .and_then(|id| sourcinks.get(&id))
            .or_else(|| account.and_then(|id| accounts.get(&id)))
            .cloned()
            .unwrap_or_default()
    };

    let mut table = Table::new();
    table.set_header(vec!["ID", "At", "Amount", "From", "To", "Description", "Category"]);
    for txn in &rows {
        let amount = if txn.amount < 0.0 {
            money(txn.amount).red().to_string()
        } else {
            money(txn.amount).green().to_string()
        };
        table.add_row(vec![
            Cell::new(txn.id),
            Cell::new(format_at(&txn.at)),
            Cell::new(amount),
            Cell::new(party(txn.sourcink_id_from, txn.account_id_from)),
            Cell::new(party(txn.sourcink_id_to, txn.account_id_to)),
            Cell::new(opt(&txn.description)),
            Cell::new(opt(&txn.category)),
        ]);
    }
    println!("Transactions ({})\n{table}", rows.len());
    Ok(())
}
