use colored::Colorize;
use comfy_table::{Cell, Table};

use super::open_db;
use crate::budget::{self, EntryChanges};
use crate::db::parse_date;
use crate::error::Result;
use crate::fmt::{money, opt};
use crate::settings::load_settings;

fn signed(amount: f64) -> String {
    if amount < 0.0 {
        money(amount).red().to_string()
    } else {
        money(amount).green().to_string()
    }
}

pub fn create(start: &str, end: &str) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let id = budget::budget_create(&conn, parse_date(start)?, parse_date(end)?)?;
    println!("Created budget {id}: {start} to {end}");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = open_db(&load_settings())?;
    let counts = budget::transaction_count_by_budget(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Start", "End", "Version", "Transactions"]);
    for (b, count) in &counts.budgets {
        table.add_row(vec![
            Cell::new(b.id),
            Cell::new(b.start_date),
            Cell::new(b.end_date),
            Cell::new(b.version),
            Cell::new(count),
        ]);
    }
    println!("Budgets\n{table}");
    println!("Transactions outside any budget: {}", counts.outside);
    Ok(())
}

pub fn update(id: i64, start: &str, end: &str) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let b = budget::budget_update(&conn, id, parse_date(start)?, parse_date(end)?)?;
    println!("Budget {id} is now {} to {} (version {})", b.start_date, b.end_date, b.version);
    Ok(())
}

pub fn history(id: i64) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let current = budget::budget_get(&conn, id)?;

    let mut table = Table::new();
    table.set_header(vec!["Version", "Start", "End", "Replaced"]);
    for rev in budget::budget_history(&conn, id)? {
        table.add_row(vec![
            Cell::new(rev.version),
            Cell::new(rev.start_date),
            Cell::new(rev.end_date),
            Cell::new(rev.changed_at),
        ]);
    }
    table.add_row(vec![
        Cell::new(current.version.to_string().bold()),
        Cell::new(current.start_date),
        Cell::new(current.end_date),
        Cell::new("(current)"),
    ]);
    println!("Budget {id} history\n{table}");
    Ok(())
}

pub fn report(id: i64) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let report = budget::budget_report(&conn, id)?;

    let mut table = Table::new();
    table.set_header(vec!["Entry", "Planned", "Actual", "Count"]);
    for category in &report.categories {
        table.add_row(vec![
            Cell::new(category.category.as_deref().unwrap_or("Uncategorized").bold()),
            Cell::new(signed(category.planned)),
            Cell::new(""),
            Cell::new(""),
        ]);
        for line in &category.entries {
            table.add_row(vec![
                Cell::new(format!("  {}", line.entry.name)),
                Cell::new(money(line.entry.amount)),
                Cell::new(signed(line.actual)),
                Cell::new(line.transaction_count),
            ]);
        }
    }
    println!(
        "Budget {id}: {} to {}\n{table}",
        report.budget.start_date, report.budget.end_date
    );

    if !report.unbudgeted.is_empty() {
        let mut unbudgeted = Table::new();
        unbudgeted.set_header(vec!["Category", "Net", "Count"]);
        for group in &report.unbudgeted {
            unbudgeted.add_row(vec![
                Cell::new(group.category.as_deref().unwrap_or("None")),
                Cell::new(signed(group.net)),
                Cell::new(group.transaction_count),
            ]);
        }
        println!("Unbudgeted\n{unbudgeted}");
    }

    println!("Planned in:   {}", money(report.total_in));
    println!("Planned out:  {}", money(report.total_out));
    println!("Net:          {}", signed(report.net));
    Ok(())
}

pub fn entry_add(budget_id: i64, name: &str, amount: f64, category: Option<&str>) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let id = budget::entry_create(&conn, budget_id, name, amount, category)?;
    println!("Added entry {id} to budget {budget_id}: {name} {}", money(amount));
    Ok(())
}

pub fn entry_update(
    entry_id: i64,
    name: Option<&str>,
    amount: Option<f64>,
    category: Option<&str>,
) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let changes = EntryChanges {
        name,
        amount,
        category: category.map(|c| if c.is_empty() { None } else { Some(c) }),
    };
    let entry = budget::entry_update(&conn, entry_id, &changes)?;
    println!(
        "Entry {entry_id} is now {} {} [{}] (version {})",
        entry.name,
        money(entry.amount),
        opt(&entry.category),
        entry.version
    );
    Ok(())
}

pub fn entry_history(entry_id: i64) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let current = budget::entry_get(&conn, entry_id)?;

    let mut table = Table::new();
    table.set_header(vec!["Version", "Name", "Amount", "Category", "Replaced"]);
    for rev in budget::entry_history(&conn, entry_id)? {
        table.add_row(vec![
            Cell::new(rev.version),
            Cell::new(&rev.name),
            Cell::new(money(rev.amount)),
            Cell::new(opt(&rev.category)),
            Cell::new(&rev.changed_at),
        ]);
    }
    table.add_row(vec![
        Cell::new(current.version.to_string().bold()),
        Cell::new(&current.name),
        Cell::new(money(current.amount)),
        Cell::new(opt(&current.category)),
        Cell::new("(current)"),
    ]);
    println!("Entry {entry_id} history\n{table}");
    Ok(())
}
