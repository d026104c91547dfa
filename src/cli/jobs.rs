use std::collections::HashMap;

use colored::{ColoredString, Colorize};
use comfy_table::{Cell, Table};

use super::open_db;
use crate::error::Result;
use crate::fmt::opt;
use crate::jobs;
use crate::ledger::{account_list, transactions_for_job};
use crate::models::ImportJobStatus;
use crate::settings::load_settings;

fn status_label(status: ImportJobStatus) -> ColoredString {
    match status {
        ImportJobStatus::Started => status.as_str().yellow(),
        ImportJobStatus::Finished => status.as_str().green(),
        ImportJobStatus::Error => status.as_str().red(),
    }
}

pub fn list() -> Result<()> {
    let conn = open_db(&load_settings())?;
    let accounts: HashMap<i64, String> = account_list(&conn)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    let mut table = Table::new();
    table.set_header(vec!["ID", "File", "Account", "Owner", "Status", "Institution", "Reason", "Created"]);
    for job in jobs::list(&conn)? {
        table.add_row(vec![
            Cell::new(job.id),
            Cell::new(&job.filename),
            Cell::new(accounts.get(&job.account_id).map(String::as_str).unwrap_or("")),
            Cell::new(&job.owner),
            Cell::new(status_label(job.status)),
            Cell::new(opt(&job.institution)),
            Cell::new(opt(&job.error_reason)),
            Cell::new(&job.created_at),
        ]);
    }
    println!("Import jobs\n{table}");
    Ok(())
}

pub fn show(id: i64) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let job = jobs::get(&conn, id)?;

    println!("Job:          {}", job.id);
    println!("File:         {}", job.filename);
    println!("Checksum:     {}", job.checksum);
    println!("Owner:        {}", job.owner);
    println!("Status:       {}", status_label(job.status));
    println!("Institution:  {}", job.institution.as_deref().unwrap_or("(not detected)"));
    println!("Created:      {}", job.created_at);
    println!("Finished:     {}", job.finished_at.as_deref().unwrap_or("-"));
    if let Some(reason) = &job.error_reason {
        println!("Reason:       {}", reason.red());
        println!("Detail:       {}", opt(&job.error_detail));
    }
    if job.status == ImportJobStatus::Finished {
        println!("Transactions: {}", transactions_for_job(&conn, id)?.len());
    }
    Ok(())
}
