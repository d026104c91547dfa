use comfy_table::{Cell, Table};

use super::open_db;
use crate::error::Result;
use crate::fmt::opt;
use crate::ledger::{account_create, account_list};
use crate::settings::load_settings;

pub fn add(name: &str, institution: Option<&str>) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let id = account_create(&conn, name, institution)?;
    println!("Added account {id}: {name}");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = open_db(&load_settings())?;
    let accounts = account_list(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Institution", "Created"]);
    for account in &accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(&account.name),
            Cell::new(opt(&account.institution)),
            Cell::new(&account.created_at),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
