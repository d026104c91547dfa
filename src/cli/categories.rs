use comfy_table::{Cell, Table};

use super::open_db;
use crate::error::Result;
use crate::ledger::category_list;
use crate::settings::load_settings;

pub fn list() -> Result<()> {
    let conn = open_db(&load_settings())?;
    let mut table = Table::new();
    table.set_header(vec!["Category", "Transactions"]);
    for category in category_list(&conn)? {
        table.add_row(vec![
            Cell::new(category.name.as_deref().unwrap_or("None")),
            Cell::new(category.transaction_count),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}
