use std::collections::HashMap;

use comfy_table::{Cell, Table};

use super::open_db;
use crate::error::Result;
use crate::ledger::{account_list, sourcink_list};
use crate::settings::load_settings;

pub fn list(name: Option<&str>) -> Result<()> {
    let conn = open_db(&load_settings())?;
    let accounts: HashMap<i64, String> = account_list(&conn)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Account"]);
    for sourcink in sourcink_list(&conn, name)? {
        let account = sourcink
            .account_id
            .and_then(|id| accounts.get(&id).cloned())
            .unwrap_or_default();
        table.add_row(vec![Cell::new(sourcink.id), Cell::new(sourcink.name), Cell::new(account)]);
    }
    println!("Sourcinks\n{table}");
    Ok(())
}
