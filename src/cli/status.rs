use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::Result;
use crate::settings::{load_settings, settings_path};

fn count(conn: &Connection, table: &str) -> Result<i64> {
    Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?)
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Settings:   {}", settings_path().display());
    println!("User:       {}", if settings.user_name.is_empty() { "(not set)" } else { &settings.user_name });
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Workers:    {}", settings.workers());
    println!("Log level:  {}", settings.log_level);

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `budgery init` to set up.");
        return Ok(());
    }

    let conn = get_connection(&db_path)?;
    let errored: i64 =
        conn.query_row("SELECT count(*) FROM import_jobs WHERE status = 'error'", [], |r| r.get(0))?;
    println!();
    println!("Accounts:      {}", count(&conn, "accounts")?);
    println!("Sourcinks:     {}", count(&conn, "sourcinks")?);
    println!("Transactions:  {}", count(&conn, "transactions")?);
    println!("Budgets:       {}", count(&conn, "budgets")?);
    println!("Import jobs:   {} ({errored} failed)", count(&conn, "import_jobs")?);
    Ok(())
}
