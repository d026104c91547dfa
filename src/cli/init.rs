use std::path::PathBuf;

use colored::Colorize;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, settings_file_exists, settings_path, shellexpand_path};

pub fn run(data_dir: Option<String>, user_name: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(name) = user_name {
        settings.user_name = name;
    }

    let dir = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&dir)?;
    let already = settings_file_exists();
    save_settings(&settings)?;

    let db_path = settings.db_path();
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    tracing::info!(db = %db_path.display(), "database ready");

    if already {
        println!("Updated {}", settings_path().display());
    } else {
        println!("Wrote {}", settings_path().display());
    }
    println!("{} {}", "Database ready:".green().bold(), db_path.display());
    Ok(())
}
