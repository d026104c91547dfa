use std::path::Path;

use colored::Colorize;

use super::open_db;
use crate::error::{BudgeryError, Result};
use crate::importer::upload;
use crate::queue::{ImportQueue, JobOutcome};
use crate::settings::load_settings;

pub fn run(files: &[String], account: &str) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    let queue = ImportQueue::start(&settings.db_path(), settings.workers())?;
    let owner = settings.owner();

    let mut handles = Vec::with_capacity(files.len());
    for file in files {
        let path = Path::new(file);
        let content = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.clone());
        let handle = upload(&conn, &queue, account, &owner, &filename, content)?;
        println!("Queued {filename} as job {}", handle.job_id);
        handles.push((filename, handle));
    }

    let mut failed = 0;
    for (filename, handle) in handles {
        match handle.wait() {
            JobOutcome::Finished { job_id, rows } => {
                println!("{} job {job_id} ({filename}): {rows} transactions", "finished".green().bold());
            }
            JobOutcome::Failed { job_id, reason, detail } => {
                failed += 1;
                println!("{} job {job_id} ({filename}): {reason}: {detail}", "error".red().bold());
            }
        }
    }
    queue.shutdown();

    if failed > 0 {
        return Err(BudgeryError::Other(format!("{failed} of {} imports failed", files.len())));
    }
    Ok(())
}
