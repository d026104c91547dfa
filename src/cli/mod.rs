pub mod accounts;
pub mod budgets;
pub mod categories;
pub mod import;
pub mod init;
pub mod jobs;
pub mod sourcinks;
pub mod status;
pub mod transactions;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::{BudgeryError, Result};
use crate::settings::Settings;

/// Opens the configured database, refusing to create one outside `init`.
pub(crate) fn open_db(settings: &Settings) -> Result<Connection> {
    let path = settings.db_path();
    if !path.exists() {
        return Err(BudgeryError::Other(format!(
            "Database not found at {}. Run `budgery init` first.",
            path.display()
        )));
    }
    get_connection(&path)
}

#[derive(Parser)]
#[command(name = "budgery", version, about = "Personal budgeting with bank-statement imports.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for budgery data (default: ~/Documents/budgery)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Name recorded as the owner of imports
        #[arg(long = "user-name")]
        user_name: Option<String>,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Inspect sourcinks (the payers and payees money moves between).
    Sourcinks {
        #[command(subcommand)]
        command: SourcinksCommands,
    },
    /// Record and list transactions.
    Transactions {
        #[command(subcommand)]
        command: TransactionsCommands,
    },
    /// List transaction categories with counts.
    Categories,
    /// Import bank statement exports (CSV or XLSX) in the background.
    Import {
        /// Files to import; the format is detected from the content
        #[arg(required = true)]
        files: Vec<String>,
        /// Account name to import into
        #[arg(long)]
        account: String,
    },
    /// Inspect import jobs.
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Manage budgets and their entries.
    Budgets {
        #[command(subcommand)]
        command: BudgetsCommands,
    },
    /// Show settings and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'Ally Checking'
        name: String,
        /// Institution name
        #[arg(long)]
        institution: Option<String>,
    },
    /// List all accounts.
    List,
}

#[derive(Subcommand)]
pub enum SourcinksCommands {
    /// List sourcinks.
    List {
        /// Only names containing this text
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TransactionsCommands {
    /// Record a transaction by hand.
    Add {
        /// Account the money moved through
        #[arg(long)]
        account: String,
        /// Negative for money leaving the account
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,
        /// When: YYYY-MM-DD or YYYY-MM-DD HH:MM:SS (default: now)
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Sourcink the money came from
        #[arg(long = "from")]
        from: Option<String>,
        /// Sourcink the money went to
        #[arg(long = "to")]
        to: Option<String>,
    },
    /// List transactions, newest first.
    List {
        /// Category name, or `None` for uncategorized
        #[arg(long)]
        category: Option<String>,
        /// Start: YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// End (inclusive): YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum JobsCommands {
    /// List import jobs.
    List,
    /// Show one import job.
    Show {
        /// Job ID (shown by `budgery import`)
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum BudgetsCommands {
    /// Create a budget covering [start, end).
    Create {
        /// First day: YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Day after the last: YYYY-MM-DD
        #[arg(long)]
        end: String,
    },
    /// List budgets with the number of transactions in each.
    List,
    /// Change a budget's span.
    Update {
        id: i64,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Show previous versions of a budget.
    History { id: i64 },
    /// Planned versus actual for a budget.
    Report { id: i64 },
    /// Add an entry to a budget.
    EntryAdd {
        /// Budget ID
        budget: i64,
        /// Matched against transaction categories
        #[arg(long)]
        name: String,
        /// Positive for planned income, negative for planned expense
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,
        /// Grouping in the report
        #[arg(long)]
        category: Option<String>,
    },
    /// Change a budget entry.
    EntryUpdate {
        /// Entry ID
        entry: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        amount: Option<f64>,
        /// New category; an empty string clears it
        #[arg(long)]
        category: Option<String>,
    },
    /// Show previous versions of a budget entry.
    EntryHistory {
        /// Entry ID
        entry: i64,
    },
}
