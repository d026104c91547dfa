mod budget;
mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod jobs;
mod ledger;
mod logging;
mod models;
mod queue;
mod settings;

use clap::Parser;

use cli::{
    AccountsCommands, BudgetsCommands, Cli, Commands, JobsCommands, SourcinksCommands,
    TransactionsCommands,
};

fn main() {
    let cli = Cli::parse();
    logging::init(&settings::load_settings().log_level);

    let result = match cli.command {
        Commands::Init {
            data_dir,
            user_name,
        } => cli::init::run(data_dir, user_name),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add { name, institution } => {
                cli::accounts::add(&name, institution.as_deref())
            }
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Sourcinks { command } => match command {
            SourcinksCommands::List { name } => cli::sourcinks::list(name.as_deref()),
        },
        Commands::Transactions { command } => match command {
            TransactionsCommands::Add {
                account,
                amount,
                at,
                description,
                category,
                from,
                to,
            } => cli::transactions::add(cli::transactions::AddArgs {
                account,
                amount,
                at,
                description,
                category,
                from,
                to,
            }),
            TransactionsCommands::List {
                category,
                from_date,
                to_date,
            } => cli::transactions::list(category, from_date, to_date),
        },
        Commands::Categories => cli::categories::list(),
        Commands::Import { files, account } => cli::import::run(&files, &account),
        Commands::Jobs { command } => match command {
            JobsCommands::List => cli::jobs::list(),
            JobsCommands::Show { id } => cli::jobs::show(id),
        },
        Commands::Budgets { command } => match command {
            BudgetsCommands::Create { start, end } => cli::budgets::create(&start, &end),
            BudgetsCommands::List => cli::budgets::list(),
            BudgetsCommands::Update { id, start, end } => cli::budgets::update(id, &start, &end),
            BudgetsCommands::History { id } => cli::budgets::history(id),
            BudgetsCommands::Report { id } => cli::budgets::report(id),
            BudgetsCommands::EntryAdd {
                budget,
                name,
                amount,
                category,
            } => cli::budgets::entry_add(budget, &name, amount, category.as_deref()),
            BudgetsCommands::EntryUpdate {
                entry,
                name,
                amount,
                category,
            } => cli::budgets::entry_update(entry, name.as_deref(), amount, category.as_deref()),
            BudgetsCommands::EntryHistory { entry } => cli::budgets::entry_history(entry),
        },
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
