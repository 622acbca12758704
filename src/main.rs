mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use billkeeper::models::BillStatus;
use billkeeper::settings::load_settings;
use cli::bill::{BillArgs, EditArgs};
use cli::{BillCommands, Cli, Commands, HouseholdCommands, PaymentCommands, TxnCommands};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(load_settings().log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Household { command } => match command {
            HouseholdCommands::Add { name, currency } => cli::household::add(&name, currency.as_deref()),
            HouseholdCommands::List => cli::household::list(),
        },
        Commands::Import { file, household } => cli::import::run(&file, household.as_deref()),
        Commands::Txn { command } => match command {
            TxnCommands::Add {
                household,
                date,
                name,
                amount,
                merchant,
            } => cli::txn::add(household.as_deref(), date, &name, amount, merchant.as_deref()),
            TxnCommands::Hide { id, undo } => cli::txn::hide(id, undo),
        },
        Commands::Bill { command } => match command {
            BillCommands::Add {
                name,
                household,
                amount,
                due_day,
                currency,
                merchant,
                start,
                end,
                notes,
            } => cli::bill::add(BillArgs {
                name,
                household,
                amount,
                due_day,
                currency,
                merchant,
                start,
                end,
                notes,
            }),
            BillCommands::List { household } => cli::bill::list(household.as_deref()),
            BillCommands::Edit {
                id,
                name,
                amount,
                due_day,
                currency,
                merchant,
                start,
                end,
                notes,
            } => cli::bill::edit(
                id,
                EditArgs {
                    name,
                    amount,
                    due_day,
                    currency,
                    merchant,
                    start,
                    end,
                    notes,
                },
            ),
            BillCommands::Pause { id } => cli::bill::change_status(id, BillStatus::Paused),
            BillCommands::Resume { id } => cli::bill::change_status(id, BillStatus::Active),
            BillCommands::Cancel { id } => cli::bill::change_status(id, BillStatus::Cancelled),
            BillCommands::Delete { id } => cli::bill::delete(id),
            BillCommands::FromTxn { id, name, due_day } => cli::bill::from_txn(id, name, due_day),
        },
        Commands::Payment { command } => match command {
            PaymentCommands::List { household, month } => {
                cli::payment::list(household.as_deref(), month.as_deref())
            }
            PaymentCommands::Show { id } => cli::payment::show(id),
            PaymentCommands::Candidates { id } => cli::payment::candidates(id),
            PaymentCommands::Search {
                id,
                text,
                from_date,
                to_date,
            } => cli::payment::search(id, text, from_date, to_date),
            PaymentCommands::Match { id, txn } => cli::payment::link(id, txn),
            PaymentCommands::Unmatch { id, txn } => cli::payment::unlink(id, txn),
            PaymentCommands::Skip { id } => cli::payment::skip(id),
            PaymentCommands::Reject { id, txn } => cli::payment::reject(id, txn),
            PaymentCommands::Amount { id, amount } => cli::payment::amount(id, amount),
            PaymentCommands::AutoMatch { id, household } => cli::payment::auto(id, household.as_deref()),
        },
        Commands::Sweep { watch } => cli::sweep::run(watch),
        Commands::Calendar { household, month } => cli::report::calendar(household.as_deref(), month.as_deref()),
        Commands::Alerts { household } => cli::report::alerts(household.as_deref()),
        Commands::Cashflow { household } => cli::report::cashflow(household.as_deref()),
        Commands::Summary { household, month } => cli::report::summary(household.as_deref(), month.as_deref()),
        Commands::Demo => cli::demo::run(),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
