pub mod bill;
pub mod demo;
pub mod household;
pub mod import;
pub mod init;
pub mod payment;
pub mod report;
pub mod status;
pub mod sweep;
pub mod txn;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use rusqlite::Connection;
use rust_decimal::Decimal;

use billkeeper::db::{get_connection, init_db};
use billkeeper::error::{BillError, Result};
use billkeeper::ledger::{find_household, list_households};
use billkeeper::models::{Household, PaymentStatus};
use billkeeper::settings::db_path;

pub(crate) fn open_db() -> Result<Connection> {
    let path = db_path();
    if !path.exists() {
        return Err(BillError::Other(
            "No database found. Run `billkeeper init` first.".to_string(),
        ));
    }
    let conn = get_connection(&path)?;
    init_db(&conn)?;
    Ok(conn)
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `YYYY-MM` to the first of that month; `None` means the current month.
pub(crate) fn parse_month_opt(month: Option<&str>) -> Result<NaiveDate> {
    match month {
        Some(m) => NaiveDate::parse_from_str(&format!("{m}-01"), "%Y-%m-%d")
            .map_err(|_| BillError::InvalidDate(m.to_string())),
        None => Ok(billkeeper::bills::beginning_of_month(today())),
    }
}

/// The named household, or the only one when no name is given.
pub(crate) fn resolve_household(conn: &Connection, name: Option<&str>) -> Result<Household> {
    if let Some(name) = name {
        return find_household(conn, name);
    }
    let mut households = list_households(conn)?;
    match households.len() {
        1 => Ok(households.remove(0)),
        0 => Err(BillError::Other(
            "No households yet. Add one with `billkeeper household add`.".to_string(),
        )),
        _ => Err(BillError::Other(
            "Several households exist; pass --household <name>.".to_string(),
        )),
    }
}

pub(crate) fn status_label(status: PaymentStatus) -> ColoredString {
    match status {
        PaymentStatus::Paid => status.as_str().green(),
        PaymentStatus::Pending => status.as_str().yellow(),
        PaymentStatus::Overdue => status.as_str().red().bold(),
        PaymentStatus::Skipped => status.as_str().dimmed(),
    }
}

#[derive(Parser)]
#[command(name = "billkeeper", about = "Track recurring household bills and reconcile them against your ledger.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for billkeeper data (default: ~/Documents/billkeeper)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage households.
    Household {
        #[command(subcommand)]
        command: HouseholdCommands,
    },
    /// Import a bank statement CSV (date,name,amount[,merchant]) into the ledger.
    Import {
        /// Path to the CSV file
        file: String,
        /// Household to import into
        #[arg(long)]
        household: Option<String>,
    },
    /// Add or hide ledger transactions.
    Txn {
        #[command(subcommand)]
        command: TxnCommands,
    },
    /// Manage recurring bills.
    Bill {
        #[command(subcommand)]
        command: BillCommands,
    },
    /// Inspect and reconcile bill payments.
    Payment {
        #[command(subcommand)]
        command: PaymentCommands,
    },
    /// Age overdue payments, generate this month's payments and auto-match.
    Sweep {
        /// Keep running, sweeping every `sweep_interval_hours`
        #[arg(long)]
        watch: bool,
    },
    /// Month calendar of bill payments.
    Calendar {
        #[arg(long)]
        household: Option<String>,
        /// Month: YYYY-MM (default: current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// Overdue, due today and due within the week.
    Alerts {
        #[arg(long)]
        household: Option<String>,
    },
    /// Twelve-month projection of bills against median income.
    Cashflow {
        #[arg(long)]
        household: Option<String>,
    },
    /// Paid and outstanding totals for a month.
    Summary {
        #[arg(long)]
        household: Option<String>,
        /// Month: YYYY-MM (default: current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// Load a sample household with bills and transactions.
    Demo,
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum HouseholdCommands {
    /// Add a household.
    Add {
        name: String,
        /// Default currency for the household's bills
        #[arg(long)]
        currency: Option<String>,
    },
    /// List households.
    List,
}

#[derive(Subcommand)]
pub enum TxnCommands {
    /// Record a ledger transaction by hand. Positive amounts are outflows.
    Add {
        #[arg(long)]
        household: Option<String>,
        /// Date: YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        amount: Decimal,
        #[arg(long)]
        merchant: Option<String>,
    },
    /// Hide a transaction from matching and search.
    Hide {
        id: i64,
        /// Make a hidden transaction visible again
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Subcommand)]
pub enum BillCommands {
    /// Add a recurring bill.
    Add {
        name: String,
        #[arg(long)]
        household: Option<String>,
        /// Expected amount per month
        #[arg(long)]
        amount: Decimal,
        /// Day of month the bill is due (1-31, clamped to short months)
        #[arg(long = "due-day")]
        due_day: u32,
        #[arg(long)]
        currency: Option<String>,
        /// Merchant whose transactions settle this bill
        #[arg(long)]
        merchant: Option<String>,
        /// First date the bill applies (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last date the bill applies (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List a household's bills.
    List {
        #[arg(long)]
        household: Option<String>,
    },
    /// Edit a bill. Omitted fields keep their value.
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long = "due-day")]
        due_day: Option<u32>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        merchant: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Stop generating payments until resumed.
    Pause { id: i64 },
    /// Resume a paused or cancelled bill.
    Resume { id: i64 },
    /// Cancel a bill.
    Cancel { id: i64 },
    /// Delete a bill with all its payments, links and rejections.
    Delete { id: i64 },
    /// Create a bill pre-filled from a ledger transaction.
    FromTxn {
        /// Transaction ID
        id: i64,
        /// Override the bill name
        #[arg(long)]
        name: Option<String>,
        /// Override the due day (default: the transaction's day)
        #[arg(long = "due-day")]
        due_day: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum PaymentCommands {
    /// List a month's payments.
    List {
        #[arg(long)]
        household: Option<String>,
        /// Month: YYYY-MM (default: current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// Show a payment with its linked transactions.
    Show { id: i64 },
    /// Ranked transactions that could settle the payment.
    Candidates { id: i64 },
    /// Search unlinked transactions to match by hand.
    Search {
        /// Payment ID
        id: i64,
        /// Name contains
        #[arg(long)]
        text: Option<String>,
        #[arg(long = "from")]
        from_date: Option<NaiveDate>,
        #[arg(long = "to")]
        to_date: Option<NaiveDate>,
    },
    /// Link a transaction to the payment.
    Match { id: i64, txn: i64 },
    /// Unlink one transaction, or all of them when none is given.
    Unmatch { id: i64, txn: Option<i64> },
    /// Skip this payment; linked transactions are released.
    Skip { id: i64 },
    /// Never suggest this transaction for this payment again.
    Reject { id: i64, txn: i64 },
    /// Change the amount expected for this payment only.
    Amount { id: i64, amount: Decimal },
    /// Auto-match one payment, or every unpaid payment of a household.
    AutoMatch {
        /// Payment ID
        id: Option<i64>,
        #[arg(long)]
        household: Option<String>,
    },
}
