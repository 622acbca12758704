use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};
use rust_decimal::Decimal;

use billkeeper::bills::{
    bill_draft_from_transaction, create_bill, delete_bill, get_bill, list_bills, set_status, update_bill,
    BillUpdate, NewBill,
};
use billkeeper::error::Result;
use billkeeper::fmt::money;
use billkeeper::ledger::{find_or_create_merchant, get_transaction};
use billkeeper::models::{BillStatus, RecurringBill};

use super::{open_db, resolve_household};

pub struct BillArgs {
    pub name: String,
    pub household: Option<String>,
    pub amount: Decimal,
    pub due_day: u32,
    pub currency: Option<String>,
    pub merchant: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub notes: Option<String>,
}

pub fn add(args: BillArgs) -> Result<()> {
    let conn = open_db()?;
    let household = resolve_household(&conn, args.household.as_deref())?;
    let currency = args.currency.unwrap_or_else(|| household.currency.clone());
    let mut draft = NewBill::new(household.id, &args.name, args.amount, &currency, args.due_day);
    if let Some(m) = args.merchant.as_deref() {
        draft.merchant_id = Some(find_or_create_merchant(&conn, household.id, m)?.id);
    }
    draft.start_date = args.start;
    draft.end_date = args.end;
    draft.notes = args.notes;

    let bill = create_bill(&conn, &draft)?;
    println!(
        "Added bill #{}: {} {} due on day {}",
        bill.id,
        bill.name,
        money(bill.expected_amount),
        bill.due_day
    );
    Ok(())
}

fn status_cell(status: BillStatus) -> Cell {
    match status {
        BillStatus::Active => Cell::new(status.as_str().green()),
        BillStatus::Paused => Cell::new(status.as_str().yellow()),
        BillStatus::Cancelled => Cell::new(status.as_str().dimmed()),
    }
}

fn window(bill: &RecurringBill) -> String {
    match (bill.start_date, bill.end_date) {
        (None, None) => String::new(),
        (start, end) => format!(
            "{} to {}",
            start.map(|d| d.to_string()).unwrap_or_default(),
            end.map(|d| d.to_string()).unwrap_or_default()
        ),
    }
}

pub fn list(household: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let household = resolve_household(&conn, household)?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Amount", "Due Day", "Status", "Window"]);
    for bill in list_bills(&conn, household.id)? {
        table.add_row(vec![
            Cell::new(bill.id),
            Cell::new(&bill.name),
            Cell::new(money(bill.expected_amount)),
            Cell::new(bill.due_day),
            status_cell(bill.status),
            Cell::new(window(&bill)),
        ]);
    }
    println!("Bills for {}\n{table}", household.name);
    Ok(())
}

pub struct EditArgs {
    pub name: Option<String>,
    pub amount: Option<Decimal>,
    pub due_day: Option<u32>,
    pub currency: Option<String>,
    pub merchant: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub notes: Option<String>,
}

pub fn edit(id: i64, args: EditArgs) -> Result<()> {
    let conn = open_db()?;
    let current = get_bill(&conn, id)?;
    let merchant_id = match args.merchant.as_deref() {
        Some(m) => Some(Some(find_or_create_merchant(&conn, current.household_id, m)?.id)),
        None => None,
    };
    let bill = update_bill(
        &conn,
        id,
        BillUpdate {
            name: args.name,
            expected_amount: args.amount,
            currency: args.currency,
            due_day: args.due_day,
            merchant_id,
            status: None,
            start_date: args.start.map(Some),
            end_date: args.end.map(Some),
            notes: args.notes.map(Some),
        },
    )?;
    println!("Updated bill #{}: {} {} due on day {}", bill.id, bill.name, money(bill.expected_amount), bill.due_day);
    Ok(())
}

pub fn change_status(id: i64, status: BillStatus) -> Result<()> {
    let conn = open_db()?;
    let bill = set_status(&conn, id, status)?;
    println!("Bill #{} ({}) is now {}", bill.id, bill.name, bill.status);
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let conn = open_db()?;
    let bill = get_bill(&conn, id)?;
    delete_bill(&conn, id)?;
    println!("Deleted bill #{} ({}) and its payments", id, bill.name);
    Ok(())
}

pub fn from_txn(txn_id: i64, name: Option<String>, due_day: Option<u32>) -> Result<()> {
    let conn = open_db()?;
    let txn = get_transaction(&conn, txn_id)?;
    let mut draft = bill_draft_from_transaction(&txn);
    if let Some(name) = name {
        draft.name = name;
    }
    if let Some(day) = due_day {
        draft.due_day = day;
    }
    let bill = create_bill(&conn, &draft)?;
    println!(
        "Added bill #{} from transaction #{}: {} {} due on day {}",
        bill.id,
        txn.id,
        bill.name,
        money(bill.expected_amount),
        bill.due_day
    );
    Ok(())
}
