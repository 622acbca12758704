use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};
use rust_decimal::Decimal;

use billkeeper::error::Result;
use billkeeper::fmt::money;
use billkeeper::ledger::{search_transactions, TransactionSearch};
use billkeeper::matcher::{auto_match, auto_match_all, bill_match_candidates};
use billkeeper::models::{AlertLevel, LedgerTransaction};
use billkeeper::payments::{
    add_transaction, get_payment_with_bill, linked_transactions, payment_household, payments_for_month,
    reject_match, remove_transaction, set_expected_amount, skip as skip_payment, unmatch_all,
};

use super::{open_db, parse_month_opt, resolve_household, status_label, today};

fn transaction_table(txns: &[LedgerTransaction]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Name", "Amount"]);
    for t in txns {
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.date),
            Cell::new(&t.name),
            Cell::new(money(t.amount)),
        ]);
    }
    table
}

pub fn list(household: Option<&str>, month: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let household = resolve_household(&conn, household)?;
    let month = parse_month_opt(month)?;
    let today = today();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Bill", "Due", "Expected", "Actual", "Status"]);
    for entry in payments_for_month(&conn, household.id, month)? {
        let p = &entry.payment;
        let due = match p.alert_level(today) {
            Some(AlertLevel::Error) => p.due_date.to_string().red().to_string(),
            Some(AlertLevel::Warning) => p.due_date.to_string().yellow().to_string(),
            None => p.due_date.to_string(),
        };
        table.add_row(vec![
            Cell::new(p.id),
            Cell::new(&entry.bill_name),
            Cell::new(due),
            Cell::new(money(p.expected_amount)),
            Cell::new(p.actual_amount.map(money).unwrap_or_default()),
            Cell::new(status_label(p.status)),
        ]);
    }
    println!("Payments for {} ({})\n{table}", household.name, month.format("%B %Y"));
    Ok(())
}

pub fn show(id: i64) -> Result<()> {
    let conn = open_db()?;
    let entry = get_payment_with_bill(&conn, id)?;
    let p = &entry.payment;
    println!("Payment #{}: {}", p.id, entry.bill_name);
    println!("Due:       {}", p.due_date);
    println!("Expected:  {} {}", money(p.expected_amount), p.currency);
    println!(
        "Actual:    {}",
        p.actual_amount.map(money).unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Paid on:   {}",
        p.paid_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("Status:    {}", status_label(p.status));

    let linked = linked_transactions(&conn, id)?;
    if !linked.is_empty() {
        println!("\nLinked transactions\n{}", transaction_table(&linked));
    }
    Ok(())
}

pub fn candidates(id: i64) -> Result<()> {
    let conn = open_db()?;
    let txns = bill_match_candidates(&conn, id)?;
    if txns.is_empty() {
        println!("No candidate transactions for payment #{id}.");
        return Ok(());
    }
    println!("Candidates for payment #{id}, best first\n{}", transaction_table(&txns));
    Ok(())
}

pub fn search(id: i64, text: Option<String>, from_date: Option<NaiveDate>, to_date: Option<NaiveDate>) -> Result<()> {
    let conn = open_db()?;
    let household_id = payment_household(&conn, id)?;
    let txns = search_transactions(
        &conn,
        household_id,
        &TransactionSearch {
            text,
            start_date: from_date,
            end_date: to_date,
        },
    )?;
    if txns.is_empty() {
        println!("No matching transactions.");
        return Ok(());
    }
    println!("{}", transaction_table(&txns));
    Ok(())
}

pub fn link(id: i64, txn: i64) -> Result<()> {
    let conn = open_db()?;
    let p = add_transaction(&conn, id, txn)?;
    println!(
        "Linked transaction #{txn} to payment #{id}: {} ({})",
        status_label(p.status),
        p.actual_amount.map(money).unwrap_or_default()
    );
    Ok(())
}

pub fn unlink(id: i64, txn: Option<i64>) -> Result<()> {
    let conn = open_db()?;
    let p = match txn {
        Some(txn) => remove_transaction(&conn, id, txn)?,
        None => unmatch_all(&conn, id)?,
    };
    println!("Payment #{id} is now {}", status_label(p.status));
    Ok(())
}

pub fn skip(id: i64) -> Result<()> {
    let conn = open_db()?;
    let p = skip_payment(&conn, id)?;
    println!("Payment #{id} is now {}", status_label(p.status));
    Ok(())
}

pub fn reject(id: i64, txn: i64) -> Result<()> {
    let conn = open_db()?;
    if reject_match(&conn, id, txn)? {
        println!("Transaction #{txn} will no longer be suggested for payment #{id}");
    } else {
        println!("Transaction #{txn} was already rejected for payment #{id}");
    }
    Ok(())
}

pub fn amount(id: i64, amount: Decimal) -> Result<()> {
    let conn = open_db()?;
    let p = set_expected_amount(&conn, id, amount)?;
    println!("Payment #{id} now expects {}", money(p.expected_amount));
    Ok(())
}

pub fn auto(id: Option<i64>, household: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    match id {
        Some(id) => {
            if auto_match(&conn, id)? {
                println!("Payment #{id} matched");
            } else {
                println!("No match found for payment #{id}");
            }
        }
        None => {
            let household = resolve_household(&conn, household)?;
            let matched = auto_match_all(&conn, household.id)?;
            println!("{matched} payments matched for {}", household.name);
        }
    }
    Ok(())
}
