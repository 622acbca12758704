use colored::Colorize;
use comfy_table::{Cell, Table};

use billkeeper::error::Result;
use billkeeper::fmt::money;
use billkeeper::ledger::LedgerIncome;
use billkeeper::models::{AlertLevel, PaymentWithBill};
use billkeeper::reports::{build_alerts, build_calendar, build_cashflow_projection, month_summary};

use super::{open_db, parse_month_opt, resolve_household, status_label, today};

pub fn calendar(household: Option<&str>, month: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let household = resolve_household(&conn, household)?;
    let month = parse_month_opt(month)?;
    let days = build_calendar(&conn, household.id, month, today())?;

    let mut table = Table::new();
    table.set_header(vec!["Day", "ID", "Bill", "Amount", "Status"]);
    for (day, entries) in &days {
        for (i, e) in entries.iter().enumerate() {
            let name = match e.alert_level {
                Some(AlertLevel::Error) => e.name.red().to_string(),
                Some(AlertLevel::Warning) => e.name.yellow().to_string(),
                None => e.name.clone(),
            };
            table.add_row(vec![
                Cell::new(if i == 0 { day.to_string() } else { String::new() }),
                Cell::new(e.payment_id),
                Cell::new(name),
                Cell::new(money(e.amount)),
                Cell::new(status_label(e.status)),
            ]);
        }
    }
    println!("{}, {}\n{table}", household.name, month.format("%B %Y"));
    Ok(())
}

fn print_bucket(title: &str, entries: &[PaymentWithBill]) {
    if entries.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec!["ID", "Bill", "Due", "Expected"]);
    for e in entries {
        table.add_row(vec![
            Cell::new(e.payment.id),
            Cell::new(&e.bill_name),
            Cell::new(e.payment.due_date),
            Cell::new(money(e.payment.expected_amount)),
        ]);
    }
    println!("{title}\n{table}");
}

pub fn alerts(household: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let household = resolve_household(&conn, household)?;
    let alerts = build_alerts(&conn, household.id, today())?;
    if alerts.is_empty() {
        println!("Nothing due in the next week.");
        return Ok(());
    }
    print_bucket(&"Overdue".red().bold().to_string(), &alerts.overdue);
    print_bucket(&"Due today".yellow().bold().to_string(), &alerts.due_today);
    print_bucket(&"Due this week".bold().to_string(), &alerts.due_soon);
    Ok(())
}

pub fn cashflow(household: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let household = resolve_household(&conn, household)?;
    let today = today();
    let income = LedgerIncome::new(&conn, today);
    let rows = build_cashflow_projection(&conn, household.id, today, &income)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Bills", "Count", "Income", "Net"]);
    for row in rows {
        let net = if row.net.is_sign_negative() {
            money(row.net).red().to_string()
        } else {
            money(row.net).green().to_string()
        };
        table.add_row(vec![
            Cell::new(row.label),
            Cell::new(money(row.total_bills)),
            Cell::new(row.bills_count),
            Cell::new(money(row.estimated_income)),
            Cell::new(net),
        ]);
    }
    println!("Cash Flow Projection\n{table}");
    Ok(())
}

pub fn summary(household: Option<&str>, month: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let household = resolve_household(&conn, household)?;
    let month = parse_month_opt(month)?;
    let s = month_summary(&conn, household.id, month)?;

    println!("{}, {}", household.name, month.format("%B %Y"));
    println!("To pay:   {} ({} bills)", money(s.to_pay), s.pending_count);
    println!("Paid:     {} ({} bills)", money(s.paid), s.paid_count);
    if s.skipped_count > 0 {
        println!("Skipped:  {}", s.skipped_count);
    }
    Ok(())
}
