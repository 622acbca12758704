use std::collections::BTreeMap;

use chrono::{Datelike, Duration, Months, NaiveDate};
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::bills::{active_bills_for_month, beginning_of_month};
use crate::error::Result;
use crate::ledger::IncomeSource;
use crate::models::{AlertLevel, PaymentStatus, PaymentWithBill};
use crate::payments::{payments_for_month, unpaid_payments, DUE_SOON_DAYS};

pub const PROJECTION_MONTHS: u32 = 12;

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

pub struct CalendarEntry {
    pub payment_id: i64,
    pub name: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub alert_level: Option<AlertLevel>,
}

/// The month's payments keyed by day of month.
pub fn build_calendar(
    conn: &Connection,
    household_id: i64,
    month: NaiveDate,
    today: NaiveDate,
) -> Result<BTreeMap<u32, Vec<CalendarEntry>>> {
    let mut days: BTreeMap<u32, Vec<CalendarEntry>> = BTreeMap::new();
    for PaymentWithBill { payment, bill_name } in payments_for_month(conn, household_id, month)? {
        days.entry(payment.due_date.day()).or_default().push(CalendarEntry {
            payment_id: payment.id,
            name: bill_name,
            due_date: payment.due_date,
            amount: payment.expected_amount,
            status: payment.status,
            alert_level: payment.alert_level(today),
        });
    }
    Ok(days)
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct BillAlerts {
    pub overdue: Vec<PaymentWithBill>,
    pub due_today: Vec<PaymentWithBill>,
    pub due_soon: Vec<PaymentWithBill>,
}

impl BillAlerts {
    pub fn is_empty(&self) -> bool {
        self.overdue.is_empty() && self.due_today.is_empty() && self.due_soon.is_empty()
    }
}

/// Unpaid payments bucketed relative to `today`, whatever month is on screen.
pub fn build_alerts(conn: &Connection, household_id: i64, today: NaiveDate) -> Result<BillAlerts> {
    let horizon = today + Duration::days(DUE_SOON_DAYS);
    let mut alerts = BillAlerts::default();
    for entry in unpaid_payments(conn, household_id)? {
        let due = entry.payment.due_date;
        if due < today {
            alerts.overdue.push(entry);
        } else if due == today {
            alerts.due_today.push(entry);
        } else if due <= horizon {
            alerts.due_soon.push(entry);
        }
    }
    Ok(alerts)
}

// ---------------------------------------------------------------------------
// Cash Flow Projection
// ---------------------------------------------------------------------------

pub struct CashflowMonth {
    pub month: NaiveDate,
    pub label: String,
    pub total_bills: Decimal,
    pub bills_count: usize,
    pub estimated_income: Decimal,
    pub net: Decimal,
}

/// Expected bill load for this month and the eleven after it, netted
/// against the household's median monthly income.
pub fn build_cashflow_projection(
    conn: &Connection,
    household_id: i64,
    today: NaiveDate,
    income: &dyn IncomeSource,
) -> Result<Vec<CashflowMonth>> {
    let estimated_income = income.median_monthly_income(household_id)?;
    let first = beginning_of_month(today);

    let mut months = Vec::with_capacity(PROJECTION_MONTHS as usize);
    for i in 0..PROJECTION_MONTHS {
        let Some(month) = first.checked_add_months(Months::new(i)) else {
            break;
        };
        let bills = active_bills_for_month(conn, household_id, month)?;
        let total_bills: Decimal = bills.iter().map(|b| b.expected_amount).sum();
        months.push(CashflowMonth {
            month,
            label: month.format("%b %Y").to_string(),
            total_bills,
            bills_count: bills.len(),
            estimated_income,
            net: estimated_income - total_bills,
        });
    }
    Ok(months)
}

// ---------------------------------------------------------------------------
// Month Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq)]
pub struct MonthSummary {
    pub to_pay: Decimal,
    pub paid: Decimal,
    pub pending_count: usize,
    pub paid_count: usize,
    pub skipped_count: usize,
}

pub fn month_summary(conn: &Connection, household_id: i64, month: NaiveDate) -> Result<MonthSummary> {
    let mut summary = MonthSummary::default();
    for PaymentWithBill { payment, .. } in payments_for_month(conn, household_id, month)? {
        match payment.status {
            PaymentStatus::Pending | PaymentStatus::Overdue => {
                summary.to_pay += payment.expected_amount;
                summary.pending_count += 1;
            }
            PaymentStatus::Paid => {
                summary.paid += payment.actual_amount.unwrap_or(payment.expected_amount);
                summary.paid_count += 1;
            }
            PaymentStatus::Skipped => summary.skipped_count += 1,
        }
    }
    Ok(summary)
}
