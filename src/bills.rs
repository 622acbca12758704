use chrono::{Datelike, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::error::{BillError, Result};
use crate::ledger::{get_household, get_merchant};
use crate::models::{to_cents, BillPayment, BillStatus, LedgerTransaction, PaymentStatus, RecurringBill};

// ---------------------------------------------------------------------------
// Month arithmetic
// ---------------------------------------------------------------------------

pub fn beginning_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    end_of_month(date).day()
}

/// The concrete due date of a bill in the month containing `month`,
/// clamped to the last day of shorter months.
pub fn due_date_for_month(due_day: u32, month: NaiveDate) -> NaiveDate {
    let day = due_day.clamp(1, days_in_month(month));
    NaiveDate::from_ymd_opt(month.year(), month.month(), day).unwrap_or_else(|| end_of_month(month))
}

impl RecurringBill {
    pub fn due_date_for_month(&self, month: NaiveDate) -> NaiveDate {
        due_date_for_month(self.due_day, month)
    }
}

// ---------------------------------------------------------------------------
// Create / update / delete
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewBill {
    pub household_id: i64,
    pub name: String,
    pub expected_amount: Decimal,
    pub currency: String,
    pub due_day: u32,
    pub merchant_id: Option<i64>,
    pub status: BillStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewBill {
    pub fn new(household_id: i64, name: &str, expected_amount: Decimal, currency: &str, due_day: u32) -> Self {
        Self {
            household_id,
            name: name.to_string(),
            expected_amount,
            currency: currency.to_string(),
            due_day,
            merchant_id: None,
            status: BillStatus::Active,
            start_date: None,
            end_date: None,
            notes: None,
        }
    }
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct BillUpdate {
    pub name: Option<String>,
    pub expected_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub due_day: Option<u32>,
    pub merchant_id: Option<Option<i64>>,
    pub status: Option<BillStatus>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
}

fn validate(conn: &Connection, bill: &NewBill) -> Result<()> {
    if bill.name.trim().is_empty() {
        return Err(BillError::validation("name", "can't be blank"));
    }
    if bill.expected_amount <= Decimal::ZERO {
        return Err(BillError::validation("expected_amount", "must be greater than 0"));
    }
    if to_cents(bill.expected_amount)? <= 0 {
        return Err(BillError::validation("expected_amount", "must be at least one cent"));
    }
    if !(1..=31).contains(&bill.due_day) {
        return Err(BillError::validation("due_day", format!("{} is not between 1 and 31", bill.due_day)));
    }
    if bill.currency.trim().is_empty() {
        return Err(BillError::validation("currency", "can't be blank"));
    }
    if let (Some(start), Some(end)) = (bill.start_date, bill.end_date) {
        if start > end {
            return Err(BillError::validation("end_date", "must not be before start_date"));
        }
    }
    if let Some(merchant_id) = bill.merchant_id {
        let merchant = get_merchant(conn, merchant_id)?;
        if merchant.household_id != bill.household_id {
            return Err(BillError::UnknownMerchant(merchant_id));
        }
    }
    Ok(())
}

pub fn create_bill(conn: &Connection, bill: &NewBill) -> Result<RecurringBill> {
    get_household(conn, bill.household_id)?;
    validate(conn, bill)?;
    conn.execute(
        "INSERT INTO recurring_bills \
         (household_id, merchant_id, name, expected_amount_cents, currency, due_day, status, start_date, end_date, notes) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            bill.household_id,
            bill.merchant_id,
            bill.name.trim(),
            to_cents(bill.expected_amount)?,
            bill.currency.trim().to_uppercase(),
            bill.due_day,
            bill.status,
            bill.start_date,
            bill.end_date,
            bill.notes,
        ],
    )?;
    let bill = get_bill(conn, conn.last_insert_rowid())?;
    tracing::debug!(bill_id = bill.id, name = %bill.name, "created recurring bill");
    Ok(bill)
}

/// Edits a bill template. Existing payment instances keep the amount they
/// were generated with.
pub fn update_bill(conn: &Connection, id: i64, update: BillUpdate) -> Result<RecurringBill> {
    let current = get_bill(conn, id)?;
    let merged = NewBill {
        household_id: current.household_id,
        name: update.name.unwrap_or(current.name),
        expected_amount: update.expected_amount.unwrap_or(current.expected_amount),
        currency: update.currency.unwrap_or(current.currency),
        due_day: update.due_day.unwrap_or(current.due_day),
        merchant_id: update.merchant_id.unwrap_or(current.merchant_id),
        status: update.status.unwrap_or(current.status),
        start_date: update.start_date.unwrap_or(current.start_date),
        end_date: update.end_date.unwrap_or(current.end_date),
        notes: update.notes.unwrap_or(current.notes),
    };
    validate(conn, &merged)?;
    conn.execute(
        "UPDATE recurring_bills SET merchant_id = ?1, name = ?2, expected_amount_cents = ?3, currency = ?4, \
         due_day = ?5, status = ?6, start_date = ?7, end_date = ?8, notes = ?9 WHERE id = ?10",
        rusqlite::params![
            merged.merchant_id,
            merged.name.trim(),
            to_cents(merged.expected_amount)?,
            merged.currency.trim().to_uppercase(),
            merged.due_day,
            merged.status,
            merged.start_date,
            merged.end_date,
            merged.notes,
            id,
        ],
    )?;
    get_bill(conn, id)
}

pub fn set_status(conn: &Connection, id: i64, status: BillStatus) -> Result<RecurringBill> {
    update_bill(
        conn,
        id,
        BillUpdate {
            status: Some(status),
            ..Default::default()
        },
    )
}

/// Deletes the bill and, through the schema's cascades, its payments,
/// their links and their rejections.
pub fn delete_bill(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn.execute("DELETE FROM recurring_bills WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(BillError::UnknownBill(id));
    }
    tracing::debug!(bill_id = id, "deleted recurring bill");
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn get_bill(conn: &Connection, id: i64) -> Result<RecurringBill> {
    let sql = format!("SELECT {} FROM recurring_bills b WHERE b.id = ?1", RecurringBill::COLUMNS);
    conn.query_row(&sql, [id], RecurringBill::from_row)
        .optional()?
        .ok_or(BillError::UnknownBill(id))
}

pub fn list_bills(conn: &Connection, household_id: i64) -> Result<Vec<RecurringBill>> {
    let sql = format!(
        "SELECT {} FROM recurring_bills b WHERE b.household_id = ?1 ORDER BY b.due_day, b.name",
        RecurringBill::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([household_id], RecurringBill::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Active bills whose start/end window overlaps the month containing `month`.
pub fn active_bills_for_month(conn: &Connection, household_id: i64, month: NaiveDate) -> Result<Vec<RecurringBill>> {
    let sql = format!(
        "SELECT {} FROM recurring_bills b \
         WHERE b.household_id = ?1 AND b.status = 'active' \
           AND (b.start_date IS NULL OR b.start_date <= ?2) \
           AND (b.end_date IS NULL OR b.end_date >= ?3) \
         ORDER BY b.due_day, b.name",
        RecurringBill::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params![household_id, end_of_month(month), beginning_of_month(month)],
        RecurringBill::from_row,
    )?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Payment generation
// ---------------------------------------------------------------------------

/// Find-or-create the payment for the bill's due date in `month`. A new
/// payment copies the bill's current expected amount and currency.
pub fn ensure_payment_for_month(conn: &Connection, bill: &RecurringBill, month: NaiveDate) -> Result<BillPayment> {
    let due_date = bill.due_date_for_month(month);
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO bill_payments (recurring_bill_id, due_date, expected_amount_cents, currency, status) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            bill.id,
            due_date,
            to_cents(bill.expected_amount)?,
            bill.currency,
            PaymentStatus::Pending,
        ],
    )?;
    if inserted > 0 {
        tracing::debug!(bill_id = bill.id, %due_date, "generated bill payment");
    }
    let sql = format!(
        "SELECT {} FROM bill_payments p WHERE p.recurring_bill_id = ?1 AND p.due_date = ?2",
        BillPayment::COLUMNS
    );
    Ok(conn.query_row(&sql, rusqlite::params![bill.id, due_date], BillPayment::from_row)?)
}

/// Generate payments for every active bill covering the month. Returns
/// how many were newly created.
pub fn ensure_payments_for_household(conn: &Connection, household_id: i64, month: NaiveDate) -> Result<usize> {
    let count_sql = "SELECT count(*) FROM bill_payments p JOIN recurring_bills b ON b.id = p.recurring_bill_id \
                        WHERE b.household_id = ?1";
    let before: i64 = conn.query_row(count_sql, [household_id], |r| r.get(0))?;
    for bill in active_bills_for_month(conn, household_id, month)? {
        ensure_payment_for_month(conn, &bill, month)?;
    }
    let after: i64 = conn.query_row(count_sql, [household_id], |r| r.get(0))?;
    Ok((after - before) as usize)
}

/// Pre-fill a bill from a ledger transaction.
pub fn bill_draft_from_transaction(txn: &LedgerTransaction) -> NewBill {
    NewBill {
        household_id: txn.household_id,
        name: txn.name.clone(),
        expected_amount: txn.amount.abs(),
        currency: txn.currency.clone(),
        due_day: txn.date.day(),
        merchant_id: txn.merchant_id,
        status: BillStatus::Active,
        start_date: None,
        end_date: None,
        notes: None,
    }
}
