use chrono::Duration;
use rusqlite::Connection;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::bills::get_bill;
use crate::db::unit_of_work;
use crate::error::{BillError, Result};
use crate::models::{BillPayment, LedgerTransaction};
use crate::payments::{self, get_payment, payment_household};

/// Candidates must fall within this many days of the due date, either side.
pub const MATCH_WINDOW_DAYS: i64 = 7;

/// Lower bound of the amount band, as a fraction of the expected amount.
pub fn lower_tolerance() -> Decimal {
    Decimal::new(80, 2)
}

/// Upper bound of the amount band, as a fraction of the expected amount.
pub fn upper_tolerance() -> Decimal {
    Decimal::new(120, 2)
}

/// Inclusive cents band a candidate's outflow must land in.
pub fn amount_band(expected: Decimal) -> Result<(i64, i64)> {
    let scaled = |fraction: Decimal| {
        expected
            .checked_mul(fraction)
            .and_then(|v| v.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or_else(|| BillError::validation("expected_amount", format!("{expected} is out of range")))
    };
    let cents = |v: Decimal| {
        v.to_i64()
            .ok_or_else(|| BillError::validation("expected_amount", format!("{expected} is out of range")))
    };
    let low = cents(scaled(lower_tolerance())?.ceil())?;
    let high = cents(scaled(upper_tolerance())?.floor())?;
    Ok((low, high))
}

/// Ranked ledger transactions that could settle the payment: closest to the
/// due date first, ties broken by transaction id.
pub fn bill_match_candidates(conn: &Connection, payment_id: i64) -> Result<Vec<LedgerTransaction>> {
    let payment = get_payment(conn, payment_id)?;
    let bill = get_bill(conn, payment.recurring_bill_id)?;
    let household_id = payment_household(conn, payment_id)?;
    candidates_for(conn, household_id, &payment, bill.merchant_id)
}

fn candidates_for(
    conn: &Connection,
    household_id: i64,
    payment: &BillPayment,
    merchant_id: Option<i64>,
) -> Result<Vec<LedgerTransaction>> {
    let (low, high) = amount_band(payment.expected_amount)?;
    let window = Duration::days(MATCH_WINDOW_DAYS);
    let sql = format!(
        "SELECT {} FROM transactions t
         WHERE t.household_id = ?1
           AND t.is_hidden = 0
           AND t.amount_cents > 0
           AND t.amount_cents BETWEEN ?2 AND ?3
           AND t.date BETWEEN ?4 AND ?5
           AND (?6 IS NULL OR t.merchant_id = ?6)
           AND t.id NOT IN (SELECT transaction_id FROM bill_payment_transactions)
           AND t.id NOT IN (SELECT transaction_id FROM rejected_bill_matches WHERE bill_payment_id = ?7)
         ORDER BY ABS(julianday(t.date) - julianday(?8)), t.id",
        LedgerTransaction::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params![
            household_id,
            low,
            high,
            payment.due_date - window,
            payment.due_date + window,
            merchant_id,
            payment.id,
            payment.due_date,
        ],
        LedgerTransaction::from_row,
    )?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Link the best candidate to an unpaid payment. Returns whether a link was
/// made; paid and skipped payments are left alone.
pub fn auto_match(conn: &Connection, payment_id: i64) -> Result<bool> {
    unit_of_work(conn, |tx| {
        let payment = get_payment(tx, payment_id)?;
        if !payment.status.is_unpaid() {
            return Ok(false);
        }
        let Some(best) = bill_match_candidates(tx, payment_id)?.into_iter().next() else {
            return Ok(false);
        };
        tracing::info!(payment_id, transaction_id = best.id, "auto-matched bill payment");
        payments::add_transaction(tx, payment_id, best.id)?;
        Ok(true)
    })
}

/// Auto-match every unpaid payment of the household, earliest due first.
/// Returns how many payments were settled.
pub fn auto_match_all(conn: &Connection, household_id: i64) -> Result<usize> {
    unit_of_work(conn, |tx| {
        let mut matched = 0;
        for entry in payments::unpaid_payments(tx, household_id)? {
            if auto_match(tx, entry.payment.id)? {
                matched += 1;
            }
        }
        Ok(matched)
    })
}
