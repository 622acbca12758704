use chrono::{Duration, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::bills::{beginning_of_month, end_of_month};
use crate::db::unit_of_work;
use crate::error::{BillError, Result};
use crate::ledger::household_transaction;
use crate::models::{
    to_cents, AlertLevel, BillPayment, LedgerTransaction, PaymentStatus, PaymentWithBill,
};

/// Days ahead of the due date at which an unpaid payment starts warning.
pub const DUE_SOON_DAYS: i64 = 7;

impl BillPayment {
    /// Presentation-only urgency of the payment relative to `today`.
    pub fn alert_level(&self, today: NaiveDate) -> Option<AlertLevel> {
        match self.status {
            PaymentStatus::Paid | PaymentStatus::Skipped => None,
            PaymentStatus::Overdue => Some(AlertLevel::Error),
            PaymentStatus::Pending if self.due_date <= today => Some(AlertLevel::Error),
            PaymentStatus::Pending if self.due_date <= today + Duration::days(DUE_SOON_DAYS) => {
                Some(AlertLevel::Warning)
            }
            PaymentStatus::Pending => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn get_payment(conn: &Connection, id: i64) -> Result<BillPayment> {
    let sql = format!("SELECT {} FROM bill_payments p WHERE p.id = ?1", BillPayment::COLUMNS);
    conn.query_row(&sql, [id], BillPayment::from_row)
        .optional()?
        .ok_or(BillError::UnknownPayment(id))
}

pub fn get_payment_with_bill(conn: &Connection, id: i64) -> Result<PaymentWithBill> {
    let sql = format!(
        "SELECT {}, b.name FROM bill_payments p JOIN recurring_bills b ON b.id = p.recurring_bill_id WHERE p.id = ?1",
        BillPayment::COLUMNS
    );
    conn.query_row(&sql, [id], payment_with_bill_from_row)
        .optional()?
        .ok_or(BillError::UnknownPayment(id))
}

fn payment_with_bill_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentWithBill> {
    Ok(PaymentWithBill {
        payment: BillPayment::from_row(row)?,
        bill_name: row.get(8)?,
    })
}

/// Household that owns the payment, through its bill.
pub fn payment_household(conn: &Connection, payment_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT b.household_id FROM bill_payments p JOIN recurring_bills b ON b.id = p.recurring_bill_id \
         WHERE p.id = ?1",
        [payment_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or(BillError::UnknownPayment(payment_id))
}

pub fn payments_for_month(conn: &Connection, household_id: i64, month: NaiveDate) -> Result<Vec<PaymentWithBill>> {
    let sql = format!(
        "SELECT {}, b.name FROM bill_payments p JOIN recurring_bills b ON b.id = p.recurring_bill_id \
         WHERE b.household_id = ?1 AND p.due_date BETWEEN ?2 AND ?3 \
         ORDER BY p.due_date, b.name, p.id",
        BillPayment::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params![household_id, beginning_of_month(month), end_of_month(month)],
        payment_with_bill_from_row,
    )?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Pending and overdue payments of the household, earliest due first.
pub fn unpaid_payments(conn: &Connection, household_id: i64) -> Result<Vec<PaymentWithBill>> {
    let sql = format!(
        "SELECT {}, b.name FROM bill_payments p JOIN recurring_bills b ON b.id = p.recurring_bill_id \
         WHERE b.household_id = ?1 AND p.status IN ('pending', 'overdue') \
         ORDER BY p.due_date, p.id",
        BillPayment::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([household_id], payment_with_bill_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn linked_transactions(conn: &Connection, payment_id: i64) -> Result<Vec<LedgerTransaction>> {
    let sql = format!(
        "SELECT {} FROM bill_payment_transactions l JOIN transactions t ON t.id = l.transaction_id \
         WHERE l.bill_payment_id = ?1 ORDER BY t.date, t.id",
        LedgerTransaction::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([payment_id], LedgerTransaction::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn is_rejected(conn: &Connection, payment_id: i64, transaction_id: i64) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM rejected_bill_matches WHERE bill_payment_id = ?1 AND transaction_id = ?2")?;
    Ok(stmt.exists([payment_id, transaction_id])?)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Derive actual amount, paid date and paid/pending status from the link
/// table. Must run after every link mutation; idempotent.
pub fn recalculate_totals(conn: &Connection, payment_id: i64) -> Result<BillPayment> {
    let (count, total_cents, latest): (i64, Option<i64>, Option<NaiveDate>) = conn.query_row(
        "SELECT count(*), SUM(ABS(t.amount_cents)), MAX(t.date) \
         FROM bill_payment_transactions l JOIN transactions t ON t.id = l.transaction_id \
         WHERE l.bill_payment_id = ?1",
        [payment_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;

    let changed = if count > 0 {
        conn.execute(
            "UPDATE bill_payments SET actual_amount_cents = ?1, paid_date = ?2, status = ?3 WHERE id = ?4",
            rusqlite::params![total_cents, latest, PaymentStatus::Paid, payment_id],
        )?
    } else {
        conn.execute(
            "UPDATE bill_payments SET actual_amount_cents = NULL, paid_date = NULL, status = ?1 WHERE id = ?2",
            rusqlite::params![PaymentStatus::Pending, payment_id],
        )?
    };
    if changed == 0 {
        return Err(BillError::UnknownPayment(payment_id));
    }
    get_payment(conn, payment_id)
}

// ---------------------------------------------------------------------------
// Link mutations
// ---------------------------------------------------------------------------

/// Link a ledger transaction to the payment and re-derive its totals.
/// Linking an already-linked pair changes nothing.
pub fn add_transaction(conn: &Connection, payment_id: i64, transaction_id: i64) -> Result<BillPayment> {
    unit_of_work(conn, |tx| {
        let payment = get_payment(tx, payment_id)?;
        if payment.status == PaymentStatus::Skipped {
            return Err(BillError::PaymentSkipped(payment_id));
        }
        let household_id = payment_household(tx, payment_id)?;
        household_transaction(tx, household_id, transaction_id)?;

        let elsewhere: Option<i64> = tx
            .query_row(
                "SELECT bill_payment_id FROM bill_payment_transactions \
                 WHERE transaction_id = ?1 AND bill_payment_id != ?2 LIMIT 1",
                [transaction_id, payment_id],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(other) = elsewhere {
            tracing::warn!(
                payment_id,
                transaction_id,
                other_payment_id = other,
                "transaction is already linked to another bill payment"
            );
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO bill_payment_transactions (bill_payment_id, transaction_id) VALUES (?1, ?2)",
            [payment_id, transaction_id],
        )?;
        if inserted == 0 {
            return Ok(payment);
        }
        tracing::debug!(payment_id, transaction_id, "linked transaction");
        recalculate_totals(tx, payment_id)
    })
}

/// Single-transaction form kept for callers that think in "mark paid".
pub fn mark_paid(conn: &Connection, payment_id: i64, transaction_id: i64) -> Result<BillPayment> {
    add_transaction(conn, payment_id, transaction_id)
}

/// Unlink a transaction and re-derive totals. Unlinking a pair that is not
/// linked changes nothing.
pub fn remove_transaction(conn: &Connection, payment_id: i64, transaction_id: i64) -> Result<BillPayment> {
    unit_of_work(conn, |tx| {
        let payment = get_payment(tx, payment_id)?;
        let removed = tx.execute(
            "DELETE FROM bill_payment_transactions WHERE bill_payment_id = ?1 AND transaction_id = ?2",
            [payment_id, transaction_id],
        )?;
        if removed == 0 {
            return Ok(payment);
        }
        tracing::debug!(payment_id, transaction_id, "unlinked transaction");
        recalculate_totals(tx, payment_id)
    })
}

/// Drop every link and re-derive totals. This is also how a skipped
/// payment is reset to pending.
pub fn unmatch_all(conn: &Connection, payment_id: i64) -> Result<BillPayment> {
    unit_of_work(conn, |tx| {
        get_payment(tx, payment_id)?;
        tx.execute(
            "DELETE FROM bill_payment_transactions WHERE bill_payment_id = ?1",
            [payment_id],
        )?;
        recalculate_totals(tx, payment_id)
    })
}

/// Mark the payment skipped. Linked transactions are released so they can
/// be matched elsewhere.
pub fn skip(conn: &Connection, payment_id: i64) -> Result<BillPayment> {
    unit_of_work(conn, |tx| {
        get_payment(tx, payment_id)?;
        tx.execute(
            "DELETE FROM bill_payment_transactions WHERE bill_payment_id = ?1",
            [payment_id],
        )?;
        tx.execute(
            "UPDATE bill_payments SET status = ?1, actual_amount_cents = NULL, paid_date = NULL WHERE id = ?2",
            rusqlite::params![PaymentStatus::Skipped, payment_id],
        )?;
        get_payment(tx, payment_id)
    })
}

/// Record that `transaction_id` must never be suggested for this payment
/// again. Unlinks it first if it is currently linked. Returns false when
/// the rejection already existed.
pub fn reject_match(conn: &Connection, payment_id: i64, transaction_id: i64) -> Result<bool> {
    unit_of_work(conn, |tx| {
        let household_id = payment_household(tx, payment_id)?;
        household_transaction(tx, household_id, transaction_id)?;
        remove_transaction(tx, payment_id, transaction_id)?;
        if is_rejected(tx, payment_id, transaction_id)? {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO rejected_bill_matches (bill_payment_id, transaction_id) VALUES (?1, ?2)",
            [payment_id, transaction_id],
        )?;
        tracing::debug!(payment_id, transaction_id, "rejected match");
        Ok(true)
    })
}

/// Change the amount expected for this one instance.
pub fn set_expected_amount(conn: &Connection, payment_id: i64, amount: Decimal) -> Result<BillPayment> {
    if amount <= Decimal::ZERO || to_cents(amount)? <= 0 {
        return Err(BillError::validation("expected_amount", "must be greater than 0"));
    }
    let changed = conn.execute(
        "UPDATE bill_payments SET expected_amount_cents = ?1 WHERE id = ?2",
        rusqlite::params![to_cents(amount)?, payment_id],
    )?;
    if changed == 0 {
        return Err(BillError::UnknownPayment(payment_id));
    }
    get_payment(conn, payment_id)
}

// ---------------------------------------------------------------------------
// Ageing
// ---------------------------------------------------------------------------

/// Flip the household's pending payments due before `today` to overdue.
pub fn mark_overdue(conn: &Connection, household_id: i64, today: NaiveDate) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE bill_payments SET status = ?1 \
         WHERE status = ?2 AND due_date < ?3 \
           AND recurring_bill_id IN (SELECT id FROM recurring_bills WHERE household_id = ?4)",
        rusqlite::params![PaymentStatus::Overdue, PaymentStatus::Pending, today, household_id],
    )?;
    Ok(changed)
}
