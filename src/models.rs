use std::fmt;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{BillError, Result};

// ---------------------------------------------------------------------------
// Money: stored as integer minor units, handled as Decimal
// ---------------------------------------------------------------------------

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Whole cents, half-cents rounded away from zero. Amounts too large to
/// store are a validation error.
pub fn to_cents(amount: Decimal) -> Result<i64> {
    amount
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| BillError::validation("amount", format!("{amount} is out of range")))
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($text => Some(Self::$variant)),+,
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                Self::parse(raw).ok_or_else(|| FromSqlError::Other(
                    format!("unknown {} value: {raw}", stringify!($name)).into(),
                ))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillStatus {
    Active,
    Paused,
    Cancelled,
}

text_enum!(BillStatus {
    Active => "active",
    Paused => "paused",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
    Skipped,
}

text_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Overdue => "overdue",
    Skipped => "skipped",
});

impl PaymentStatus {
    /// Pending or overdue: the only states the matcher and sweep may touch.
    pub fn is_unpaid(&self) -> bool {
        matches!(self, Self::Pending | Self::Overdue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Error,
}

text_enum!(AlertLevel {
    Warning => "warning",
    Error => "error",
});

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Household {
    pub id: i64,
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct Merchant {
    pub id: i64,
    pub household_id: i64,
    pub name: String,
}

/// A ledger entry. Positive amounts are outflows.
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    pub id: i64,
    pub household_id: i64,
    pub date: NaiveDate,
    pub name: String,
    pub amount: Decimal,
    pub currency: String,
    pub merchant_id: Option<i64>,
    pub is_hidden: bool,
}

impl LedgerTransaction {
    pub const COLUMNS: &'static str =
        "t.id, t.household_id, t.date, t.name, t.amount_cents, t.currency, t.merchant_id, t.is_hidden";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            household_id: row.get(1)?,
            date: row.get(2)?,
            name: row.get(3)?,
            amount: from_cents(row.get(4)?),
            currency: row.get(5)?,
            merchant_id: row.get(6)?,
            is_hidden: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecurringBill {
    pub id: i64,
    pub household_id: i64,
    pub merchant_id: Option<i64>,
    pub name: String,
    pub expected_amount: Decimal,
    pub currency: String,
    pub due_day: u32,
    pub status: BillStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl RecurringBill {
    pub const COLUMNS: &'static str = "b.id, b.household_id, b.merchant_id, b.name, b.expected_amount_cents, \
         b.currency, b.due_day, b.status, b.start_date, b.end_date, b.notes";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            household_id: row.get(1)?,
            merchant_id: row.get(2)?,
            name: row.get(3)?,
            expected_amount: from_cents(row.get(4)?),
            currency: row.get(5)?,
            due_day: row.get(6)?,
            status: row.get(7)?,
            start_date: row.get(8)?,
            end_date: row.get(9)?,
            notes: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BillPayment {
    pub id: i64,
    pub recurring_bill_id: i64,
    pub due_date: NaiveDate,
    pub expected_amount: Decimal,
    pub actual_amount: Option<Decimal>,
    pub currency: String,
    pub status: PaymentStatus,
    pub paid_date: Option<NaiveDate>,
}

impl BillPayment {
    pub const COLUMNS: &'static str = "p.id, p.recurring_bill_id, p.due_date, p.expected_amount_cents, \
         p.actual_amount_cents, p.currency, p.status, p.paid_date";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let actual: Option<i64> = row.get(4)?;
        Ok(Self {
            id: row.get(0)?,
            recurring_bill_id: row.get(1)?,
            due_date: row.get(2)?,
            expected_amount: from_cents(row.get(3)?),
            actual_amount: actual.map(from_cents),
            currency: row.get(5)?,
            status: row.get(6)?,
            paid_date: row.get(7)?,
        })
    }
}

/// Payment joined with the bill name, as the summary builders present it.
#[derive(Debug, Clone)]
pub struct PaymentWithBill {
    pub payment: BillPayment,
    pub bill_name: String,
}
