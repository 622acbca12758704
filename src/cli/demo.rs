use chrono::{Datelike, Months, NaiveDate};
use rusqlite::Connection;
use rust_decimal::Decimal;

use billkeeper::bills::{beginning_of_month, create_bill, due_date_for_month, ensure_payments_for_household, NewBill};
use billkeeper::db::unit_of_work;
use billkeeper::error::Result;
use billkeeper::ledger::{add_transaction, create_household, find_household, find_or_create_merchant, NewTransaction};
use billkeeper::sweep::sweep_household;

use super::{open_db, today};

const HOUSEHOLD_NAME: &str = "Demo Household";
const MONTHS_OF_HISTORY: u32 = 6;

struct DemoBill {
    name: &'static str,
    merchant: &'static str,
    cents: i64,
    due_day: u32,
}

const BILLS: &[DemoBill] = &[
    DemoBill { name: "Rent", merchant: "Parkview Properties", cents: 150_000, due_day: 1 },
    DemoBill { name: "Streaming", merchant: "Netflix", cents: 1_549, due_day: 3 },
    DemoBill { name: "Phone", merchant: "Mint Mobile", cents: 4_500, due_day: 8 },
    DemoBill { name: "Internet", merchant: "Comcast", cents: 8_000, due_day: 15 },
    DemoBill { name: "Electric", merchant: "City Power", cents: 11_000, due_day: 21 },
    DemoBill { name: "Car Insurance", merchant: "Geico", cents: 22_000, due_day: 25 },
];

/// Payments the household actually made: (merchant, day, cents by month index).
/// Car insurance is never paid, so it shows up overdue.
const OUTFLOWS: &[(&str, u32, [i64; 6])] = &[
    ("Parkview Properties", 1, [150_000; 6]),
    ("Netflix", 3, [1_549; 6]),
    ("Mint Mobile", 7, [4_500, 4_500, 4_812, 4_500, 4_500, 4_500]),
    ("Comcast", 14, [7_999, 7_999, 8_499, 7_999, 7_999, 8_499]),
    ("City Power", 22, [9_420, 12_885, 10_410, 13_120, 9_875, 11_260]),
];

/// Twice-monthly paycheck, recorded as inflows.
const PAYCHECK_CENTS: i64 = 285_000;

fn insert_demo_data(conn: &Connection, today: NaiveDate) -> Result<(usize, usize)> {
    let household = create_household(conn, HOUSEHOLD_NAME, "USD")?;
    let first = beginning_of_month(today)
        .checked_sub_months(Months::new(MONTHS_OF_HISTORY - 1))
        .unwrap_or(today);

    for b in BILLS {
        let merchant = find_or_create_merchant(conn, household.id, b.merchant)?;
        let mut draft = NewBill::new(household.id, b.name, Decimal::new(b.cents, 2), "USD", b.due_day);
        draft.merchant_id = Some(merchant.id);
        create_bill(conn, &draft)?;
    }

    let mut txn_count = 0;
    for i in 0..MONTHS_OF_HISTORY {
        let Some(month) = first.checked_add_months(Months::new(i)) else {
            continue;
        };
        let mut rows: Vec<(NaiveDate, String, i64, Option<i64>)> = vec![
            (due_date_for_month(1, month), "PAYROLL DEPOSIT".to_string(), -PAYCHECK_CENTS, None),
            (due_date_for_month(15, month), "PAYROLL DEPOSIT".to_string(), -PAYCHECK_CENTS, None),
        ];
        for (merchant, day, amounts) in OUTFLOWS {
            let merchant_id = find_or_create_merchant(conn, household.id, merchant)?.id;
            rows.push((
                due_date_for_month(*day, month),
                merchant.to_uppercase(),
                amounts[i as usize % amounts.len()],
                Some(merchant_id),
            ));
        }
        for (date, name, cents, merchant_id) in rows {
            if date > today {
                continue;
            }
            add_transaction(
                conn,
                household.id,
                &NewTransaction {
                    date,
                    name,
                    amount: Decimal::new(cents, 2),
                    currency: "USD".to_string(),
                    merchant_id,
                },
            )?;
            txn_count += 1;
        }
        if month.month() != today.month() || month.year() != today.year() {
            ensure_payments_for_household(conn, household.id, month)?;
        }
    }

    sweep_household(conn, &household, today)?;
    Ok((BILLS.len(), txn_count))
}

pub fn run() -> Result<()> {
    let conn = open_db()?;

    if find_household(&conn, HOUSEHOLD_NAME).is_ok() {
        println!("Demo data already loaded.");
        return Ok(());
    }

    let (bills, txns) = unit_of_work(&conn, |tx| insert_demo_data(tx, today()))?;
    println!("Loaded {HOUSEHOLD_NAME}: {bills} bills, {txns} transactions");
    println!("Try `billkeeper calendar --household \"{HOUSEHOLD_NAME}\"` or `billkeeper alerts`.");
    Ok(())
}
