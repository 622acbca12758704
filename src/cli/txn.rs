use chrono::NaiveDate;
use rust_decimal::Decimal;

use billkeeper::error::Result;
use billkeeper::fmt::money;
use billkeeper::ledger::{add_transaction, find_or_create_merchant, set_hidden, NewTransaction};

use super::{open_db, resolve_household};

pub fn add(household: Option<&str>, date: NaiveDate, name: &str, amount: Decimal, merchant: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let household = resolve_household(&conn, household)?;
    let merchant_id = match merchant {
        Some(m) => Some(find_or_create_merchant(&conn, household.id, m)?.id),
        None => None,
    };
    let txn = add_transaction(
        &conn,
        household.id,
        &NewTransaction {
            date,
            name: name.to_string(),
            amount,
            currency: household.currency.clone(),
            merchant_id,
        },
    )?;
    println!("Added transaction #{}: {} {} on {}", txn.id, txn.name, money(txn.amount), txn.date);
    Ok(())
}

pub fn hide(id: i64, undo: bool) -> Result<()> {
    let conn = open_db()?;
    set_hidden(&conn, id, !undo)?;
    if undo {
        println!("Transaction #{id} is visible again");
    } else {
        println!("Transaction #{id} hidden");
    }
    Ok(())
}
