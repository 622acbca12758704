use comfy_table::{Cell, Table};

use billkeeper::error::Result;
use billkeeper::ledger::{create_household, list_households};
use billkeeper::settings::load_settings;

use super::open_db;

pub fn add(name: &str, currency: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let default_currency = load_settings().currency;
    let household = create_household(&conn, name, currency.unwrap_or(&default_currency))?;
    println!("Added household: {} ({})", household.name, household.currency);
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = open_db()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Currency"]);
    for h in list_households(&conn)? {
        table.add_row(vec![Cell::new(h.id), Cell::new(h.name), Cell::new(h.currency)]);
    }
    println!("Households\n{table}");
    Ok(())
}
