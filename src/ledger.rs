use chrono::{Months, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::error::{BillError, Result};
use crate::models::{from_cents, to_cents, Household, LedgerTransaction, Merchant};

// ---------------------------------------------------------------------------
// Households
// ---------------------------------------------------------------------------

pub fn create_household(conn: &Connection, name: &str, currency: &str) -> Result<Household> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BillError::validation("name", "household name can't be blank"));
    }
    if currency.trim().is_empty() {
        return Err(BillError::validation("currency", "currency can't be blank"));
    }
    conn.execute(
        "INSERT INTO households (name, currency) VALUES (?1, ?2)",
        rusqlite::params![name, currency.trim().to_uppercase()],
    )?;
    get_household(conn, conn.last_insert_rowid())
}

pub fn get_household(conn: &Connection, id: i64) -> Result<Household> {
    conn.query_row(
        "SELECT id, name, currency FROM households WHERE id = ?1",
        [id],
        |row| {
            Ok(Household {
                id: row.get(0)?,
                name: row.get(1)?,
                currency: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| BillError::UnknownHousehold(id.to_string()))
}

pub fn find_household(conn: &Connection, name: &str) -> Result<Household> {
    conn.query_row(
        "SELECT id, name, currency FROM households WHERE name = ?1",
        [name],
        |row| {
            Ok(Household {
                id: row.get(0)?,
                name: row.get(1)?,
                currency: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| BillError::UnknownHousehold(name.to_string()))
}

pub fn list_households(conn: &Connection) -> Result<Vec<Household>> {
    let mut stmt = conn.prepare("SELECT id, name, currency FROM households ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Household {
            id: row.get(0)?,
            name: row.get(1)?,
            currency: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Merchants
// ---------------------------------------------------------------------------

pub fn find_or_create_merchant(conn: &Connection, household_id: i64, name: &str) -> Result<Merchant> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BillError::validation("merchant", "merchant name can't be blank"));
    }
    conn.execute(
        "INSERT OR IGNORE INTO merchants (household_id, name) VALUES (?1, ?2)",
        rusqlite::params![household_id, name],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM merchants WHERE household_id = ?1 AND name = ?2",
        rusqlite::params![household_id, name],
        |r| r.get(0),
    )?;
    Ok(Merchant {
        id,
        household_id,
        name: name.to_string(),
    })
}

pub fn get_merchant(conn: &Connection, id: i64) -> Result<Merchant> {
    conn.query_row(
        "SELECT id, household_id, name FROM merchants WHERE id = ?1",
        [id],
        |row| {
            Ok(Merchant {
                id: row.get(0)?,
                household_id: row.get(1)?,
                name: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(BillError::UnknownMerchant(id))
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub name: String,
    /// Signed; positive is money leaving the household.
    pub amount: Decimal,
    pub currency: String,
    pub merchant_id: Option<i64>,
}

pub fn add_transaction(conn: &Connection, household_id: i64, txn: &NewTransaction) -> Result<LedgerTransaction> {
    get_household(conn, household_id)?;
    if let Some(merchant_id) = txn.merchant_id {
        let merchant = get_merchant(conn, merchant_id)?;
        if merchant.household_id != household_id {
            return Err(BillError::UnknownMerchant(merchant_id));
        }
    }
    conn.execute(
        "INSERT INTO transactions (household_id, date, name, amount_cents, currency, merchant_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            household_id,
            txn.date,
            txn.name,
            to_cents(txn.amount)?,
            txn.currency,
            txn.merchant_id,
        ],
    )?;
    get_transaction(conn, conn.last_insert_rowid())
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<LedgerTransaction> {
    let sql = format!("SELECT {} FROM transactions t WHERE t.id = ?1", LedgerTransaction::COLUMNS);
    conn.query_row(&sql, [id], LedgerTransaction::from_row)
        .optional()?
        .ok_or(BillError::UnknownTransaction(id))
}

/// Fetch a transaction, insisting it belongs to the given household.
pub fn household_transaction(conn: &Connection, household_id: i64, id: i64) -> Result<LedgerTransaction> {
    let txn = get_transaction(conn, id)?;
    if txn.household_id != household_id {
        return Err(BillError::UnknownTransaction(id));
    }
    Ok(txn)
}

pub fn set_hidden(conn: &Connection, id: i64, hidden: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE transactions SET is_hidden = ?1 WHERE id = ?2",
        rusqlite::params![hidden, id],
    )?;
    if changed == 0 {
        return Err(BillError::UnknownTransaction(id));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct TransactionSearch {
    pub text: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub const SEARCH_LIMIT: usize = 20;

/// Visible, unlinked outflows for picking a match by hand. Newest first.
pub fn search_transactions(
    conn: &Connection,
    household_id: i64,
    search: &TransactionSearch,
) -> Result<Vec<LedgerTransaction>> {
    let mut clauses = vec![
        "t.household_id = ?".to_string(),
        "t.is_hidden = 0".to_string(),
        "t.amount_cents > 0".to_string(),
        "t.id NOT IN (SELECT transaction_id FROM bill_payment_transactions)".to_string(),
    ];
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(household_id)];

    if let Some(text) = search.text.as_deref().filter(|t| !t.trim().is_empty()) {
        clauses.push("t.name LIKE ? ESCAPE '\\'".to_string());
        let escaped = text.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        params.push(Box::new(format!("%{escaped}%")));
    }
    if let Some(start) = search.start_date {
        clauses.push("t.date >= ?".to_string());
        params.push(Box::new(start));
    }
    if let Some(end) = search.end_date {
        clauses.push("t.date <= ?".to_string());
        params.push(Box::new(end));
    }

    let sql = format!(
        "SELECT {} FROM transactions t WHERE {} ORDER BY t.date DESC, t.id DESC LIMIT {SEARCH_LIMIT}",
        LedgerTransaction::COLUMNS,
        clauses.join(" AND "),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
        LedgerTransaction::from_row,
    )?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Income statistic
// ---------------------------------------------------------------------------

/// Household income estimate consumed by the cashflow projection.
pub trait IncomeSource {
    fn median_monthly_income(&self, household_id: i64) -> Result<Decimal>;
}

pub const INCOME_LOOKBACK_MONTHS: u32 = 12;

/// Median of monthly inflow totals over the twelve months before `as_of`.
pub struct LedgerIncome<'a> {
    conn: &'a Connection,
    as_of: NaiveDate,
}

impl<'a> LedgerIncome<'a> {
    pub fn new(conn: &'a Connection, as_of: NaiveDate) -> Self {
        Self { conn, as_of }
    }
}

impl IncomeSource for LedgerIncome<'_> {
    fn median_monthly_income(&self, household_id: i64) -> Result<Decimal> {
        let since = self
            .as_of
            .checked_sub_months(Months::new(INCOME_LOOKBACK_MONTHS))
            .unwrap_or(self.as_of);
        let mut stmt = self.conn.prepare(
            "SELECT substr(date, 1, 7) AS month, SUM(-amount_cents) \
             FROM transactions \
             WHERE household_id = ?1 AND is_hidden = 0 AND amount_cents < 0 \
               AND date >= ?2 AND date <= ?3 \
             GROUP BY month",
        )?;
        let mut totals: Vec<i64> = stmt
            .query_map(rusqlite::params![household_id, since, self.as_of], |row| row.get(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(median_cents(&mut totals))
    }
}

/// A fixed income figure, for callers that compute income elsewhere.
pub struct FixedIncome(pub Decimal);

impl IncomeSource for FixedIncome {
    fn median_monthly_income(&self, _household_id: i64) -> Result<Decimal> {
        Ok(self.0)
    }
}

fn median_cents(values: &mut [i64]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        from_cents(values[mid])
    } else {
        (from_cents(values[mid - 1]) + from_cents(values[mid])) / Decimal::TWO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use std::str::FromStr;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn txn(conn: &Connection, household_id: i64, day: &str, name: &str, amount: &str) -> LedgerTransaction {
        add_transaction(
            conn,
            household_id,
            &NewTransaction {
                date: date(day),
                name: name.to_string(),
                amount: dec(amount),
                currency: "USD".to_string(),
                merchant_id: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_create_household_rejects_blank_name() {
        let (_dir, conn) = test_db();
        assert!(matches!(
            create_household(&conn, "  ", "USD"),
            Err(BillError::Validation { field: "name", .. })
        ));
    }

    #[test]
    fn test_find_household_by_name() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "usd").unwrap();
        let found = find_household(&conn, "Home").unwrap();
        assert_eq!(found.id, home.id);
        assert_eq!(found.currency, "USD");
        assert!(find_household(&conn, "Cabin").is_err());
    }

    #[test]
    fn test_find_or_create_merchant_is_idempotent() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let a = find_or_create_merchant(&conn, home.id, "City Power").unwrap();
        let b = find_or_create_merchant(&conn, home.id, "City Power").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_add_transaction_rejects_foreign_merchant() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let other = create_household(&conn, "Other", "USD").unwrap();
        let merchant = find_or_create_merchant(&conn, other.id, "Gym").unwrap();
        let result = add_transaction(
            &conn,
            home.id,
            &NewTransaction {
                date: date("2025-01-10"),
                name: "Gym".to_string(),
                amount: dec("30"),
                currency: "USD".to_string(),
                merchant_id: Some(merchant.id),
            },
        );
        assert!(matches!(result, Err(BillError::UnknownMerchant(_))));
    }

    #[test]
    fn test_household_transaction_scoping() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let other = create_household(&conn, "Other", "USD").unwrap();
        let t = txn(&conn, other.id, "2025-01-10", "Coffee", "4.50");
        assert!(household_transaction(&conn, home.id, t.id).is_err());
        assert_eq!(household_transaction(&conn, other.id, t.id).unwrap().amount, dec("4.50"));
    }

    #[test]
    fn test_search_excludes_hidden_inflows_and_linked() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let visible = txn(&conn, home.id, "2025-01-10", "Water Utility", "45.00");
        let hidden = txn(&conn, home.id, "2025-01-11", "Water Utility", "45.00");
        txn(&conn, home.id, "2025-01-12", "Paycheck", "-2000.00");
        let linked = txn(&conn, home.id, "2025-01-13", "Water Utility", "45.00");
        set_hidden(&conn, hidden.id, true).unwrap();
        conn.execute(
            "INSERT INTO recurring_bills (household_id, name, expected_amount_cents, currency, due_day) \
             VALUES (?1, 'Water', 4500, 'USD', 10)",
            [home.id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO bill_payments (recurring_bill_id, due_date, expected_amount_cents, currency) \
             VALUES (1, '2025-01-10', 4500, 'USD')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO bill_payment_transactions (bill_payment_id, transaction_id) VALUES (1, ?1)",
            [linked.id],
        )
        .unwrap();

        let found = search_transactions(&conn, home.id, &TransactionSearch::default()).unwrap();
        let ids: Vec<i64> = found.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![visible.id]);
    }

    #[test]
    fn test_search_text_and_date_filters() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let power = txn(&conn, home.id, "2025-02-03", "CITY POWER CO", "80.00");
        txn(&conn, home.id, "2025-01-03", "CITY POWER CO", "80.00");
        txn(&conn, home.id, "2025-02-04", "Grocer", "55.00");
        let search = TransactionSearch {
            text: Some("power".to_string()),
            start_date: Some(date("2025-02-01")),
            end_date: Some(date("2025-02-28")),
        };
        let found = search_transactions(&conn, home.id, &search).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, power.id);
    }

    #[test]
    fn test_search_newest_first() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let older = txn(&conn, home.id, "2025-01-01", "A", "10");
        let newer = txn(&conn, home.id, "2025-01-05", "B", "10");
        let found = search_transactions(&conn, home.id, &TransactionSearch::default()).unwrap();
        assert_eq!(found[0].id, newer.id);
        assert_eq!(found[1].id, older.id);
    }

    #[test]
    fn test_median_income_odd_and_even() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        txn(&conn, home.id, "2025-01-15", "Salary", "-3000");
        txn(&conn, home.id, "2025-02-15", "Salary", "-4000");
        txn(&conn, home.id, "2025-02-20", "Bonus", "-500");
        txn(&conn, home.id, "2025-03-15", "Salary", "-3500");
        txn(&conn, home.id, "2025-03-16", "Rent", "1500");
        let income = LedgerIncome::new(&conn, date("2025-03-31"));
        assert_eq!(income.median_monthly_income(home.id).unwrap(), dec("3500"));

        txn(&conn, home.id, "2025-04-15", "Salary", "-3800");
        let income = LedgerIncome::new(&conn, date("2025-04-30"));
        // months: 3000, 3500, 3800, 4500
        assert_eq!(income.median_monthly_income(home.id).unwrap(), dec("3650"));
    }

    #[test]
    fn test_median_income_ignores_old_months() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        txn(&conn, home.id, "2023-01-15", "Salary", "-9000");
        txn(&conn, home.id, "2025-03-15", "Salary", "-3000");
        let income = LedgerIncome::new(&conn, date("2025-03-31"));
        assert_eq!(income.median_monthly_income(home.id).unwrap(), dec("3000"));
    }

    #[test]
    fn test_median_income_empty_is_zero() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let income = LedgerIncome::new(&conn, date("2025-03-31"));
        assert_eq!(income.median_monthly_income(home.id).unwrap(), Decimal::ZERO);
    }
}
