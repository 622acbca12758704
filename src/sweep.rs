use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::bills::ensure_payments_for_household;
use crate::db::{get_connection, init_db, set_metadata, unit_of_work};
use crate::error::Result;
use crate::ledger::list_households;
use crate::matcher::auto_match_all;
use crate::models::Household;
use crate::payments::mark_overdue;

pub const LAST_SWEEP_KEY: &str = "last_sweep";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HouseholdSweep {
    pub household_id: i64,
    pub name: String,
    pub overdue: usize,
    pub generated: usize,
    pub matched: usize,
}

#[derive(Debug, Clone)]
pub struct SweepFailure {
    pub household_id: i64,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub date: Option<NaiveDate>,
    pub households: Vec<HouseholdSweep>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn total_overdue(&self) -> usize {
        self.households.iter().map(|h| h.overdue).sum()
    }

    pub fn total_generated(&self) -> usize {
        self.households.iter().map(|h| h.generated).sum()
    }

    pub fn total_matched(&self) -> usize {
        self.households.iter().map(|h| h.matched).sum()
    }
}

/// One household's maintenance pass, all-or-nothing: age pending payments,
/// generate this month's payments, then retry auto-matching.
pub fn sweep_household(conn: &Connection, household: &Household, today: NaiveDate) -> Result<HouseholdSweep> {
    unit_of_work(conn, |tx| {
        let overdue = mark_overdue(tx, household.id, today)?;
        let generated = ensure_payments_for_household(tx, household.id, today)?;
        let matched = auto_match_all(tx, household.id)?;
        Ok(HouseholdSweep {
            household_id: household.id,
            name: household.name.clone(),
            overdue,
            generated,
            matched,
        })
    })
}

/// Sweep every household. A household that fails is rolled back, logged
/// and reported; the rest still run.
pub fn run_sweep(conn: &Connection, today: NaiveDate) -> Result<SweepReport> {
    let mut report = SweepReport {
        date: Some(today),
        ..Default::default()
    };

    for household in list_households(conn)? {
        match sweep_household(conn, &household, today) {
            Ok(done) => {
                tracing::debug!(
                    household_id = household.id,
                    overdue = done.overdue,
                    generated = done.generated,
                    matched = done.matched,
                    "household swept"
                );
                report.households.push(done);
            }
            Err(e) => {
                tracing::error!(
                    household_id = household.id,
                    household = %household.name,
                    %today,
                    error = %e,
                    "household sweep failed"
                );
                report.failures.push(SweepFailure {
                    household_id: household.id,
                    name: household.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    set_metadata(conn, LAST_SWEEP_KEY, &today.to_string())?;
    tracing::info!(
        households = report.households.len(),
        failures = report.failures.len(),
        overdue = report.total_overdue(),
        generated = report.total_generated(),
        matched = report.total_matched(),
        "sweep finished"
    );
    Ok(report)
}

/// Sweep on a fixed interval until the process is stopped. Each run opens
/// its own connection; a run that cannot reach the database is logged and
/// retried next interval.
pub fn run_forever(db_path: &Path, interval: Duration) -> Result<()> {
    loop {
        let today = chrono::Local::now().date_naive();
        let outcome = get_connection(db_path).and_then(|conn| {
            init_db(&conn)?;
            run_sweep(&conn, today)
        });
        if let Err(e) = outcome {
            tracing::error!(db = %db_path.display(), error = %e, "sweep run failed");
        }
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bills::{create_bill, ensure_payment_for_month, NewBill};
    use crate::db::get_metadata;
    use crate::ledger::{add_transaction, create_household, NewTransaction};
    use crate::models::PaymentStatus;
    use crate::payments::{get_payment, payments_for_month, skip};
    use rust_decimal::Decimal;
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

    fn outflow(conn: &Connection, household_id: i64, day: &str, amount: &str) -> i64 {
        add_transaction(
            conn,
            household_id,
            &NewTransaction {
                date: date(day),
                name: "Card payment".to_string(),
                amount: dec(amount),
                currency: "USD".to_string(),
                merchant_id: None,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_sweep_generates_ages_and_matches() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let internet = create_bill(&conn, &NewBill::new(home.id, "Internet", dec("100"), "USD", 15)).unwrap();
        let december = ensure_payment_for_month(&conn, &internet, date("2024-12-01")).unwrap();
        create_bill(&conn, &NewBill::new(home.id, "Rent", dec("1500"), "USD", 1)).unwrap();
        outflow(&conn, home.id, "2025-01-14", "101.00");

        let report = run_sweep(&conn, date("2025-01-20")).unwrap();
        assert!(report.failures.is_empty());
        let swept = &report.households[0];
        assert_eq!(swept.overdue, 1);
        assert_eq!(swept.generated, 2);
        assert_eq!(swept.matched, 1);

        assert_eq!(get_payment(&conn, december.id).unwrap().status, PaymentStatus::Overdue);
        let january = payments_for_month(&conn, home.id, date("2025-01-01")).unwrap();
        assert_eq!(january.len(), 2);
        let internet_jan = january.iter().find(|p| p.bill_name == "Internet").unwrap();
        assert_eq!(internet_jan.payment.status, PaymentStatus::Paid);
        let rent_jan = january.iter().find(|p| p.bill_name == "Rent").unwrap();
        assert_eq!(rent_jan.payment.status, PaymentStatus::Pending);
        assert_eq!(get_metadata(&conn, LAST_SWEEP_KEY).as_deref(), Some("2025-01-20"));
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        create_bill(&conn, &NewBill::new(home.id, "Internet", dec("100"), "USD", 15)).unwrap();
        run_sweep(&conn, date("2025-01-10")).unwrap();
        let second = run_sweep(&conn, date("2025-01-10")).unwrap();
        assert_eq!(second.households[0], HouseholdSweep {
            household_id: home.id,
            name: "Home".to_string(),
            overdue: 0,
            generated: 0,
            matched: 0,
        });
        assert_eq!(payments_for_month(&conn, home.id, date("2025-01-01")).unwrap().len(), 1);
    }

    #[test]
    fn test_newly_generated_past_due_payment_ages_next_run() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        create_bill(&conn, &NewBill::new(home.id, "Water", dec("30"), "USD", 5)).unwrap();
        run_sweep(&conn, date("2025-01-10")).unwrap();
        let first = payments_for_month(&conn, home.id, date("2025-01-01")).unwrap();
        assert_eq!(first[0].payment.status, PaymentStatus::Pending);
        run_sweep(&conn, date("2025-01-10")).unwrap();
        let second = payments_for_month(&conn, home.id, date("2025-01-01")).unwrap();
        assert_eq!(second[0].payment.status, PaymentStatus::Overdue);
    }

    #[test]
    fn test_sweep_leaves_skipped_payments_alone() {
        let (_dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let bill = create_bill(&conn, &NewBill::new(home.id, "Gym", dec("40"), "USD", 3)).unwrap();
        let payment = ensure_payment_for_month(&conn, &bill, date("2025-01-01")).unwrap();
        skip(&conn, payment.id).unwrap();
        outflow(&conn, home.id, "2025-01-03", "40.00");

        run_sweep(&conn, date("2025-01-20")).unwrap();
        assert_eq!(get_payment(&conn, payment.id).unwrap().status, PaymentStatus::Skipped);
    }

    #[test]
    fn test_failing_household_is_isolated_and_rolled_back() {
        let (_dir, conn) = test_db();
        let broken = create_household(&conn, "Broken", "USD").unwrap();
        let healthy = create_household(&conn, "Healthy", "USD").unwrap();

        let old_bill = create_bill(&conn, &NewBill::new(broken.id, "Phone", dec("50"), "USD", 2)).unwrap();
        let stale = ensure_payment_for_month(&conn, &old_bill, date("2024-12-01")).unwrap();
        let bad_bill = create_bill(&conn, &NewBill::new(broken.id, "Insurance", dec("80"), "USD", 9)).unwrap();
        create_bill(&conn, &NewBill::new(healthy.id, "Internet", dec("100"), "USD", 15)).unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER fail_insurance BEFORE INSERT ON bill_payments \
             WHEN NEW.recurring_bill_id = {} BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            bad_bill.id
        ))
        .unwrap();

        let report = run_sweep(&conn, date("2025-01-20")).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].household_id, broken.id);
        assert_eq!(report.households.len(), 1);
        assert_eq!(report.households[0].household_id, healthy.id);

        // The broken household's overdue flip was rolled back with the rest.
        assert_eq!(get_payment(&conn, stale.id).unwrap().status, PaymentStatus::Pending);
        assert!(payments_for_month(&conn, broken.id, date("2025-01-01")).unwrap().is_empty());
        assert_eq!(payments_for_month(&conn, healthy.id, date("2025-01-01")).unwrap().len(), 1);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_sweep_with_no_households() {
        let (_dir, conn) = test_db();
        let report = run_sweep(&conn, date("2025-01-20")).unwrap();
        assert!(report.households.is_empty());
        assert_eq!(report.total_matched(), 0);
    }
}
