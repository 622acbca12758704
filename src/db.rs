use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::Result;

pub const DB_FILE: &str = "billkeeper.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS households (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    currency TEXT NOT NULL DEFAULT 'USD',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS merchants (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (household_id, name),
    FOREIGN KEY (household_id) REFERENCES households(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    filename TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT,
    FOREIGN KEY (household_id) REFERENCES households(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    name TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    currency TEXT NOT NULL,
    merchant_id INTEGER,
    is_hidden INTEGER NOT NULL DEFAULT 0,
    import_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (household_id) REFERENCES households(id) ON DELETE CASCADE,
    FOREIGN KEY (merchant_id) REFERENCES merchants(id),
    FOREIGN KEY (import_id) REFERENCES imports(id)
);
CREATE INDEX IF NOT EXISTS idx_transactions_household_date ON transactions (household_id, date);

CREATE TABLE IF NOT EXISTS recurring_bills (
    id INTEGER PRIMARY KEY,
    household_id INTEGER NOT NULL,
    merchant_id INTEGER,
    name TEXT NOT NULL,
    expected_amount_cents INTEGER NOT NULL CHECK (expected_amount_cents > 0),
    currency TEXT NOT NULL,
    due_day INTEGER NOT NULL CHECK (due_day BETWEEN 1 AND 31),
    status TEXT NOT NULL DEFAULT 'active',
    start_date TEXT,
    end_date TEXT,
    notes TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (household_id) REFERENCES households(id) ON DELETE CASCADE,
    FOREIGN KEY (merchant_id) REFERENCES merchants(id)
);
CREATE INDEX IF NOT EXISTS idx_recurring_bills_household_status ON recurring_bills (household_id, status);

CREATE TABLE IF NOT EXISTS bill_payments (
    id INTEGER PRIMARY KEY,
    recurring_bill_id INTEGER NOT NULL,
    due_date TEXT NOT NULL,
    expected_amount_cents INTEGER NOT NULL,
    actual_amount_cents INTEGER,
    currency TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    paid_date TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (recurring_bill_id, due_date),
    FOREIGN KEY (recurring_bill_id) REFERENCES recurring_bills(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_bill_payments_due_date ON bill_payments (due_date);
CREATE INDEX IF NOT EXISTS idx_bill_payments_status ON bill_payments (status);

CREATE TABLE IF NOT EXISTS bill_payment_transactions (
    id INTEGER PRIMARY KEY,
    bill_payment_id INTEGER NOT NULL,
    transaction_id INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (bill_payment_id, transaction_id),
    FOREIGN KEY (bill_payment_id) REFERENCES bill_payments(id) ON DELETE CASCADE,
    FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_bill_payment_transactions_txn ON bill_payment_transactions (transaction_id);

CREATE TABLE IF NOT EXISTS rejected_bill_matches (
    id INTEGER PRIMARY KEY,
    bill_payment_id INTEGER NOT NULL,
    transaction_id INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (bill_payment_id, transaction_id),
    FOREIGN KEY (bill_payment_id) REFERENCES bill_payments(id) ON DELETE CASCADE,
    FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Run `f` as one atomic unit of work. Opens an IMMEDIATE transaction so the
/// write lock is held from the first read; when the connection is already
/// inside a transaction, `f` joins it instead.
pub fn unit_of_work<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

pub fn get_metadata(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM metadata WHERE key = ?1", [key], |r| r.get(0))
        .optional()
        .ok()
        .flatten()
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "households",
            "merchants",
            "transactions",
            "imports",
            "recurring_bills",
            "bill_payments",
            "bill_payment_transactions",
            "rejected_bill_matches",
            "metadata",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_payment_unique_per_bill_and_due_date() {
        let (_dir, conn) = test_db();
        conn.execute("INSERT INTO households (name) VALUES ('Home')", []).unwrap();
        conn.execute(
            "INSERT INTO recurring_bills (household_id, name, expected_amount_cents, currency, due_day) \
             VALUES (1, 'Rent', 100000, 'USD', 1)",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO bill_payments (recurring_bill_id, due_date, expected_amount_cents, currency) \
                      VALUES (1, '2025-01-01', 100000, 'USD')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_due_day_check_constraint() {
        let (_dir, conn) = test_db();
        conn.execute("INSERT INTO households (name) VALUES ('Home')", []).unwrap();
        let result = conn.execute(
            "INSERT INTO recurring_bills (household_id, name, expected_amount_cents, currency, due_day) \
             VALUES (1, 'Rent', 100000, 'USD', 32)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unit_of_work_rolls_back_on_error() {
        let (_dir, conn) = test_db();
        let result: Result<()> = unit_of_work(&conn, |tx| {
            tx.execute("INSERT INTO households (name) VALUES ('Home')", [])?;
            Err(crate::error::BillError::Other("boom".to_string()))
        });
        assert!(result.is_err());
        let count: i64 = conn.query_row("SELECT count(*) FROM households", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_unit_of_work_nests_into_outer_transaction() {
        let (_dir, conn) = test_db();
        let result: Result<()> = unit_of_work(&conn, |outer| {
            unit_of_work(outer, |inner| {
                inner.execute("INSERT INTO households (name) VALUES ('Home')", [])?;
                Ok(())
            })?;
            Err(crate::error::BillError::Other("abort outer".to_string()))
        });
        assert!(result.is_err());
        let count: i64 = conn.query_row("SELECT count(*) FROM households", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let (_dir, conn) = test_db();
        assert_eq!(get_metadata(&conn, "last_sweep"), None);
        set_metadata(&conn, "last_sweep", "2025-01-15").unwrap();
        set_metadata(&conn, "last_sweep", "2025-01-16").unwrap();
        assert_eq!(get_metadata(&conn, "last_sweep").as_deref(), Some("2025-01-16"));
    }
}
