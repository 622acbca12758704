use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::db::unit_of_work;
use crate::error::{BillError, Result};
use crate::ledger::{find_or_create_merchant, get_household};
use crate::models::to_cents;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a statement amount: `$1,234.56`, `-12.00` or `(12.00)`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return Decimal::from_str(inner.trim()).ok().map(|d| -d);
    }
    Decimal::from_str(s).ok()
}

/// `YYYY-MM-DD` or `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn is_duplicate_row(conn: &Connection, household_id: i64, row: &ParsedRow) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM transactions WHERE household_id = ?1 AND date = ?2 AND amount_cents = ?3 AND name = ?4",
    )?;
    Ok(stmt.exists(rusqlite::params![household_id, row.date, to_cents(row.amount)?, row.name])?)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub date: NaiveDate,
    pub name: String,
    pub amount: Decimal,
    pub merchant: Option<String>,
}

/// Read `date,name,amount[,merchant]` rows. The header row is optional;
/// rows whose date or amount can't be read are skipped and counted.
pub fn parse_csv(file_path: &Path) -> Result<(Vec<ParsedRow>, usize)> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(std::io::BufReader::new(file));

    let mut rows = Vec::new();
    let mut invalid = 0usize;
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        if line == 0 && record.get(0).is_some_and(|f| f.eq_ignore_ascii_case("date")) {
            continue;
        }
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let parsed = (
            record.get(0).and_then(parse_date),
            record.get(1).filter(|n| !n.is_empty()),
            record.get(2).and_then(parse_amount),
        );
        let (Some(date), Some(name), Some(amount)) = parsed else {
            tracing::warn!(line = line + 1, "skipping unreadable row");
            invalid += 1;
            continue;
        };
        rows.push(ParsedRow {
            date,
            name: name.to_string(),
            amount,
            merchant: record.get(3).filter(|m| !m.is_empty()).map(str::to_string),
        });
    }
    Ok((rows, invalid))
}

// ---------------------------------------------------------------------------
// import_csv
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub duplicate_file: bool,
}

pub fn import_csv(conn: &Connection, household_id: i64, file_path: &Path) -> Result<ImportResult> {
    let household = get_household(conn, household_id)?;
    let checksum = compute_checksum(file_path)?;
    let (parsed_rows, invalid) = parse_csv(file_path)?;

    unit_of_work(conn, |tx| {
        let mut stmt = tx.prepare("SELECT 1 FROM imports WHERE checksum = ?1 AND household_id = ?2")?;
        if stmt.exists(rusqlite::params![checksum, household_id])? {
            return Ok(ImportResult {
                duplicate_file: true,
                ..Default::default()
            });
        }

        let filename = file_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        tx.execute(
            "INSERT INTO imports (household_id, filename, record_count, date_range_start, date_range_end, checksum) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                household_id,
                filename,
                parsed_rows.len() as i64,
                parsed_rows.iter().map(|r| r.date).min(),
                parsed_rows.iter().map(|r| r.date).max(),
                checksum,
            ],
        )?;
        let import_id = tx.last_insert_rowid();

        let mut result = ImportResult {
            invalid,
            ..Default::default()
        };
        for row in &parsed_rows {
            if is_duplicate_row(tx, household_id, row)? {
                result.skipped += 1;
                continue;
            }
            let merchant_id = match &row.merchant {
                Some(name) => Some(find_or_create_merchant(tx, household_id, name)?.id),
                None => None,
            };
            tx.execute(
                "INSERT INTO transactions (household_id, date, name, amount_cents, currency, merchant_id, import_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    household_id,
                    row.date,
                    row.name,
                    to_cents(row.amount)?,
                    household.currency,
                    merchant_id,
                    import_id,
                ],
            )?;
            result.imported += 1;
        }
        tracing::info!(
            household_id,
            file = filename,
            imported = result.imported,
            skipped = result.skipped,
            "imported statement"
        );
        Ok(result)
    })
}

/// Fail early with a readable message when the file is missing.
pub fn check_file(file_path: &Path) -> Result<()> {
    if !file_path.is_file() {
        return Err(BillError::Other(format!("file not found: {}", file_path.display())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::ledger::create_household;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn write_csv(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56"), Some(Decimal::from_str("1234.56").unwrap()));
        assert_eq!(parse_amount("(12.50)"), Some(Decimal::from_str("-12.50").unwrap()));
        assert_eq!(parse_amount("-3"), Some(Decimal::from_str("-3").unwrap()));
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 15);
        assert_eq!(parse_date("2025-01-15"), expected);
        assert_eq!(parse_date("01/15/2025"), expected);
        assert_eq!(parse_date("15.01.2025"), None);
    }

    #[test]
    fn test_import_csv() {
        let (dir, conn) = test_db();
        let home = create_household(&conn, "Home", "usd").unwrap();
        let path = write_csv(
            dir.path(),
            "jan.csv",
            "date,name,amount,merchant\n\
             2025-01-14,Comcast Internet,99.99,Comcast\n\
             01/20/2025,Paycheck,(2500.00),\n\
             not-a-date,Broken,1.00,\n",
        );
        let result = import_csv(&conn, home.id, &path).unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.invalid, 1);
        assert!(!result.duplicate_file);

        let (cents, currency, merchant): (i64, String, Option<i64>) = conn
            .query_row(
                "SELECT amount_cents, currency, merchant_id FROM transactions WHERE name = 'Comcast Internet'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(cents, 9999);
        assert_eq!(currency, "USD");
        assert!(merchant.is_some());
        let paycheck: i64 = conn
            .query_row("SELECT amount_cents FROM transactions WHERE name = 'Paycheck'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(paycheck, -250000);
    }

    #[test]
    fn test_reimport_same_file_is_duplicate() {
        let (dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let path = write_csv(dir.path(), "jan.csv", "2025-01-14,Water,30.00\n");
        import_csv(&conn, home.id, &path).unwrap();
        let again = import_csv(&conn, home.id, &path).unwrap();
        assert!(again.duplicate_file);
        assert_eq!(again.imported, 0);
    }

    #[test]
    fn test_overlapping_rows_skipped() {
        let (dir, conn) = test_db();
        let home = create_household(&conn, "Home", "USD").unwrap();
        let first = write_csv(dir.path(), "a.csv", "2025-01-14,Water,30.00\n");
        let second = write_csv(dir.path(), "b.csv", "2025-01-14,Water,30.00\n2025-01-15,Phone,50.00\n");
        import_csv(&conn, home.id, &first).unwrap();
        let result = import_csv(&conn, home.id, &second).unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_import_unknown_household() {
        let (dir, conn) = test_db();
        let path = write_csv(dir.path(), "a.csv", "2025-01-14,Water,30.00\n");
        assert!(matches!(import_csv(&conn, 99, &path), Err(BillError::UnknownHousehold(_))));
    }
}
