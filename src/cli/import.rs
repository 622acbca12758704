use std::path::PathBuf;

use billkeeper::error::Result;
use billkeeper::importer::{check_file, import_csv};

use super::{open_db, resolve_household};

pub fn run(file: &str, household: Option<&str>) -> Result<()> {
    let file_path = PathBuf::from(file);
    check_file(&file_path)?;
    let conn = open_db()?;
    let household = resolve_household(&conn, household)?;

    let result = import_csv(&conn, household.id, &file_path)?;
    if result.duplicate_file {
        println!("This file has already been imported (duplicate checksum).");
        return Ok(());
    }

    println!("{} imported, {} skipped (duplicates)", result.imported, result.skipped);
    if result.invalid > 0 {
        println!("{} rows could not be read", result.invalid);
    }
    Ok(())
}
