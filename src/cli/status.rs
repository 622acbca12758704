use billkeeper::db::{get_connection, get_metadata};
use billkeeper::error::Result;
use billkeeper::fmt::format_bytes;
use billkeeper::settings::{db_path, load_settings};
use billkeeper::sweep::LAST_SWEEP_KEY;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = db_path();

    println!("User:       {}", if settings.user_name.is_empty() { "(not set)" } else { &settings.user_name });
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

        println!("Last sweep: {}", get_metadata(&conn, LAST_SWEEP_KEY).as_deref().unwrap_or("(never)"));
        println!();
        println!("Households:    {}", count("SELECT count(*) FROM households")?);
        println!("Transactions:  {}", count("SELECT count(*) FROM transactions")?);
        println!("Bills:         {}", count("SELECT count(*) FROM recurring_bills WHERE status = 'active'")?);
        println!("Unpaid:        {}", count("SELECT count(*) FROM bill_payments WHERE status IN ('pending', 'overdue')")?);
        println!("Overdue:       {}", count("SELECT count(*) FROM bill_payments WHERE status = 'overdue'")?);
    } else {
        println!();
        println!("Database not found. Run `billkeeper init` to set up.");
    }

    Ok(())
}
