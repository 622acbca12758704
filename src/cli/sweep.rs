use std::time::Duration;

use colored::Colorize;

use billkeeper::error::Result;
use billkeeper::settings::{db_path, load_settings};
use billkeeper::sweep::{run_forever, run_sweep};

use super::{open_db, today};

pub fn run(watch: bool) -> Result<()> {
    if watch {
        open_db()?;
        let hours = load_settings().sweep_interval_hours.max(1);
        println!("Sweeping every {hours}h. Press Ctrl-C to stop.");
        return run_forever(&db_path(), Duration::from_secs(hours * 3600));
    }

    let conn = open_db()?;
    let report = run_sweep(&conn, today())?;
    for h in &report.households {
        println!(
            "{}: {} overdue, {} generated, {} matched",
            h.name, h.overdue, h.generated, h.matched
        );
    }
    for failure in &report.failures {
        println!("{}: {}", failure.name.red().bold(), failure.error);
    }
    if report.households.is_empty() && report.failures.is_empty() {
        println!("No households to sweep.");
    }
    Ok(())
}
