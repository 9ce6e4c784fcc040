use crucible_core::report::markdown_report;
use crucible_core::storage::store::{QueryFilter, Store};

use crate::cli::args::ReportArgs;

pub fn execute(args: ReportArgs) -> anyhow::Result<i32> {
    let store = Store::open(&args.db)?;
    let run_id = match args.run.or(store.latest_run_id()?) {
        Some(id) => id,
        None => {
            println!("No runs found in database.");
            return Ok(1);
        }
    };

    let run = store.run_info(run_id)?;
    let rows = store.fetch_graded(&QueryFilter {
        run_id: Some(run_id),
        ..Default::default()
    })?;
    let md = markdown_report(&run, &rows);

    match &args.out {
        Some(path) => {
            std::fs::write(path, md)?;
            println!("Report generated: {}", path.display());
        }
        None => println!("{}", md),
    }
    Ok(0)
}
