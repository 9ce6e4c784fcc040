use crucible_core::storage::store::Store;

use crate::cli::args::MergeArgs;

pub fn execute(args: MergeArgs) -> anyhow::Result<i32> {
    let target = Store::open(&args.db)?;
    let source = Store::open(&args.from)?;

    let stats = target.merge_run(&source, args.from_run, args.into_run)?;
    println!(
        "Merged run {} from {} into run {}: {} outputs copied, {} already present",
        args.from_run,
        args.from.display(),
        args.into_run,
        stats.copied,
        stats.skipped
    );
    Ok(0)
}
