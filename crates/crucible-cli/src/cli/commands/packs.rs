use crucible_core::pack::{list_packs, load_pack};

use crate::cli::args::PacksArgs;

pub fn execute(args: PacksArgs) -> anyhow::Result<i32> {
    let names = list_packs(&args.packs_dir);
    if names.is_empty() {
        println!("No packs found.");
        return Ok(0);
    }
    for name in names {
        match load_pack(&name, &args.packs_dir) {
            Ok(pack) => {
                let graded = if crucible_graders::for_pack(&pack.id).is_some() {
                    ""
                } else {
                    "  [no grader registered]"
                };
                println!(
                    "  {:<28}  {} ({} cases){}",
                    pack.id,
                    pack.name,
                    pack.cases.len(),
                    graded
                );
            }
            Err(e) => println!("  {:<28}  invalid: {:#}", name, e),
        }
    }
    Ok(0)
}
