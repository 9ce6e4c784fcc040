use std::sync::Arc;

use crucible_core::engine::runner::Runner;
use crucible_core::model::{ModelSpec, RunParams};
use crucible_core::pack::load_pack;
use crucible_core::providers::anthropic::AnthropicAdapter;
use crucible_core::providers::fake::FakeAdapter;
use crucible_core::providers::openai::OpenAiAdapter;
use crucible_core::providers::ModelAdapter;
use crucible_core::storage::store::Store;

use crate::cli::args::RunArgs;

pub async fn execute(args: RunArgs) -> anyhow::Result<i32> {
    let pack = load_pack(&args.pack, &args.packs_dir)?;
    let grader = crucible_graders::for_pack(&pack.id).ok_or_else(|| {
        anyhow::anyhow!(
            "no grader registered for pack '{}' (known: {})",
            pack.id,
            crucible_graders::known_packs().join(", ")
        )
    })?;

    let adapters = args
        .models
        .iter()
        .map(|spec| build_adapter(spec))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let store = Store::open(&args.db)?;
    let params = RunParams {
        n: args.n.max(1),
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        tools_enabled: args.tools,
        max_tool_turns: args.max_tool_turns,
        case_timeout_secs: args.case_timeout,
    };

    println!(
        "Running pack '{}' with {} cases, n={}",
        pack.name,
        pack.cases.len(),
        params.n
    );

    let runner = Runner {
        store,
        grader,
        params,
    };
    let outcomes = runner.run_matrix(&pack, &adapters).await;

    let mut code = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(summary) => println!(
                "  run {}  model {}  outputs {}  failed generations {}",
                summary.run_id, summary.model_id, summary.outputs, summary.failures
            ),
            Err(e) => {
                eprintln!("  model {} failed: {:#}", outcome.model_id, e);
                code = 1;
            }
        }
    }
    println!("Results saved to {}", args.db.display());
    Ok(code)
}

fn build_adapter(spec: &str) -> anyhow::Result<Arc<dyn ModelAdapter>> {
    let spec = ModelSpec::parse(spec)?;
    match spec.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiAdapter::from_env(spec.name)?)),
        "anthropic" => Ok(Arc::new(AnthropicAdapter::from_env(spec.name)?)),
        "ollama" => Ok(Arc::new(OpenAiAdapter::ollama(spec.name))),
        "fake" => Ok(Arc::new(FakeAdapter::echo(spec.name))),
        other => anyhow::bail!("unknown provider '{}'", other),
    }
}
