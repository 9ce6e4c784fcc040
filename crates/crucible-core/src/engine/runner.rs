use std::sync::Arc;

use tokio::time::timeout;

use crate::fingerprint;
use crate::grader_api::Grader;
use crate::model::{ModelSpec, OutputRecord, RunParams, RunStatus};
use crate::pack::PackConfig;
use crate::providers::ModelAdapter;
use crate::storage::store::Store;

pub struct Runner {
    pub store: Store,
    pub grader: Arc<dyn Grader>,
    pub params: RunParams,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub model_id: String,
    pub pack_id: String,
    pub outputs: usize,
    pub failures: usize,
}

/// Per-model result of a matrix invocation; one model's outage never
/// aborts the others.
pub struct ModelOutcome {
    pub model_id: String,
    pub result: anyhow::Result<RunSummary>,
}

impl Runner {
    /// Runs the pack against each adapter sequentially, isolating failures
    /// per model.
    pub async fn run_matrix(
        &self,
        pack: &PackConfig,
        adapters: &[Arc<dyn ModelAdapter>],
    ) -> Vec<ModelOutcome> {
        let mut outcomes = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let model_id = adapter.model_id();
            let result = self.run_pack(pack, adapter.as_ref()).await;
            if let Err(e) = &result {
                tracing::error!(model = %model_id, error = %e, "model evaluation failed");
            }
            outcomes.push(ModelOutcome { model_id, result });
        }
        outcomes
    }

    /// One Run: every (case × repetition) pair gets exactly one persisted
    /// output (success or recorded failure) and exactly one score.
    pub async fn run_pack(
        &self,
        pack: &PackConfig,
        adapter: &dyn ModelAdapter,
    ) -> anyhow::Result<RunSummary> {
        let spec = ModelSpec {
            provider: adapter.provider().to_string(),
            name: adapter.model_name().to_string(),
        };
        let model_id = self.store.register_model(&spec)?;
        let git_sha = fingerprint::git_revision();
        let run_id = self
            .store
            .create_run(&pack.id, &model_id, git_sha.as_deref(), &self.params)?;

        tracing::info!(
            run_id,
            model = %model_id,
            pack = %pack.id,
            cases = pack.cases.len(),
            n = self.params.n,
            "starting run"
        );

        match self.run_cases(pack, adapter, run_id).await {
            Ok((outputs, failures)) => {
                self.store.finalize_run(run_id, RunStatus::Complete)?;
                tracing::info!(run_id, outputs, failures, "run complete");
                Ok(RunSummary {
                    run_id,
                    model_id,
                    pack_id: pack.id.clone(),
                    outputs,
                    failures,
                })
            }
            Err(e) => {
                let _ = self.store.finalize_run(run_id, RunStatus::Failed);
                Err(e)
            }
        }
    }

    async fn run_cases(
        &self,
        pack: &PackConfig,
        adapter: &dyn ModelAdapter,
        run_id: i64,
    ) -> anyhow::Result<(usize, usize)> {
        let gen_params = self.params.gen_params();
        let total = pack.cases.len() * self.params.n as usize;
        let mut completed = 0usize;
        let mut failures = 0usize;

        for case in &pack.cases {
            self.store.upsert_case(&pack.id, case)?;
            let prompt = render_prompt(&case.prompt, &case.metadata);

            for rep in 0..self.params.n {
                let attempt = timeout(
                    self.params.case_timeout(),
                    adapter.generate(&prompt, &pack.system_prompt, &gen_params),
                )
                .await;

                let output = match attempt {
                    Ok(Ok(gen)) => OutputRecord::from_generation(gen),
                    Ok(Err(e)) => {
                        tracing::warn!(
                            case = %case.id,
                            rep,
                            kind = e.kind.as_str(),
                            error = %e,
                            "generation failed"
                        );
                        failures += 1;
                        OutputRecord::from_failure()
                    }
                    Err(_) => {
                        tracing::warn!(case = %case.id, rep, "case timeout exceeded");
                        failures += 1;
                        OutputRecord::from_failure()
                    }
                };

                // Failed outputs are graded like any other; graders treat
                // empty text as a normal failing classification.
                let grade =
                    self.grader
                        .grade(&output.raw_text, case.expected.as_deref(), &case.metadata);
                self.store
                    .insert_graded(run_id, &case.id, rep, &output, &grade)?;

                completed += 1;
                tracing::info!(
                    case = %case.id,
                    rep,
                    score = grade.score,
                    label = %grade.label,
                    "[{}/{}]",
                    completed,
                    total
                );
            }
        }
        Ok((completed, failures))
    }
}

/// Substitutes `{key}` placeholders with string values from the case
/// metadata; unknown placeholders are left as-is.
fn render_prompt(template: &str, metadata: &serde_json::Value) -> String {
    let Some(map) = metadata.as_object() else {
        return template.to_string();
    };
    let mut prompt = template.to_string();
    for (key, value) in map {
        if let Some(s) = value.as_str() {
            prompt = prompt.replace(&format!("{{{}}}", key), s);
        }
    }
    prompt
}
