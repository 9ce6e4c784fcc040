use crucible_core::grader_api::GradeResult;
use crucible_core::model::{ModelSpec, OutputRecord, RunParams, RunStatus};
use crucible_core::pack::CaseConfig;
use crucible_core::storage::store::{QueryFilter, Store};
use tempfile::tempdir;

fn sample_case(id: &str) -> CaseConfig {
    CaseConfig {
        id: id.to_string(),
        prompt: "Answer the question.\n\nWhat color is the sky?".into(),
        expected: Some("BLUE".into()),
        scheme: Some("control".into()),
        metadata: serde_json::json!({"scheme": "control", "visible_answer": "BLUE"}),
    }
}

fn sample_output(text: &str) -> OutputRecord {
    OutputRecord {
        raw_text: text.to_string(),
        latency_ms: 12.5,
        tokens_in: Some(10),
        tokens_out: Some(3),
        tool_trace: None,
        error: false,
    }
}

#[test]
fn store_lifecycle() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = Store::open(&dir.path().join("results.sqlite"))?;

    let spec = ModelSpec::parse("fake:test-model")?;
    let model_id = store.register_model(&spec)?;
    assert_eq!(model_id, "fake:test-model");
    // re-registering is a no-op
    store.register_model(&spec)?;

    let run_id = store.create_run("demo", &model_id, Some("abc123"), &RunParams::default())?;
    let info = store.run_info(run_id)?;
    assert_eq!(info.pack_id, "demo");
    assert_eq!(info.status, RunStatus::Running);
    assert_eq!(info.git_sha.as_deref(), Some("abc123"));

    let case = sample_case("c1");
    store.upsert_case("demo", &case)?;
    store.upsert_case("demo", &case)?; // idempotent

    for rep in 0..3u32 {
        store.insert_graded(
            run_id,
            "c1",
            rep,
            &sample_output("BLUE"),
            &GradeResult::new(1.0, "CORRECT", "exact match"),
        )?;
    }
    assert_eq!(store.count_outputs(run_id)?, 3);
    assert_eq!(store.count_failures(run_id)?, 0);
    assert_eq!(store.max_rep(run_id, "c1")?, Some(2));

    store.finalize_run(run_id, RunStatus::Complete)?;
    let info = store.run_info(run_id)?;
    assert_eq!(info.status, RunStatus::Complete);
    assert!(info.finished_at.is_some());

    let rows = store.fetch_graded(&QueryFilter {
        run_id: Some(run_id),
        ..Default::default()
    })?;
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter().map(|r| r.rep).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(rows[0].label, "CORRECT");
    assert_eq!(rows[0].scheme.as_deref(), Some("control"));

    Ok(())
}

#[test]
fn duplicate_rep_is_rejected() -> anyhow::Result<()> {
    let store = Store::memory()?;
    let model_id = store.register_model(&ModelSpec::parse("fake:m")?)?;
    let run_id = store.create_run("demo", &model_id, None, &RunParams::default())?;
    store.upsert_case("demo", &sample_case("c1"))?;

    let grade = GradeResult::new(0.0, "INCORRECT", "no match");
    store.insert_graded(run_id, "c1", 0, &sample_output("x"), &grade)?;
    assert!(store
        .insert_graded(run_id, "c1", 0, &sample_output("y"), &grade)
        .is_err());
    assert_eq!(store.count_outputs(run_id)?, 1);

    Ok(())
}

#[test]
fn failed_output_never_orphans_its_score() -> anyhow::Result<()> {
    let store = Store::memory()?;
    let model_id = store.register_model(&ModelSpec::parse("fake:m")?)?;
    let run_id = store.create_run("demo", &model_id, None, &RunParams::default())?;
    store.upsert_case("demo", &sample_case("c1"))?;

    let grade = GradeResult::new(0.0, "INCORRECT", "no match");
    store.insert_graded(run_id, "c1", 0, &sample_output("x"), &grade)?;
    // second insert of the same rep fails before the score is committed
    let _ = store.insert_graded(run_id, "c1", 0, &sample_output("y"), &grade);

    let rows = store.fetch_graded(&QueryFilter {
        run_id: Some(run_id),
        ..Default::default()
    })?;
    // every persisted output still has exactly one score
    assert_eq!(rows.len(), 1);
    assert_eq!(store.count_outputs(run_id)?, 1);

    Ok(())
}

#[test]
fn filters_compose() -> anyhow::Result<()> {
    let store = Store::memory()?;
    let fake = store.register_model(&ModelSpec::parse("fake:a")?)?;
    let other = store.register_model(&ModelSpec::parse("fake:b")?)?;

    let run_a = store.create_run("demo", &fake, None, &RunParams::default())?;
    let run_b = store.create_run("demo", &other, None, &RunParams::default())?;
    store.upsert_case("demo", &sample_case("c1"))?;
    let mut c2 = sample_case("c2");
    c2.scheme = Some("zw_hint_full".into());
    store.upsert_case("demo", &c2)?;

    let grade = GradeResult::new(1.0, "CORRECT", "ok");
    store.insert_graded(run_a, "c1", 0, &sample_output("x"), &grade)?;
    store.insert_graded(run_a, "c2", 0, &sample_output("x"), &grade)?;
    store.insert_graded(run_b, "c1", 0, &sample_output("x"), &grade)?;

    let by_model = store.fetch_graded(&QueryFilter {
        model: Some("fake:a".into()),
        ..Default::default()
    })?;
    assert_eq!(by_model.len(), 2);

    let by_scheme = store.fetch_graded(&QueryFilter {
        scheme: Some("zw_hint_full".into()),
        ..Default::default()
    })?;
    assert_eq!(by_scheme.len(), 1);
    assert_eq!(by_scheme[0].case_id, "c2");

    let by_case_and_run = store.fetch_graded(&QueryFilter {
        run_id: Some(run_b),
        case_id: Some("c1".into()),
        ..Default::default()
    })?;
    assert_eq!(by_case_and_run.len(), 1);

    Ok(())
}
