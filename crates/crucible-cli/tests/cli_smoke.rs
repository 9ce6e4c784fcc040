use assert_cmd::Command;
use predicates::prelude::*;

fn write_demo_pack(dir: &std::path::Path) {
    let pack_dir = dir.join("watermark_robustness");
    std::fs::create_dir_all(&pack_dir).unwrap();
    std::fs::write(
        pack_dir.join("pack.yaml"),
        "id: watermark_robustness\nname: Watermark Robustness\nsystem_prompt: Rewrite the text, preserving provenance markers.\n",
    )
    .unwrap();
    std::fs::write(
        pack_dir.join("cases.yaml"),
        "- id: wm_001\n  task_family: rewrite\n  prompt: 'Improve this.\n\n    Ledger WMID:7f3a1b2c3d4e5f6a7b8c9d0e1f2a3b4c intact.'\n  expected_watermark: 'WMID:7f3a1b2c3d4e5f6a7b8c9d0e1f2a3b4c'\n",
    )
    .unwrap();
}

#[test]
fn packs_lists_nothing_in_empty_dir() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("crucible")
        .unwrap()
        .args(["packs", "--packs-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No packs found."));
}

#[test]
fn packs_lists_loaded_pack() {
    let dir = tempfile::tempdir().unwrap();
    write_demo_pack(dir.path());
    Command::cargo_bin("crucible")
        .unwrap()
        .args(["packs", "--packs-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("watermark_robustness"))
        .stdout(predicate::str::contains("(1 cases)"));
}

#[test]
fn run_with_fake_model_persists_results() {
    let dir = tempfile::tempdir().unwrap();
    write_demo_pack(dir.path());
    let db = dir.path().join("results.sqlite");

    Command::cargo_bin("crucible")
        .unwrap()
        .args(["run", "--pack", "watermark_robustness", "--model", "fake:echo"])
        .args(["--n", "2"])
        .arg("--db")
        .arg(&db)
        .arg("--packs-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("outputs 2"))
        .stdout(predicate::str::contains("failed generations 0"));

    Command::cargo_bin("crucible")
        .unwrap()
        .args(["export", "--format", "json"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"label\": \"PASS\""));

    Command::cargo_bin("crucible")
        .unwrap()
        .arg("report")
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("| PASS | 2 |"));
}

#[test]
fn run_rejects_unknown_pack() {
    let dir = tempfile::tempdir().unwrap();
    let pack_dir = dir.path().join("mystery_pack");
    std::fs::create_dir_all(&pack_dir).unwrap();
    std::fs::write(pack_dir.join("pack.yaml"), "id: mystery_pack\n").unwrap();
    std::fs::write(pack_dir.join("cases.yaml"), "- id: c1\n  prompt: hi\n").unwrap();

    Command::cargo_bin("crucible")
        .unwrap()
        .args(["run", "--pack", "mystery_pack", "--model", "fake:echo"])
        .arg("--packs-dir")
        .arg(dir.path())
        .arg("--db")
        .arg(dir.path().join("x.sqlite"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no grader registered"));
}
