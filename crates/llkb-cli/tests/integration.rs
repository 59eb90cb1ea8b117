#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn llkb(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("llkb").unwrap();
    cmd.current_dir(dir.path())
        .env("LLKB_ROOT", dir.path().join("llkb"))
        .env_remove("RUST_LOG");
    cmd
}

fn init(dir: &TempDir) {
    llkb(dir).arg("init").assert().success();
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.arg("--json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

fn record_selector_fix(dir: &TempDir, label: &str) -> serde_json::Value {
    json_output(llkb(dir).args([
        "record",
        "pattern",
        "--title",
        "Use role-based button selector",
        "--category",
        "selector",
        "--problem",
        "Class selector breaks after restyle",
        "--solution",
        "Locate the button by role and accessible name",
        "--before",
        &format!("await page.locator('.btn-{label}').click();"),
        "--after",
        &format!("await page.getByRole('button', {{ name: '{label}' }}).click();"),
        "--tag",
        "buttons",
    ]))
}

// ---------------------------------------------------------------------------
// llkb init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_layout() {
    let dir = TempDir::new().unwrap();
    llkb(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: lessons.json"));

    let root = dir.path().join("llkb");
    assert!(root.join("config.yml").exists());
    assert!(root.join("lessons.json").exists());
    assert!(root.join("components.json").exists());
    assert!(root.join("archive.json").exists());
    assert!(root.join("patterns/selectors.json").exists());
    assert!(root.join("history").is_dir());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    llkb(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));
}

#[test]
fn default_root_is_under_cwd() {
    let dir = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("llkb").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("LLKB_ROOT")
        .arg("init")
        .assert()
        .success();
    assert!(dir.path().join(".artk/llkb/lessons.json").exists());
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    llkb(&dir)
        .args(["query", "button"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// llkb health
// ---------------------------------------------------------------------------

#[test]
fn health_passes_on_fresh_store() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    llkb(&dir)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("lessons.json"));
}

#[test]
fn health_fails_on_corrupt_collection() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    std::fs::write(dir.path().join("llkb/components.json"), "{ broken").unwrap();
    llkb(&dir)
        .arg("health")
        .assert()
        .failure()
        .stderr(predicate::str::contains("components.json"));
}

// ---------------------------------------------------------------------------
// llkb record / query
// ---------------------------------------------------------------------------

#[test]
fn pattern_is_created_then_merged() {
    let dir = TempDir::new().unwrap();
    init(&dir);

    let first = record_selector_fix(&dir, "Save");
    assert_eq!(first["lessonId"], "L001");
    assert_eq!(first["created"], true);
    assert_eq!(first["confidence"], 0.1);

    let second = record_selector_fix(&dir, "Checkout");
    assert_eq!(second["lessonId"], "L001");
    assert_eq!(second["created"], false);
    assert_eq!(second["occurrences"], 2);

    let events = json_output(llkb(&dir).arg("history"));
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["lesson_created", "lesson_applied"]);
}

#[test]
fn lesson_applied_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    llkb(&dir)
        .args(["record", "lesson-applied", "L999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lesson not found: L999"));
}

#[test]
fn query_filters_by_confidence() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    record_selector_fix(&dir, "Save");

    llkb(&dir)
        .args(["query", "button selector"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matching"));

    let found = json_output(llkb(&dir).args(["query", "button selector", "--min-confidence", "0"]));
    assert_eq!(found[0]["id"], "L001");
    assert_eq!(found[0]["kind"], "lesson");
}

#[test]
fn extract_then_duplicate_is_rejected() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    let code = dir.path().join("login.ts");
    std::fs::write(
        &code,
        "await page.fill('#user', user);\nawait page.fill('#pass', pass);\nawait page.click('#submit');\n",
    )
    .unwrap();
    let code = code.to_str().unwrap();

    let first = json_output(llkb(&dir).args([
        "record", "extract", "--name", "loginAs", "--category", "auth", "--code-file", code,
    ]));
    assert_eq!(first["componentId"], "COMP001");

    llkb(&dir)
        .args([
            "record", "extract", "--name", "login", "--category", "auth", "--code-file", code,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("reuse COMP001"));
}

#[test]
fn override_flags_after_threshold() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    record_selector_fix(&dir, "Save");
    for _ in 0..2 {
        llkb(&dir)
            .args(["record", "override", "L001", "--reason", "prefer test ids"])
            .assert()
            .success();
    }
    llkb(&dir)
        .args(["record", "override", "L001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("flagged for review"));
}

// ---------------------------------------------------------------------------
// llkb stats / prune
// ---------------------------------------------------------------------------

#[test]
fn stats_counts_lessons() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    record_selector_fix(&dir, "Save");
    let stats = json_output(llkb(&dir).args(["stats", "--refresh"]));
    assert_eq!(stats["overview"]["totalLessons"], 1);
    assert_eq!(stats["lessons"]["byCategory"]["selector"], 1);
}

#[test]
fn prune_on_fresh_store_is_empty() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    llkb(&dir)
        .arg("prune")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to prune"));
}

// ---------------------------------------------------------------------------
// llkb config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    llkb(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No warnings"));

    std::fs::write(
        dir.path().join("llkb/config.yml"),
        "extraction:\n  similarityThreshold: 1.5\n",
    )
    .unwrap();
    llkb(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("similarityThreshold"));
}

#[test]
fn negative_history_retention_is_rejected() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    std::fs::write(
        dir.path().join("llkb/config.yml"),
        "retention:\n  historyRetentionDays: -1\n",
    )
    .unwrap();
    llkb(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("historyRetentionDays"));
}

#[test]
fn config_show_fills_defaults() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    std::fs::write(
        dir.path().join("llkb/config.yml"),
        "extraction:\n  predictiveExtraction: false\n",
    )
    .unwrap();
    let config = json_output(llkb(&dir).args(["config", "show"]));
    assert_eq!(config["extraction"]["predictiveExtraction"], false);
    assert_eq!(config["extraction"]["maxPredictivePerDay"], 10);
    assert_eq!(config["retention"]["maxLessonAge"], 90);
}
