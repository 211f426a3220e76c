use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn rejects_nonexistent_source_dir() {
    let mut cmd = Command::cargo_bin("csemgraph").unwrap();
    cmd.arg("/no/such/directory")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn indexes_fixture_tree_without_refs() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("a.c"),
        "#include \"b.h\"\nstatic int helper(int x) { return x + 1; }\nint main(void) { return helper(2); }\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b.h"),
        "#ifndef B_H\n#define B_H\nvoid b_api(void);\n#endif\n",
    )
    .unwrap();

    let db = dir.path().join("out.db");
    let mut cmd = Command::cargo_bin("csemgraph").unwrap();
    let assert = cmd
        .arg(dir.path())
        .arg("--db")
        .arg(&db)
        .arg("--force")
        .assert();

    // ctags may be unavailable in a minimal CI image: only require a clean
    // exit when it's on PATH, since a missing binary is a fatal
    // Configuration error by design.
    if std::process::Command::new("ctags").arg("--version").output().is_ok() {
        assert.success();
        assert!(db.exists());
    }
}
