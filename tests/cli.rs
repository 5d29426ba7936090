use assert_cmd::prelude::*;
use predicates::ord::eq;
use predicates::str::{contains, PredicateStrExt};
use std::process::Command;
use tempfile::TempDir;

fn kvs_cache(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kvs-cache").unwrap();
    cmd.current_dir(temp_dir);
    cmd
}

fn store(temp_dir: &TempDir, args: &[&str]) -> String {
    let output = kvs_cache(temp_dir)
        .arg("store")
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_owned()
}

// `kvs-cache` with no args should exit with a non-zero code.
#[test]
fn cli_no_args() {
    let temp_dir = TempDir::new().unwrap();
    kvs_cache(&temp_dir).assert().failure();
}

#[test]
fn cli_invalid_subcommand() {
    let temp_dir = TempDir::new().unwrap();
    kvs_cache(&temp_dir).args(&["unknown"]).assert().failure();
}

#[test]
fn cli_store_get() {
    let temp_dir = TempDir::new().unwrap();
    let key = store(&temp_dir, &["hello"]);
    assert_eq!(key.len(), 36);

    kvs_cache(&temp_dir)
        .args(&["get", key.as_str()])
        .assert()
        .success()
        .stdout(eq("hello").trim());
}

#[test]
fn cli_get_missing() {
    let temp_dir = TempDir::new().unwrap();
    kvs_cache(&temp_dir)
        .args(&["get", "no-such-key"])
        .assert()
        .success()
        .stdout(eq("Key not found").trim());
}

#[test]
fn cli_get_int() {
    let temp_dir = TempDir::new().unwrap();
    let number = store(&temp_dir, &["--int", "42"]);
    let word = store(&temp_dir, &["forty-two"]);

    kvs_cache(&temp_dir)
        .args(&["get", "--int", number.as_str()])
        .assert()
        .success()
        .stdout(eq("42").trim());
    kvs_cache(&temp_dir)
        .args(&["get", "--int", word.as_str()])
        .assert()
        .failure();
}

#[test]
fn cli_store_invalid_int() {
    let temp_dir = TempDir::new().unwrap();
    kvs_cache(&temp_dir)
        .args(&["store", "--int", "abc"])
        .assert()
        .failure();
}

#[test]
fn cli_store_non_finite_float() {
    let temp_dir = TempDir::new().unwrap();
    let key = store(&temp_dir, &["--float", "1.5"]);
    for value in &["inf", "infinity", "NaN"] {
        kvs_cache(&temp_dir)
            .args(&["store", "--float", value])
            .assert()
            .failure();
    }
    kvs_cache(&temp_dir)
        .args(&["get", key.as_str()])
        .assert()
        .success()
        .stdout(eq("1.5").trim());
    kvs_cache(&temp_dir)
        .arg("replay")
        .assert()
        .success()
        .stdout(contains("Cache.store was called 1 times:"));
}

#[test]
fn cli_replay() {
    let temp_dir = TempDir::new().unwrap();
    let first = store(&temp_dir, &["foo"]);
    let second = store(&temp_dir, &["--float", "2.5"]);

    kvs_cache(&temp_dir)
        .arg("replay")
        .assert()
        .success()
        .stdout(contains("Cache.store was called 2 times:"))
        .stdout(contains(format!("Cache.store(*[\"foo\"]) -> {}\n", first)))
        .stdout(contains(format!("Cache.store(*[2.5]) -> {}", second)));
}

#[test]
fn cli_replay_unknown() {
    let temp_dir = TempDir::new().unwrap();
    kvs_cache(&temp_dir)
        .args(&["replay", "Cache.get"])
        .assert()
        .success()
        .stdout(eq("Cache.get was called 0 times:").trim());
}

#[test]
fn cli_flush() {
    let temp_dir = TempDir::new().unwrap();
    let key = store(&temp_dir, &["foo"]);
    kvs_cache(&temp_dir).arg("flush").assert().success();
    kvs_cache(&temp_dir)
        .args(&["get", key.as_str()])
        .assert()
        .success()
        .stdout(eq("Key not found").trim());
    kvs_cache(&temp_dir)
        .arg("replay")
        .assert()
        .success()
        .stdout(contains("was called 0 times"));
}

#[test]
fn cli_sled_engine() {
    let temp_dir = TempDir::new().unwrap();
    let output = kvs_cache(&temp_dir)
        .args(&["--engine", "sled", "store", "value"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let key = String::from_utf8(output.stdout).unwrap().trim().to_owned();
    // the engine is remembered
    kvs_cache(&temp_dir)
        .args(&["get", key.as_str()])
        .assert()
        .success()
        .stdout(eq("value").trim());
}

#[test]
fn cli_wrong_engine() {
    let temp_dir = TempDir::new().unwrap();
    store(&temp_dir, &["value"]);
    kvs_cache(&temp_dir)
        .args(&["--engine", "sled", "flush"])
        .assert()
        .failure();
}
