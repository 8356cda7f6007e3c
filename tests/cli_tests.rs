use serial_test::serial;
use std::path::Path;
use std::process::{Command, Output};
use std::thread;
use tempfile::tempdir;

const BIN: &str = env!("CARGO_BIN_EXE_shared-hash-map");

fn run(storage: &Path, args: &[&str]) -> Output {
    Command::new(BIN)
        .arg(storage)
        .args(args)
        .output()
        .expect("Failed to execute process")
}

fn create(storage: &Path) {
    let output = run(
        storage,
        &["create", "--entries", "10k", "--segments", "8", "--entry-size", "32"],
    );
    assert!(output.status.success(), "Create command failed: {:?}", output);
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
#[serial]
fn test_create_incr_and_get() {
    let dir = tempdir().expect("Failed to create temp dir");
    let storage = dir.path().join("cli.shm");
    create(&storage);

    let output = run(&storage, &["incr", "page:/index"]);
    assert!(output.status.success(), "Incr failed: {:?}", output);
    assert_eq!(stdout(&output), "1");

    let output = run(&storage, &["incr", "page:/index", "--delta", "-5"]);
    assert_eq!(stdout(&output), "-4");

    let output = run(&storage, &["get", "page:/index"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "-4");
}

#[test]
#[serial]
fn test_set_list_and_remove() {
    let dir = tempdir().expect("Failed to create temp dir");
    let storage = dir.path().join("cli.shm");
    create(&storage);

    assert!(run(&storage, &["set", "b", "-2"]).status.success());
    assert!(run(&storage, &["set", "a", "10"]).status.success());

    let output = run(&storage, &["list"]);
    assert_eq!(stdout(&output), "a\t10\nb\t-2");

    let output = run(&storage, &["remove", "a"]);
    assert!(output.status.success(), "Remove failed: {:?}", output);

    let output = run(&storage, &["get", "a"]);
    assert!(!output.status.success(), "Expected failure for removed key");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "Unexpected error message: {:?}", stderr);
}

#[test]
#[serial]
fn test_commands_require_existing_map() {
    let dir = tempdir().expect("Failed to create temp dir");
    let storage = dir.path().join("missing.shm");

    let output = run(&storage, &["get", "anything"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "Unexpected error message: {:?}", stderr);
    assert!(!storage.exists(), "Read commands must not create the file");
}

#[test]
#[serial]
fn test_create_rejects_mismatched_existing_map() {
    let dir = tempdir().expect("Failed to create temp dir");
    let storage = dir.path().join("cli.shm");
    create(&storage);

    // Same options attach fine.
    create(&storage);

    let output = run(&storage, &["create", "--entries", "20k", "--segments", "8", "--entry-size", "32"]);
    assert!(!output.status.success(), "Mismatched create must fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "Unexpected error message: {:?}", stderr);
}

#[test]
#[serial]
fn test_create_rejects_bad_quantity() {
    let dir = tempdir().expect("Failed to create temp dir");
    let storage = dir.path().join("cli.shm");

    let output = run(&storage, &["create", "--entries", "lots"]);
    assert!(!output.status.success());
    assert!(!storage.exists());
}

#[test]
#[serial]
fn test_info() {
    let dir = tempdir().expect("Failed to create temp dir");
    let storage = dir.path().join("cli.shm");
    create(&storage);
    run(&storage, &["incr", "x"]);

    let output = run(&storage, &["info"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("MAP INFO"), "Unexpected info output: {}", out);
    assert!(out.contains("SEGMENTS:"));
}

#[test]
#[serial]
fn test_processes_increment_the_same_counter() {
    const PROCESSES: usize = 4;
    const REPEAT: &str = "2000";

    let dir = tempdir().expect("Failed to create temp dir");
    let storage = dir.path().join("shared.shm");
    create(&storage);

    let handles: Vec<_> = (0..PROCESSES)
        .map(|_| {
            let storage = storage.clone();
            thread::spawn(move || run(&storage, &["incr", "shared", "--repeat", REPEAT]))
        })
        .collect();

    for handle in handles {
        let output = handle.join().expect("Thread panicked");
        assert!(output.status.success(), "Incr process failed: {:?}", output);
    }

    let output = run(&storage, &["get", "shared"]);
    assert_eq!(stdout(&output), (PROCESSES * 2000).to_string());
}
