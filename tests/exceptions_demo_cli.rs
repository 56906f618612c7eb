//! CLI integration tests for the `complete_09_exceptions_demo` binary.
//!
//! Runs the compiled demo inside an empty directory, so none of the files or
//! the database it reaches for can exist.

use std::process::{Command, Output};

use regex::Regex;
use tempfile::TempDir;

fn run_demo(dir: &TempDir) -> Output {
    Command::new(env!("CARGO_BIN_EXE_complete_09_exceptions_demo"))
        .current_dir(dir.path())
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute complete_09_exceptions_demo")
}

#[test]
fn test_exits_successfully() {
    let dir = TempDir::new().unwrap();
    let output = run_demo(&dir);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_two_banners_and_eleven_caught_lines() {
    let dir = TempDir::new().unwrap();
    let stdout = String::from_utf8(run_demo(&dir).stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();

    let banners: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("Simulating ")).collect();
    assert_eq!(banners, vec!["Simulating checked failures:", "Simulating runtime failures:"]);

    let caught = Regex::new(r"^\w+ caught: .+$").unwrap();
    let kinds: Vec<&str> = lines
        .iter()
        .filter(|l| caught.is_match(l))
        .filter_map(|l| l.split(' ').next())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "IoError",
            "FileNotFound",
            "UnexpectedEof",
            "SqlError",
            "ClassNotFound",
            "ArithmeticError",
            "NullDereference",
            "IndexOutOfBounds",
            "InvalidCast",
            "IllegalArgument",
            "NumberFormatError",
        ]
    );
    assert_eq!(lines.len(), 13);
}

#[test]
fn test_output_is_byte_identical_across_runs() {
    let dir = TempDir::new().unwrap();
    let first = run_demo(&dir);
    let second = run_demo(&dir);
    let third = run_demo(&dir);

    assert_eq!(first.stdout, second.stdout);
    assert_eq!(second.stdout, third.stdout);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_leftover_file_breaks_the_demo() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("nonexistentfile.txt"), "surprise").unwrap();

    let output = run_demo(&dir);
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("io_failure completed without the expected IoError"));
}
