//! Integration tests for textembed CLI
//!
//! Exercises argument handling and error reporting through the built binary.
//! None of these tests need model files or network access.

use std::process::{Command, Output};
use tempfile::TempDir;

/// Get the path to the textembed binary (built by cargo)
fn textembed_binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_textembed"))
}

/// Run textembed with the given args in the specified directory
fn run_textembed(dir: &std::path::Path, args: &[&str]) -> Output {
    textembed_binary()
        .current_dir(dir)
        .env_remove("TEXTEMBED_MODEL")
        .env_remove("TEXTEMBED_ARTIFACT")
        .args(args)
        .output()
        .expect("Failed to execute textembed command")
}

/// Get stdout as string
fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Get stderr as string
fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = run_textembed(dir.path(), &["--help"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("embed"));
    assert!(out.contains("info"));
}

#[test]
fn test_no_command_prints_help() {
    let dir = TempDir::new().unwrap();
    let output = run_textembed(dir.path(), &[]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage"));
}

#[test]
fn test_embed_requires_text() {
    let dir = TempDir::new().unwrap();
    let output = run_textembed(dir.path(), &["embed", "--model", "some/model"]);

    assert!(!output.status.success());
}

#[test]
fn test_embed_without_model_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_textembed(dir.path(), &["embed", "hello"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("No model given"));
}

#[test]
fn test_offline_missing_tokenizer_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_textembed(
        dir.path(),
        &[
            "embed",
            "--offline",
            "--local",
            "--model",
            "does-not-exist",
            "hello",
        ],
    );

    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Failed to initialize does-not-exist"));
    assert!(err.contains("remote models are disabled"));
}

#[test]
fn test_config_file_supplies_model() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(".textembed.toml"),
        "[model]\nid = \"configured-model\"\noffline = true\n",
    )
    .unwrap();

    let output = run_textembed(dir.path(), &["info"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to initialize configured-model"));
}
