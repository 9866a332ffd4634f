//! FileCheck-style tests for TIR files
//!
//! Each file under `tests/filetest` carries its own RUN and CHECK
//! directives; the runner compiles it and matches the printed output.

use cymbol_backend::tir::{TestRunner, TestSpec};
use std::fs;
use std::path::Path;

/// Test helper that runs a TIR file through FileCheck validation
fn run_filecheck_test(tir_file: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/filetest")
        .join(tir_file);
    let contents = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));

    let spec = TestSpec::parse(&contents)
        .unwrap_or_else(|e| panic!("Failed to parse test spec from {}: {}", tir_file, e));

    let runner = TestRunner::new(false);
    runner
        .run_test(&spec)
        .unwrap_or_else(|e| panic!("Test {} failed: {}", tir_file, e));
}

#[test]
fn test_diamond_filecheck() {
    run_filecheck_test("diamond.tir");
}

#[test]
fn test_loop_filecheck() {
    run_filecheck_test("loop.tir");
}

#[test]
fn test_branch_mismatch_filecheck() {
    run_filecheck_test("mismatch.tir");
}

#[test]
fn test_entry_renumbering_filecheck() {
    run_filecheck_test("entry.tir");
}

#[test]
fn test_spill_filecheck() {
    run_filecheck_test("spill.tir");
}

#[test]
fn test_spill_limit_filecheck() {
    run_filecheck_test("exhausted.tir");
}

#[test]
fn test_frame_filecheck() {
    run_filecheck_test("frame.tir");
}

#[test]
fn test_strict_layout_filecheck() {
    run_filecheck_test("strict_layout.tir");
}

#[test]
fn test_parse_error_filecheck() {
    run_filecheck_test("parse_error.tir");
}

/// Every file in the directory must pass, including ones without a
/// dedicated test above.
#[test]
fn test_all_filetests() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetest");
    let mut failures = Vec::new();
    let mut count = 0;

    for entry in fs::read_dir(&dir).expect("filetest directory") {
        let path = entry.expect("directory entry").path();
        if path.extension().and_then(|e| e.to_str()) != Some("tir") {
            continue;
        }
        count += 1;
        let contents = fs::read_to_string(&path).expect("readable test file");
        let result = TestSpec::parse(&contents).and_then(|spec| TestRunner::new(false).run_test(&spec));
        if let Err(e) = result {
            failures.push(format!("{}: {}", path.display(), e));
        }
    }

    assert!(count > 0, "no .tir files in {}", dir.display());
    assert!(failures.is_empty(), "failures:\n{}", failures.join("\n"));
}
