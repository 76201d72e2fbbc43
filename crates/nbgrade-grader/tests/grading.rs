//! End-to-end pipeline: master notebook -> autograder asset tree -> grading.

use nbgrade_grader::Autograder;
use nbgrade_markup::to_autograder;
use nbgrade_notebook::Notebook;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const MASTER: &str = r#"{
  "nbformat": 4, "nbformat_minor": 5,
  "metadata": {},
  "cells": [
    {"cell_type": "markdown", "source": "```\n# ASSIGNMENT METADATA\nassignment_id: helloworld-en\n```\n"},
    {"cell_type": "markdown", "source": "```\n# EXERCISE METADATA\nexercise_id: exercise_hello\n```\n"},
    {"cell_type": "code", "source": "x = 0\n"},
    {"cell_type": "code", "source": "%%solution\ndef hello():\n  # BEGIN SOLUTION\n  return 'Hello'\n  # END SOLUTION\n"},
    {"cell_type": "code", "source": "%%inlinetest InlineHelloTest\nassert hello() == 'Hello'\n"}
  ]
}"#;

fn fake_sandbox(dir: &Path, stdout: &str) -> PathBuf {
    let path = dir.join("sandbox");
    std::fs::write(&path, format!("#!/bin/sh\nprintf '%b' '{stdout}'\nexit 0\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn submission(source: &str) -> Vec<u8> {
    serde_json::json!({
        "nbformat": 4, "nbformat_minor": 5,
        "metadata": {
            "submission_id": "11111111-2222-3333-4444-555555555555",
            "assignment_id": "helloworld-en"
        },
        "cells": [
            {"cell_type": "code", "metadata": {"exercise_id": "exercise_hello"}, "source": source}
        ]
    })
    .to_string()
    .into_bytes()
}

#[test]
fn master_to_assets_to_report() {
    let master = Notebook::parse(MASTER.as_bytes()).unwrap();
    let tree = to_autograder(&master).unwrap();

    let assets = tempfile::tempdir().unwrap();
    tree.write_to(assets.path()).unwrap();

    let exercise_dir = assets.path().join("helloworld-en/exercise_hello");
    assert!(exercise_dir.join("InlineHelloTest_context.py").is_file());
    assert!(exercise_dir.join("InlineHelloTest_inline.py").is_file());
    assert!(exercise_dir.join("empty_submission.py").is_file());
    assert!(exercise_dir.join("empty_source.py").is_file());

    let scratch = tempfile::tempdir().unwrap();
    let stub = tempfile::tempdir().unwrap();
    let sandbox = fake_sandbox(stub.path(), "OK{{}}");
    let mut grader = Autograder::new(assets.path(), scratch.path(), sandbox, "/usr/bin/python3");
    grader.disable_cleanup = true;

    let bytes = grader
        .grade(&submission("def hello():\n  return 'Hello'\n"))
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(
        report["submission_id"],
        "11111111-2222-3333-4444-555555555555"
    );
    assert_eq!(
        report["exercise_hello"]["results"]["InlineHelloTest"]["passed"],
        true
    );

    // the scratch workspace was materialized with the synthesized test
    let scratch_exercise = scratch
        .path()
        .join("11111111-2222-3333-4444-555555555555/exercise_hello");
    assert!(scratch_exercise.join("submission.py").is_file());
    assert!(scratch_exercise.join("submission_source.py").is_file());
    assert!(scratch_exercise.join("InlineHelloTest_inlinetest.py").is_file());
}

#[test]
fn prompt_submission_reports_empty() {
    let master = Notebook::parse(MASTER.as_bytes()).unwrap();
    let tree = to_autograder(&master).unwrap();
    let assets = tempfile::tempdir().unwrap();
    tree.write_to(assets.path()).unwrap();

    let prompt = std::fs::read_to_string(
        assets
            .path()
            .join("helloworld-en/exercise_hello/empty_submission.py"),
    )
    .unwrap();

    let scratch = tempfile::tempdir().unwrap();
    // no sandbox binary exists; a trivial submission must not need one
    let grader = Autograder::new(
        assets.path(),
        scratch.path(),
        "/nonexistent/sandbox",
        "/usr/bin/python3",
    );
    let bytes = grader.grade(&submission(&prompt)).unwrap();
    let report: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(report["exercise_hello"]["report"]
        .as_str()
        .unwrap()
        .contains("empty submission"));
}
