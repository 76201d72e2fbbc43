//! The grading pipeline for one submission: parse the notebook, locate the
//! assignment assets, build a scratch workspace per exercise, run the tests
//! under the sandbox, classify the runner output and assemble the report.

use crate::{
    error::GraderError,
    inline,
    layout::{self, AssetLayout},
    report,
    sandbox::{Sandbox, SandboxRun, INLINE_TEST_LIMIT, UNIT_TEST_LIMIT},
};
use nbgrade_notebook::Notebook;
use nbgrade_util::file_util;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

// One line of verbose test-runner output per test method.
static UNIT_OUTCOME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(test[A-Za-z0-9_]+) \(([\w-]+)\.(\w+)\) \.\.\. (ok|FAIL|ERROR)")
        .expect("static pattern must compile")
});
// OK/FAIL/ERROR markers written by synthesized inline tests.
static INLINE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(OK|ERROR|FAIL)\{\{(.*?)\}\}").expect("static pattern must compile"));
static SYNTAX_ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(SyntaxError:.*)$").expect("static pattern must compile"));
// The sandbox reports a wall-clock kill with this text.
static TIMEOUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)time limit.*Killing it").expect("static pattern must compile"));

const TIME_OUT_ERROR: &str = "Time out.";

/// The outcome of one test group (a unit-test file or one inline test).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outcome {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-method verdicts of a unit-test group, keyed by method name.
    #[serde(flatten)]
    pub tests: BTreeMap<String, bool>,
}

/// Everything the grader recorded about one exercise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExerciseResult {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, Outcome>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub logs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reports: BTreeMap<String, String>,
    /// The assembled HTML for the exercise.
    pub report: String,
}

/// The structured report for one submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub assignment_id: String,
    pub submission_id: String,
    pub user_hash: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub exercises: BTreeMap<String, ExerciseResult>,
}

/// Encapsulates the setup of the grading environment.
#[derive(Debug, Clone)]
pub struct Autograder {
    layout: AssetLayout,
    scratch_root: PathBuf,
    sandbox: Sandbox,
    python: PathBuf,
    /// Do not delete the scratch directory after grading.
    pub disable_cleanup: bool,
    /// Wipe a pre-existing scratch directory instead of failing.
    pub auto_remove: bool,
    /// Include raw runner logs in the rendered inline-test fragments.
    pub include_logs: bool,
}

impl Autograder {
    pub fn new(
        asset_root: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
        sandbox_path: impl Into<PathBuf>,
        python_path: impl Into<PathBuf>,
    ) -> Self {
        let python = python_path.into();
        Self {
            layout: AssetLayout::new(asset_root),
            scratch_root: scratch_root.into(),
            sandbox: Sandbox::new(sandbox_path, &python),
            python,
            disable_cleanup: false,
            auto_remove: false,
            include_logs: false,
        }
    }

    /// Grades one submission: takes the raw notebook bytes (with
    /// `submission_id` already injected into the metadata) and produces the
    /// serialized JSON report. Failures past metadata extraction carry the
    /// submission id so the caller can still reply with a targeted report.
    pub fn grade(&self, notebook_bytes: &[u8]) -> Result<Vec<u8>, GraderError> {
        let notebook = Notebook::parse(notebook_bytes).map_err(GraderError::Parse)?;
        let submission_id = notebook
            .metadata
            .get("submission_id")
            .ok_or(GraderError::MissingMetadata("submission_id"))?
            .as_str()
            .ok_or(GraderError::MetadataNotString("submission_id"))?
            .to_string();
        self.grade_submission(&notebook, &submission_id)
            .map_err(|e| e.for_submission(&submission_id))
    }

    fn grade_submission(
        &self,
        notebook: &Notebook,
        submission_id: &str,
    ) -> Result<Vec<u8>, GraderError> {
        let metadata_str = |key: &'static str| -> Result<&str, GraderError> {
            notebook
                .metadata
                .get(key)
                .ok_or(GraderError::MissingMetadata(key))?
                .as_str()
                .ok_or(GraderError::MetadataNotString(key))
        };
        let assignment_id = metadata_str("assignment_id")?.to_string();
        let user_hash = notebook
            .metadata
            .get("user_hash")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let requested_exercise = notebook
            .metadata
            .get("requested_exercise_id")
            .and_then(Value::as_str);

        let assignment_dir = self.layout.assignment_dir(&assignment_id)?;

        let scratch_base = self.scratch_root.join(submission_id);
        if scratch_base.exists() {
            if self.auto_remove {
                file_util::remove_dir_all(&scratch_base)?;
            } else {
                return Err(GraderError::ScratchExists(scratch_base));
            }
        }
        file_util::create_dir_all(&scratch_base)?;

        let mut exercises = BTreeMap::new();
        for cell in &notebook.cells {
            let Some(exercise_id) = cell.metadata_str("exercise_id") else {
                continue;
            };
            if requested_exercise.is_some_and(|r| r != exercise_id) {
                continue;
            }
            log::info!("grading {submission_id} exercise {exercise_id}");
            let result =
                self.grade_exercise(&assignment_dir, exercise_id, &cell.source, &scratch_base)?;
            exercises.insert(exercise_id.to_string(), result);
        }

        let error = exercises
            .is_empty()
            .then(|| "no exercises found in the submitted notebook".to_string());
        let report = Report {
            assignment_id,
            submission_id: submission_id.to_string(),
            user_hash,
            timestamp: chrono::Utc::now().timestamp(),
            error,
            exercises,
        };
        let bytes = serde_json::to_vec_pretty(&report).map_err(GraderError::Serialize)?;

        if !self.disable_cleanup {
            let _ = file_util::remove_dir_all(&scratch_base);
        }
        Ok(bytes)
    }

    fn grade_exercise(
        &self,
        assignment_dir: &Path,
        exercise_id: &str,
        submission: &str,
        scratch_base: &Path,
    ) -> Result<ExerciseResult, GraderError> {
        let exercise_dir = assignment_dir.join(exercise_id);
        if !exercise_dir.is_dir() {
            let assignment = assignment_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(GraderError::UnknownExercise(
                assignment,
                exercise_id.to_string(),
            ));
        }

        // trivial submissions short-circuit without running anything
        let empty_path = exercise_dir.join("empty_submission.py");
        if empty_path.is_file() && file_util::read_file_to_string(&empty_path)? == submission {
            log::info!("{exercise_id}: empty submission");
            return Ok(ExerciseResult {
                report: format!("{exercise_id}: empty submission"),
                ..Default::default()
            });
        }

        let scratch_dir = scratch_base.join(exercise_id);
        file_util::copy_dir_shallow(&exercise_dir, &scratch_dir)?;
        file_util::write_to_file(submission, scratch_dir.join("submission.py"))?;
        file_util::write_to_file(quote_source(submission), scratch_dir.join("submission_source.py"))?;

        let files = layout::scan_exercise_dir(&scratch_dir)?;
        for (name, context_path, inline_path) in &files.inline_pairs {
            let context = file_util::read_file_to_string(context_path)?;
            let inline_test = file_util::read_file_to_string(inline_path)?;
            let script = inline::assemble_inline_test(Some(&context), submission, &inline_test);
            file_util::write_to_file(script, scratch_dir.join(format!("{name}_inlinetest.py")))?;
        }

        let mut results = BTreeMap::new();
        let mut logs = BTreeMap::new();
        let mut reports = BTreeMap::new();

        for test_path in &files.unit_tests {
            let file_name = test_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let group = file_name.strip_suffix(".py").unwrap_or(&file_name).to_string();
            let run = self.sandbox.run_python(
                &scratch_dir,
                &["-m", "unittest", "-v", file_name.as_str()],
                UNIT_TEST_LIMIT,
            )?;
            results.insert(group.clone(), parse_unit_test_output(&run));
            logs.insert(group, run.output);
        }

        for (name, _, _) in &files.inline_pairs {
            let script_name = format!("{name}_inlinetest.py");
            let run = self
                .sandbox
                .run_python(&scratch_dir, &[script_name.as_str()], INLINE_TEST_LIMIT)?;
            let outcome = parse_inline_test_output(&run);
            reports.insert(
                name.clone(),
                report::inline_fragment(
                    name,
                    outcome.passed,
                    outcome.error.as_deref(),
                    submission,
                    &run.output,
                    self.include_logs,
                ),
            );
            results.insert(name.clone(), outcome);
            logs.insert(name.clone(), run.output);
        }

        let report = if files.templates.is_empty() {
            // inline fragments concatenate in test-name order
            reports.values().cloned().collect::<Vec<_>>().concat()
        } else {
            let data = serde_json::json!({ "results": results, "logs": logs });
            let mut out = String::new();
            for template in &files.templates {
                out.push_str(&self.run_template(template, &scratch_dir, &data));
            }
            out
        };

        Ok(ExerciseResult {
            results,
            logs,
            reports,
            report,
        })
    }

    // Feeds the merged outcome JSON to one report template script and
    // collects its stdout. Template failures degrade to an error fragment
    // rather than failing the job.
    fn run_template(&self, template: &Path, cwd: &Path, data: &Value) -> String {
        let file_name = template
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::debug!("running report template {file_name}");
        let run = || -> std::io::Result<std::process::Output> {
            let mut child = Command::new(&self.python)
                .arg(&file_name)
                .current_dir(cwd)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()?;
            if let Some(stdin) = child.stdin.as_mut() {
                stdin.write_all(data.to_string().as_bytes())?;
            }
            drop(child.stdin.take());
            child.wait_with_output()
        };
        match run() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(output) => {
                log::error!("report template {file_name} exited with {}", output.status);
                let mut merged = String::from_utf8_lossy(&output.stdout).into_owned();
                merged.push_str(&String::from_utf8_lossy(&output.stderr));
                format!(
                    "{}{}",
                    report::reporter_error_fragment(&format!(
                        "template {file_name} exited with {}",
                        output.status
                    )),
                    merged
                )
            }
            Err(e) => {
                log::error!("report template {file_name} failed: {e}");
                report::reporter_error_fragment(&e.to_string())
            }
        }
    }
}

fn parse_unit_test_output(run: &SandboxRun) -> Outcome {
    if run.killed || TIMEOUT_RE.is_match(&run.output) {
        return Outcome {
            passed: false,
            error: Some(TIME_OUT_ERROR.to_string()),
            tests: BTreeMap::new(),
        };
    }
    let mut tests = BTreeMap::new();
    let mut all_ok = true;
    for captures in UNIT_OUTCOME_RE.captures_iter(&run.output) {
        let ok = &captures[4] == "ok";
        all_ok &= ok;
        tests.insert(captures[1].to_string(), ok);
    }
    Outcome {
        // recognized no method outcomes at all: not passed
        passed: run.success && !tests.is_empty() && all_ok,
        error: None,
        tests,
    }
}

fn parse_inline_test_output(run: &SandboxRun) -> Outcome {
    if run.killed || TIMEOUT_RE.is_match(&run.output) {
        return Outcome {
            passed: false,
            error: Some(TIME_OUT_ERROR.to_string()),
            tests: BTreeMap::new(),
        };
    }
    let mut passed = run.success;
    let mut errors = vec![];
    for captures in INLINE_MARKER_RE.captures_iter(&run.output) {
        if &captures[1] == "OK" {
            continue;
        }
        passed = false;
        if !captures[2].is_empty() {
            errors.push(captures[2].to_string());
        }
    }
    for captures in SYNTAX_ERROR_RE.captures_iter(&run.output) {
        passed = false;
        errors.push(captures[1].to_string());
    }
    Outcome {
        passed,
        error: (!errors.is_empty()).then(|| errors.join("\n")),
        tests: BTreeMap::new(),
    }
}

// Quotes the submission for `exec`/`import` uses from python code. A
// trailing quote would otherwise produce an invalid `""""` sequence.
fn quote_source(submission: &str) -> String {
    let mut text = submission.replace(r#"""""#, r#"\"\"\""#);
    if text.ends_with('"') {
        text.push('\n');
    }
    format!(r#"source = """{text}""""#)
}
