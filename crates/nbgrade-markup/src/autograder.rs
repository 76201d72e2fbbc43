//! The master → autograder transformation: turns a master notebook into the
//! per-exercise file set the grading engine reads (unit tests, inline-test
//! context pairs, report templates and the empty-submission placeholders).

use crate::{
    pattern::{self, CellKind},
    student::{clean_for_student, solution_to_prompt},
    MarkupError,
};
use nbgrade_notebook::{Cell, CellType, Notebook};
use nbgrade_util::file_util;
use serde_json::Map;
use std::path::Path;

/// One file of the autograder asset tree, destined for
/// `<assignment_id>/<exercise_id>/<filename>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub exercise_id: String,
    pub filename: String,
    pub contents: String,
}

/// The autograder asset tree derived from one master notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTree {
    pub assignment_id: String,
    pub files: Vec<AssetFile>,
}

impl AssetTree {
    /// Writes the tree under the output directory.
    pub fn write_to(&self, out_dir: &Path) -> Result<(), MarkupError> {
        for file in &self.files {
            let path = out_dir
                .join(&self.assignment_id)
                .join(&file.exercise_id)
                .join(&file.filename);
            file_util::write_to_file_with_mode(&file.contents, &path, 0o775)?;
            log::debug!("wrote {}", path.display());
        }
        Ok(())
    }
}

/// Extracts the autograder asset tree from a master notebook.
///
/// The pass keeps a small amount of state while walking the cells: the
/// current assignment and exercise ids, the exercise metadata, and the
/// context accumulators used to synthesize inline-test context files. Code
/// cells before the first exercise form a global context that is prepended
/// to every exercise context.
pub fn to_autograder(notebook: &Notebook) -> Result<AssetTree, MarkupError> {
    let mut assignment_id = String::new();
    let mut exercise_id: Option<String> = None;
    let mut exercise_metadata: Map<String, serde_json::Value> = Map::new();
    let mut global_context: Vec<Cell> = vec![];
    let mut exercise_context: Vec<Cell> = vec![];
    let mut files: Vec<AssetFile> = vec![];

    let require_exercise = |exercise_id: &Option<String>, filename: &str| {
        exercise_id
            .clone()
            .ok_or_else(|| MarkupError::NoExercise(filename.to_string()))
    };

    for cell in &notebook.cells {
        if cell.cell_type == CellType::Markdown {
            if pattern::has_metadata(&pattern::ASSIGNMENT_METADATA_RE, &cell.source) {
                let (metadata, _) =
                    pattern::extract_metadata(&pattern::ASSIGNMENT_METADATA_RE, &cell.source)?;
                if let Some(metadata) = metadata {
                    if let Some(id) = metadata.get("assignment_id") {
                        assignment_id = id
                            .as_str()
                            .ok_or(MarkupError::NotAString("assignment_id"))?
                            .to_string();
                    }
                }
            }
            if pattern::has_metadata(&pattern::EXERCISE_METADATA_RE, &cell.source) {
                let (metadata, _) =
                    pattern::extract_metadata(&pattern::EXERCISE_METADATA_RE, &cell.source)?;
                exercise_metadata = metadata.unwrap_or_default();
                if let Some(id) = exercise_metadata.get("exercise_id") {
                    exercise_id = Some(
                        id.as_str()
                            .ok_or(MarkupError::NotAString("exercise_id"))?
                            .to_string(),
                    );
                }
                log::trace!("parsed exercise metadata: {exercise_metadata:?}");
                // a new exercise starts collecting its own context
                exercise_context.clear();
            }
            continue;
        }
        if cell.cell_type != CellType::Code {
            continue;
        }

        match pattern::classify(&cell.source) {
            CellKind::InlineTest { name, body_start } => {
                let filename = format!("{name}_inline.py");
                let exercise = require_exercise(&exercise_id, &filename)?;
                let mut parts = vec![];
                for context_cell in global_context.iter().chain(exercise_context.iter()) {
                    if let Some(clean) = clean_for_student(context_cell, &exercise_metadata)? {
                        parts.push(clean.source);
                    }
                }
                files.push(AssetFile {
                    exercise_id: exercise.clone(),
                    filename: format!("{name}_context.py"),
                    contents: parts.join("\n") + "\n",
                });
                files.push(AssetFile {
                    exercise_id: exercise,
                    filename,
                    contents: format!("{}\n", &cell.source[body_start..]),
                });
            }
            CellKind::UnitTest => {
                let text = pattern::cut_unittest(&cell.source)?;
                let class_name = pattern::TEST_CLASS_RE
                    .captures(text)
                    .map(|c| c[1].to_string())
                    .ok_or_else(|| MarkupError::UnittestClassName(cell.source.clone()))?;
                let filename = format!("{class_name}.py");
                let exercise = require_exercise(&exercise_id, &filename)?;
                // promote commented-out imports so the generated file can
                // import submission or submission_source
                let imports: String = pattern::IMPORT_RE
                    .captures_iter(text)
                    .map(|c| format!("import {}\n", &c[1]))
                    .collect();
                files.push(AssetFile {
                    exercise_id: exercise,
                    filename,
                    contents: format!("{imports}{text}"),
                });
            }
            CellKind::Solution => {
                let exercise = require_exercise(&exercise_id, "empty_submission.py")?;
                let prompt = solution_to_prompt(&cell.source)?;
                files.push(AssetFile {
                    exercise_id: exercise.clone(),
                    filename: "empty_source.py".to_string(),
                    contents: format!(
                        r#"source = """{}""""#,
                        prompt.replace(r#"""""#, r#"\"\"\""#)
                    ),
                });
                files.push(AssetFile {
                    exercise_id: exercise,
                    filename: "empty_submission.py".to_string(),
                    contents: prompt,
                });
            }
            CellKind::Template { name, body_start } => {
                let filename = format!("{name}.py");
                let exercise = require_exercise(&exercise_id, &filename)?;
                files.push(AssetFile {
                    exercise_id: exercise,
                    filename,
                    contents: template_script(&cell.source[body_start..]),
                });
            }
            CellKind::StudentTest { .. } | CellKind::Plain => {
                if exercise_id.is_none() {
                    global_context.push(cell.clone());
                } else {
                    exercise_context.push(cell.clone());
                }
            }
            CellKind::MasterOnly | CellKind::Tooling => {}
        }
    }

    if assignment_id.is_empty() {
        return Err(MarkupError::MissingAssignmentId);
    }
    Ok(AssetTree {
        assignment_id,
        files,
    })
}

// Wraps a %%template cell body into a script that reads the merged outcome
// JSON on stdin and renders the template to stdout. The script runs in the
// worker image, which carries jinja2 and pygments.
fn template_script(body: &str) -> String {
    format!(
        r#"
import jinja2
import json
import sys
import submission_source
import pygments
from pygments import lexers
from pygments import formatters

template = """{body}"""

if __name__ == '__main__':
  input = sys.stdin.read()
  data = json.loads(input)
  source = submission_source.source
  formatted_source = pygments.highlight(source, lexers.PythonLexer(), formatters.HtmlFormatter())
  tmpl = jinja2.Template(template)
  sys.stdout.write(tmpl.render(results=data['results'], formatted_source=formatted_source, logs=data['logs']))
"#
    )
}
