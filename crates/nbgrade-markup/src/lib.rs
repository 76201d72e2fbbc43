#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

//! Interprets the markup language embedded in master notebooks (cell magics,
//! comment markers and fenced metadata blocks) and derives the two artifacts
//! built from a master: the student notebook and the autograder asset tree.

mod autograder;
mod pattern;
mod student;

pub use autograder::{to_autograder, AssetFile, AssetTree};
pub use pattern::{classify, CellKind};
pub use student::to_student;

use nbgrade_util::{FileError, YamlError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("error parsing metadata block:\n--\n{block}\n--")]
    Metadata {
        block: String,
        #[source]
        source: Box<YamlError>,
    },
    #[error("metadata key {0} is not a string")]
    NotAString(&'static str),
    #[error("BEGIN PROMPT has no matching END PROMPT")]
    MissingEndPrompt,
    #[error("END PROMPT is before BEGIN PROMPT")]
    PromptOrder,
    #[error("cell has mismatched number of BEGIN SOLUTION and END SOLUTION, {begin} != {end}")]
    SolutionMarkerMismatch { begin: usize, end: usize },
    #[error("BEGIN UNITTEST has no matching END UNITTEST")]
    MissingEndUnittest,
    #[error("END UNITTEST is before BEGIN UNITTEST")]
    UnittestOrder,
    #[error("could not detect the test class name for unit test:\n{0}")]
    UnittestClassName(String),
    #[error("the master notebook does not declare assignment_id in # ASSIGNMENT METADATA")]
    MissingAssignmentId,
    #[error("{0} belongs to no exercise (no preceding # EXERCISE METADATA with exercise_id)")]
    NoExercise(String),
    #[error(transparent)]
    File(#[from] FileError),
}
