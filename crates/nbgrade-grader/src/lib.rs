#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

//! The grading engine: locates the autograder assets for a submitted
//! notebook, materializes a scratch workspace per exercise, runs the hidden
//! unit tests and inline tests inside the sandbox, classifies the runner
//! output and renders an HTML report.

mod engine;
mod error;
mod inline;
mod layout;
mod report;
mod sandbox;

pub use engine::{Autograder, ExerciseResult, Outcome, Report};
pub use error::{GraderError, SandboxError};
pub use inline::assemble_inline_test;
pub use layout::{scan_exercise_dir, AssetLayout, ExerciseFiles};
pub use sandbox::{Sandbox, SandboxRun, INLINE_TEST_LIMIT, UNIT_TEST_LIMIT};
