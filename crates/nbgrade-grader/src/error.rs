use nbgrade_notebook::NotebookError;
use nbgrade_util::FileError;
use std::path::PathBuf;
use thiserror::Error;

/// An error caused by a failed attempt to execute the sandbox binary. Test
/// failures inside the sandbox are classified outcomes, never errors.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error(
        "The sandbox executable could not be found at {path}. Please make sure it is installed."
    )]
    NotFound {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to spawn sandbox at {0}")]
    Spawn(PathBuf, #[source] std::io::Error),
    #[error("Failed to wait for sandboxed process")]
    Process(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GraderError {
    #[error("could not parse submission as JSON")]
    Parse(#[source] NotebookError),
    #[error("submission metadata has no {0}")]
    MissingMetadata(&'static str),
    #[error("submission metadata.{0} is not a string")]
    MetadataNotString(&'static str),
    #[error("assignment with id {0:?} does not exist")]
    UnknownAssignment(String),
    #[error("exercise with id {0}/{1} does not exist")]
    UnknownExercise(String, String),
    #[error("scratch directory {0} already exists")]
    ScratchExists(PathBuf),
    #[error("error serializing report JSON")]
    Serialize(#[source] serde_json::Error),
    #[error(transparent)]
    File(#[from] FileError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("grading submission {submission_id} failed")]
    Submission {
        submission_id: String,
        #[source]
        source: Box<GraderError>,
    },
}

impl GraderError {
    /// Wraps the error with the submission id so the caller can still reply
    /// with a targeted report.
    pub fn for_submission(self, submission_id: &str) -> Self {
        match self {
            err @ Self::Submission { .. } => err,
            err => Self::Submission {
                submission_id: submission_id.to_string(),
                source: Box::new(err),
            },
        }
    }

    /// The submission id the failure belongs to, when known.
    pub fn submission_id(&self) -> Option<&str> {
        match self {
            Self::Submission { submission_id, .. } => Some(submission_id),
            _ => None,
        }
    }
}
