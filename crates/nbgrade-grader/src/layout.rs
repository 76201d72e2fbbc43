//! The on-disk convention of the autograder asset tree: one directory per
//! assignment, one subdirectory per exercise, and a file set the grader
//! classifies by suffix alone.

use crate::error::GraderError;
use nbgrade_util::file_util;
use std::path::{Path, PathBuf};

/// Locator over the read-only asset tree root.
#[derive(Debug, Clone)]
pub struct AssetLayout {
    root: PathBuf,
}

impl AssetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the directory of an assignment, erroring when it is absent.
    pub fn assignment_dir(&self, assignment_id: &str) -> Result<PathBuf, GraderError> {
        let dir = self.root.join(assignment_id);
        if !dir.is_dir() {
            return Err(GraderError::UnknownAssignment(assignment_id.to_string()));
        }
        Ok(dir)
    }

    /// Resolves the directory of an exercise within an assignment.
    pub fn exercise_dir(
        &self,
        assignment_id: &str,
        exercise_id: &str,
    ) -> Result<PathBuf, GraderError> {
        let dir = self.root.join(assignment_id).join(exercise_id);
        if !dir.is_dir() {
            return Err(GraderError::UnknownExercise(
                assignment_id.to_string(),
                exercise_id.to_string(),
            ));
        }
        Ok(dir)
    }
}

/// The classified contents of one exercise directory (or of the scratch copy
/// made from it).
#[derive(Debug, Default)]
pub struct ExerciseFiles {
    /// `<ClassName>Test.py` unit-test files.
    pub unit_tests: Vec<PathBuf>,
    /// `<Name>_context.py` / `<Name>_inline.py` pairs, keyed by name.
    pub inline_pairs: Vec<(String, PathBuf, PathBuf)>,
    /// `<Name>_template.py` report templates.
    pub templates: Vec<PathBuf>,
    pub empty_submission: Option<PathBuf>,
}

/// Reads one exercise directory and classifies its files by suffix. Results
/// are sorted by file name so runs are deterministic.
pub fn scan_exercise_dir(dir: &Path) -> Result<ExerciseFiles, GraderError> {
    let mut files = ExerciseFiles::default();
    let mut names = vec![];
    for entry in file_util::read_dir(dir)? {
        let entry = entry.map_err(|e| nbgrade_util::FileError::DirRead(dir.to_path_buf(), e))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();

    for name in &names {
        let path = dir.join(name);
        if name.ends_with("Test.py") {
            files.unit_tests.push(path);
        } else if name.ends_with("_template.py") {
            files.templates.push(path);
        } else if name == "empty_submission.py" {
            files.empty_submission = Some(path);
        } else if let Some(stem) = name.strip_suffix("_context.py") {
            let inline = dir.join(format!("{stem}_inline.py"));
            if inline.is_file() {
                files.inline_pairs.push((stem.to_string(), path, inline));
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    fn file_to(dir: impl AsRef<Path>, rel: &str, contents: &str) {
        let target = dir.as_ref().join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(target, contents).unwrap();
    }

    #[test]
    fn resolves_assignment_and_exercise_dirs() {
        let temp = tempfile::tempdir().unwrap();
        file_to(&temp, "hello-en/exercise_1/HelloTest.py", "");

        let layout = AssetLayout::new(temp.path());
        assert!(layout.assignment_dir("hello-en").is_ok());
        assert!(matches!(
            layout.assignment_dir("absent"),
            Err(GraderError::UnknownAssignment(_))
        ));
        assert!(layout.exercise_dir("hello-en", "exercise_1").is_ok());
        assert!(matches!(
            layout.exercise_dir("hello-en", "exercise_2"),
            Err(GraderError::UnknownExercise(_, _))
        ));
    }

    #[test]
    fn classifies_exercise_files() {
        let temp = tempfile::tempdir().unwrap();
        file_to(&temp, "HelloTest.py", "");
        file_to(&temp, "Inline_context.py", "");
        file_to(&temp, "Inline_inline.py", "");
        file_to(&temp, "Orphan_context.py", "");
        file_to(&temp, "Report_template.py", "");
        file_to(&temp, "empty_submission.py", "");
        file_to(&temp, "submission.py", "");

        let files = scan_exercise_dir(temp.path()).unwrap();
        assert_eq!(files.unit_tests.len(), 1);
        assert_eq!(files.inline_pairs.len(), 1);
        assert_eq!(files.inline_pairs[0].0, "Inline");
        assert_eq!(files.templates.len(), 1);
        assert!(files.empty_submission.is_some());
    }
}
