//! The static patterns of the master markup language, and the classification
//! of code cells into the directive kinds the transformers dispatch on.

use crate::MarkupError;
use nbgrade_util::deserialize;
use once_cell::sync::Lazy;
use regex::{Match, Regex};
use serde_json::{Map, Value};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

pub(crate) static ASSIGNMENT_METADATA_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*# ASSIGNMENT METADATA"));
pub(crate) static EXERCISE_METADATA_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*# EXERCISE METADATA"));
pub(crate) static LANGUAGE_TAG_RE: Lazy<Regex> = Lazy::new(|| re(r"\*\*lang:([a-z]{2})\*\*"));
static FENCED_BLOCK_RE: Lazy<Regex> = Lazy::new(|| re(r"(?ms)^```([^`]|`[^`]|``[^`])*^```"));
pub(crate) static TEST_MARKER_RE: Lazy<Regex> = Lazy::new(|| re(r"(?m)^[ \t]*# TEST[^\n]*\n*"));
static STUDENT_TEST_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*#? ?%%studenttest(?:[ \t]+([a-zA-Z][a-zA-Z0-9_]*))[ \t]*\n*"));
static INLINE_TEST_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*#? ?%%inlinetest(?:[ \t]+([a-zA-Z][a-zA-Z0-9_]*))[ \t]*\n*"));
pub(crate) static SOLUTION_MAGIC_RE: Lazy<Regex> = Lazy::new(|| re(r"^[ \t]*%%solution[^\n]*\n"));
pub(crate) static SOLUTION_BEGIN_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^([ \t]*)# BEGIN SOLUTION *\n"));
pub(crate) static SOLUTION_END_RE: Lazy<Regex> = Lazy::new(|| re(r"(?m)^[ \t]*# END SOLUTION *"));
pub(crate) static PROMPT_BEGIN_RE: Lazy<Regex> =
    Lazy::new(|| re(r#"(?m)^[ \t]*""" # BEGIN PROMPT *\n|^[ \t]*# BEGIN PROMPT *\n"#));
pub(crate) static PROMPT_END_RE: Lazy<Regex> =
    Lazy::new(|| re(r#"(?m)\n[ \t]*""" # END PROMPT *\n|\n[ \t]*# END PROMPT *\n"#));
static UNITTEST_BEGIN_RE: Lazy<Regex> = Lazy::new(|| re(r"(?m)^[ \t]*# BEGIN UNITTEST *\n"));
static UNITTEST_END_RE: Lazy<Regex> = Lazy::new(|| re(r"(?m)^[ \t]*# END UNITTEST *"));
static AUTOTEST_MARKER_RE: Lazy<Regex> = Lazy::new(|| re(r"%autotest|autotest\("));
static SUBMISSION_MARKER_RE: Lazy<Regex> = Lazy::new(|| re(r"(?m)^[ \t]*%%(submission|solution)"));
static TEMPLATE_OR_REPORT_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*%%(template|report)|report\("));
pub(crate) static MASTER_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*#+ MASTER ONLY[^\n]*\n?"));
pub(crate) static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*#[ \t]*import[ \t]+([a-zA-Z][a-zA-Z0-9_]*)[ \t]*$"));
static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*%%template(?:[ \t]+([a-zA-Z][a-zA-Z0-9_]*))\n"));
pub(crate) static TEST_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^[ \t]*class ([a-zA-Z_0-9]*)\(unittest\.TestCase\):"));

/// The directive kind of one code cell of a master notebook.
///
/// Classification is what the two transformer passes dispatch on; the body
/// offsets point past the magic line for the kinds that carry a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    /// `%%solution` cell; becomes the prompt (student) or the empty
    /// submission pair (autograder).
    Solution,
    /// `%%studenttest <Name>`; kept for students, context for inline tests.
    StudentTest { name: String },
    /// `%%inlinetest <Name>`; hidden from students, emitted as a
    /// context/inline file pair for the autograder.
    InlineTest { name: String, body_start: usize },
    /// Contains a `# BEGIN UNITTEST` block.
    UnitTest,
    /// `%%template <Name>`; emitted as a report-render script.
    Template { name: String, body_start: usize },
    /// Marked `# MASTER ONLY`.
    MasterOnly,
    /// `%%submission` cells and `%autotest`/`report(` invocations, i.e.
    /// master-side authoring tooling with no derived artifact.
    Tooling,
    Plain,
}

/// Classifies the source of a code cell.
pub fn classify(source: &str) -> CellKind {
    if let Some(c) = INLINE_TEST_RE.captures(source) {
        return CellKind::InlineTest {
            name: c[1].to_string(),
            body_start: c.get(0).map(|m| m.end()).unwrap_or_default(),
        };
    }
    if let Some(c) = STUDENT_TEST_RE.captures(source) {
        return CellKind::StudentTest {
            name: c[1].to_string(),
        };
    }
    if UNITTEST_BEGIN_RE.is_match(source) {
        return CellKind::UnitTest;
    }
    if SOLUTION_MAGIC_RE.is_match(source) {
        return CellKind::Solution;
    }
    if let Some(c) = TEMPLATE_RE.captures(source) {
        return CellKind::Template {
            name: c[1].to_string(),
            body_start: c.get(0).map(|m| m.end()).unwrap_or_default(),
        };
    }
    if MASTER_ONLY_RE.is_match(source) {
        return CellKind::MasterOnly;
    }
    if AUTOTEST_MARKER_RE.is_match(source)
        || SUBMISSION_MARKER_RE.is_match(source)
        || TEMPLATE_OR_REPORT_RE.is_match(source)
    {
        return CellKind::Tooling;
    }
    CellKind::Plain
}

pub(crate) fn strip_student_test_marker(source: &str) -> String {
    let mut source = source.to_string();
    if let Some(m) = STUDENT_TEST_RE.find(&source) {
        source.replace_range(m.range(), "");
    }
    source
}

pub(crate) fn strip_test_marker(source: &str) -> String {
    let mut source = source.to_string();
    if let Some(m) = TEST_MARKER_RE.find(&source) {
        source.replace_range(m.range(), "");
    }
    source
}

/// Detects whether the markdown source has a triple backtick-fenced block
/// whose content matches the given metadata marker.
pub(crate) fn has_metadata(marker: &Regex, source: &str) -> bool {
    FENCED_BLOCK_RE
        .find_iter(source)
        .any(|m| marker.is_match(&source[m.start() + 3..m.end() - 3]))
}

/// Extracts the metadata mapping from the markdown source, using the marker
/// to pick the fenced block. Returns the parsed mapping (None when no block
/// matched) and the source with the metadata block cut out.
pub(crate) fn extract_metadata(
    marker: &Regex,
    source: &str,
) -> Result<(Option<Map<String, Value>>, String), MarkupError> {
    let fences: Vec<Match> = FENCED_BLOCK_RE.find_iter(source).collect();
    if fences.is_empty() {
        return Ok((None, source.to_string()));
    }
    let mut metadata = None;
    let mut outputs: Vec<&str> = vec![];
    for (i, m) in fences.iter().enumerate() {
        if outputs.is_empty() {
            outputs.push(&source[..m.start()]);
        }
        let text = &source[m.start() + 3..m.end() - 3];
        if marker.is_match(text) {
            let map = deserialize::yaml_from_str(text).map_err(|e| MarkupError::Metadata {
                block: text.to_string(),
                source: Box::new(e),
            })?;
            metadata = Some(map);
        } else {
            outputs.push(&source[m.range()]);
        }
        if i < fences.len() - 1 {
            outputs.push(&source[m.end()..fences[i + 1].start()]);
        } else {
            outputs.push(&source[m.end()..]);
        }
    }
    Ok((metadata, outputs.concat()))
}

/// If the text matches the begin and end patterns in sequence, returns the
/// enclosed range.
pub(crate) fn cut_unittest(text: &str) -> Result<&str, MarkupError> {
    let Some(begin) = UNITTEST_BEGIN_RE.find(text) else {
        return Err(MarkupError::MissingEndUnittest);
    };
    let end = UNITTEST_END_RE
        .find(text)
        .ok_or(MarkupError::MissingEndUnittest)?;
    if end.end() < begin.start() {
        return Err(MarkupError::UnittestOrder);
    }
    Ok(&text[begin.end()..end.start()])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn classifies_directives() {
        assert_eq!(classify("x = 1\n"), CellKind::Plain);
        assert_eq!(classify("%%solution\nx = 1\n"), CellKind::Solution);
        assert_eq!(
            classify("%%studenttest MyTest\nassert x == 1\n"),
            CellKind::StudentTest {
                name: "MyTest".to_string()
            }
        );
        assert!(matches!(
            classify("%%inlinetest InlineTest\nassert x == 1\n"),
            CellKind::InlineTest { name, body_start }
                if name == "InlineTest" && body_start == "%%inlinetest InlineTest\n".len()
        ));
        assert_eq!(
            classify("# BEGIN UNITTEST\nclass HelloTest(unittest.TestCase):\n  pass\n# END UNITTEST\n"),
            CellKind::UnitTest
        );
        assert!(matches!(
            classify("%%template ReportTemplate\n<div>{{results}}</div>\n"),
            CellKind::Template { name, .. } if name == "ReportTemplate"
        ));
        assert_eq!(classify("# MASTER ONLY\nprint('secret')\n"), CellKind::MasterOnly);
        assert_eq!(classify("%%submission\nx = 2\n"), CellKind::Tooling);
        assert_eq!(
            classify("result, log = autotest(HelloTest)\n"),
            CellKind::Tooling
        );
    }

    #[test]
    fn finds_fenced_metadata() {
        let source = "Some text\n```\n# ASSIGNMENT METADATA\nassignment_id: hello\n```\nmore text\n";
        assert!(has_metadata(&ASSIGNMENT_METADATA_RE, source));
        assert!(!has_metadata(&EXERCISE_METADATA_RE, source));
    }

    #[test]
    fn extracts_metadata_and_strips_block() {
        let source = "Intro.\n```\n# EXERCISE METADATA\nexercise_id: exercise_x\n```\nOutro.\n";
        let (metadata, stripped) = extract_metadata(&EXERCISE_METADATA_RE, source).unwrap();
        let metadata = metadata.unwrap();
        assert_eq!(metadata["exercise_id"], "exercise_x");
        assert_eq!(stripped, "Intro.\n\nOutro.\n");
    }

    #[test]
    fn keeps_unrelated_fenced_blocks() {
        let source = "```\ncode sample\n```\n\n```\n# ASSIGNMENT METADATA\nassignment_id: a\n```\n";
        let (metadata, stripped) = extract_metadata(&ASSIGNMENT_METADATA_RE, source).unwrap();
        assert!(metadata.is_some());
        assert!(stripped.contains("code sample"));
        assert!(!stripped.contains("ASSIGNMENT METADATA"));
    }

    #[test]
    fn cuts_unittest_block() {
        let source = "# BEGIN UNITTEST\nclass FooTest(unittest.TestCase):\n    pass\n# END UNITTEST\n";
        let cut = cut_unittest(source).unwrap();
        assert_eq!(cut, "class FooTest(unittest.TestCase):\n    pass\n");
    }

    #[test]
    fn unittest_block_requires_end_marker() {
        assert!(matches!(
            cut_unittest("# BEGIN UNITTEST\nclass FooTest(unittest.TestCase):\n"),
            Err(MarkupError::MissingEndUnittest)
        ));
    }
}
