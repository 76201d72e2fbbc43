//! The master → student notebook transformation: solutions are replaced by
//! prompts, hidden tests and master-only material are dropped, and metadata
//! blocks are folded into notebook and cell metadata.

use crate::{
    pattern::{self, CellKind},
    MarkupError,
};
use nbgrade_notebook::{Cell, CellType, Notebook};
use serde_json::Map;

/// Produces the student version of a master notebook.
///
/// `language` filters markdown cells tagged `**lang:xx**`; `preamble` is the
/// source of a code cell prepended to the result.
pub fn to_student(
    notebook: &Notebook,
    language: Option<&str>,
    preamble: Option<&str>,
) -> Result<Notebook, MarkupError> {
    let mut assignment_metadata = Map::new();
    let mut exercise_metadata = Map::new();

    let mut out = notebook.map_cells(|cell| {
        match cell.cell_type {
            CellType::Markdown => {
                let mut source = cell.source.clone();
                if pattern::has_metadata(&pattern::ASSIGNMENT_METADATA_RE, &source) {
                    let (metadata, stripped) =
                        pattern::extract_metadata(&pattern::ASSIGNMENT_METADATA_RE, &source)?;
                    if let Some(metadata) = metadata {
                        // assignment metadata is global for the notebook
                        assignment_metadata.extend(metadata);
                    }
                    source = stripped;
                }
                if pattern::has_metadata(&pattern::EXERCISE_METADATA_RE, &source) {
                    let (metadata, stripped) =
                        pattern::extract_metadata(&pattern::EXERCISE_METADATA_RE, &source)?;
                    // exercise metadata applies to the next solution cell
                    exercise_metadata = metadata.unwrap_or_default();
                    source = stripped;
                }
                if pattern::MASTER_ONLY_RE.is_match(&source) {
                    return Ok(vec![]);
                }
                let source = match filter_language(&source, language) {
                    Some(source) if !source.is_empty() => source,
                    _ => return Ok(vec![]),
                };
                Ok(vec![Cell::markdown(source)])
            }
            CellType::Code => {
                clean_for_student(cell, &exercise_metadata).map(|c| c.into_iter().collect())
            }
            _ => Ok(vec![cell.clone()]),
        }
    })?;

    for (k, v) in assignment_metadata {
        out.metadata.insert(k, v);
    }
    if let Some(preamble) = preamble {
        out.cells.insert(0, Cell::code(preamble));
    }
    Ok(out)
}

/// Takes one cell of a master notebook and produces its clean student
/// version: `# TEST` markers are removed, `%%solution` bodies are replaced by
/// their prompt, hidden-test and master-only cells are dropped (None).
///
/// Also used when accumulating inline-test context, which is why it accepts
/// markdown cells as well.
pub(crate) fn clean_for_student(
    cell: &Cell,
    exercise_metadata: &Map<String, serde_json::Value>,
) -> Result<Option<Cell>, MarkupError> {
    if cell.cell_type == CellType::Markdown {
        if pattern::MASTER_ONLY_RE.is_match(&cell.source) {
            return Ok(None);
        }
        let mut source = cell.source.clone();
        if pattern::has_metadata(&pattern::ASSIGNMENT_METADATA_RE, &source) {
            source = pattern::extract_metadata(&pattern::ASSIGNMENT_METADATA_RE, &source)?.1;
        }
        if pattern::has_metadata(&pattern::EXERCISE_METADATA_RE, &source) {
            source = pattern::extract_metadata(&pattern::EXERCISE_METADATA_RE, &source)?.1;
        }
        return Ok(Some(Cell::markdown(source)));
    }
    if cell.cell_type != CellType::Code {
        return Ok(Some(cell.clone()));
    }

    match pattern::classify(&cell.source) {
        CellKind::MasterOnly
        | CellKind::InlineTest { .. }
        | CellKind::UnitTest
        | CellKind::Template { .. }
        | CellKind::Tooling => Ok(None),
        CellKind::StudentTest { .. } => {
            let source = pattern::strip_test_marker(&pattern::strip_student_test_marker(&cell.source));
            Ok(Some(Cell::code(source)))
        }
        CellKind::Plain => {
            let source = pattern::strip_test_marker(&cell.source);
            Ok(Some(Cell::code(source)))
        }
        CellKind::Solution => {
            let source = solution_to_prompt(&cell.source)?;
            let mut clean = Cell::code(source);
            clean.metadata = exercise_metadata.clone();
            Ok(Some(clean))
        }
    }
}

/// Rewrites the body of a `%%solution` cell into the prompt the student
/// starts from: the magic line is stripped and every `BEGIN SOLUTION` /
/// `END SOLUTION` span is replaced with the `BEGIN PROMPT` block if one is
/// present, or with a `...` placeholder indented like the begin marker.
pub(crate) fn solution_to_prompt(source: &str) -> Result<String, MarkupError> {
    let source = match pattern::SOLUTION_MAGIC_RE.find(source) {
        Some(m) => &source[m.end()..],
        None => source,
    };

    // extract the prompt, if any
    let mut prompt = String::new();
    let mut source = source.to_string();
    if let Some(begin) = pattern::PROMPT_BEGIN_RE.find(&source) {
        let end = pattern::PROMPT_END_RE
            .find(&source)
            .ok_or(MarkupError::MissingEndPrompt)?;
        if end.end() < begin.start() {
            return Err(MarkupError::PromptOrder);
        }
        prompt = source[begin.end()..end.start()].to_string();
        log::trace!("prompt = {prompt:?}");
        source = format!("{}{}", &source[..begin.start()], &source[end.end()..]);
    }

    let begins: Vec<_> = pattern::SOLUTION_BEGIN_RE.captures_iter(&source).collect();
    if begins.is_empty() {
        // no solution markers, the whole body is the solution
        return Ok("...".to_string());
    }
    let ends: Vec<_> = pattern::SOLUTION_END_RE.find_iter(&source).collect();
    if begins.len() != ends.len() {
        return Err(MarkupError::SolutionMarkerMismatch {
            begin: begins.len(),
            end: ends.len(),
        });
    }

    let mut out = String::new();
    for (i, captures) in begins.iter().enumerate() {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if i == 0 {
            out.push_str(&source[..whole.start()]);
        }
        if prompt.is_empty() {
            let indent = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            out.push_str(indent);
            out.push_str("...");
        } else {
            out.push_str(&prompt);
        }
        if i < begins.len() - 1 {
            out.push_str(&source[ends[i].end()..begins[i + 1].get(0).map(|m| m.start()).unwrap_or_default()]);
        } else {
            out.push_str(&source[ends[i].end()..]);
        }
    }
    Ok(out)
}

// Applies the **lang:xx** tag to a markdown source: with a filter set, cells
// tagged for another language are dropped; the tag itself never survives.
fn filter_language(source: &str, language: Option<&str>) -> Option<String> {
    let Some(language) = language else {
        return Some(pattern::LANGUAGE_TAG_RE.replace_all(source, "").into_owned());
    };
    let Some(captures) = pattern::LANGUAGE_TAG_RE.captures(source) else {
        // untagged cells are kept as is
        return Some(source.to_string());
    };
    if &captures[1] != language {
        return None;
    }
    Some(pattern::LANGUAGE_TAG_RE.replace_all(source, "").into_owned())
}
