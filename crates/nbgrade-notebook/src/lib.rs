#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

//! In-memory model of a Jupyter notebook, i.e. a JSON file following some
//! conventions. Parsing is tolerant of the wire format's quirks (source as a
//! string or as a list of lines, missing metadata); emission produces JSON
//! that notebook consumers accept back.

use nbgrade_util::{deserialize, file_util, FileError, JsonError};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotebookError {
    #[error("error parsing notebook JSON")]
    Json(#[source] JsonError),
    #[error("notebook is not a JSON object")]
    NotAnObject,
    #[error(".cells is not a list")]
    CellsNotAList,
    #[error("cell is not a map")]
    CellNotAMap,
    #[error("cell.source is neither a list nor a string")]
    SourceNotText,
    #[error("cell.outputs is not a list")]
    OutputsNotAList,
    #[error("output name is not a string")]
    OutputNameNotAString,
    #[error(transparent)]
    File(#[from] FileError),
}

/// The type of a notebook cell. Cell types other than code and markdown are
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellType {
    Code,
    Markdown,
    Other(String),
}

impl CellType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
            Self::Other(s) => s,
        }
    }

    fn from_wire(s: &str) -> Self {
        match s {
            "code" => Self::Code,
            "markdown" => Self::Markdown,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One cell of a notebook.
///
/// The source is always kept as a single string with embedded newlines, even
/// when the wire format split it into a list of lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub cell_type: CellType,
    pub metadata: Map<String, Value>,
    pub source: String,
    /// Recorded stream outputs, keyed by stream name.
    pub outputs: BTreeMap<String, String>,
}

impl Cell {
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            cell_type: CellType::Code,
            metadata: Map::new(),
            source: source.into(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self {
            cell_type: CellType::Markdown,
            metadata: Map::new(),
            source: source.into(),
            outputs: BTreeMap::new(),
        }
    }

    /// Reads a string value from the cell metadata.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    fn to_wire(&self) -> Value {
        let mut map = Map::new();
        map.insert("cell_type".to_string(), Value::from(self.cell_type.as_str()));
        map.insert(
            "metadata".to_string(),
            Value::Object(self.metadata.clone()),
        );
        map.insert("source".to_string(), split_lines(&self.source));
        if self.cell_type == CellType::Code {
            // notebook consumers expect these keys on every code cell
            map.insert("execution_count".to_string(), Value::Null);
            let outputs = self
                .outputs
                .iter()
                .map(|(name, text)| {
                    let mut o = Map::new();
                    o.insert("name".to_string(), Value::from(name.as_str()));
                    o.insert("output_type".to_string(), Value::from("stream"));
                    o.insert("text".to_string(), split_lines(text));
                    Value::Object(o)
                })
                .collect::<Vec<_>>();
            map.insert("outputs".to_string(), Value::Array(outputs));
        }
        Value::Object(map)
    }
}

/// A parsed notebook. Only the keys this system reads are modeled; any other
/// top-level key is lost on emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Notebook {
    pub nbformat: i64,
    pub nbformat_minor: i64,
    pub metadata: Map<String, Value>,
    pub cells: Vec<Cell>,
}

impl Notebook {
    /// Parses notebook JSON bytes into a Notebook.
    pub fn parse(bytes: &[u8]) -> Result<Self, NotebookError> {
        let data: Value = deserialize::json_from_slice(bytes).map_err(NotebookError::Json)?;
        let data = data.as_object().ok_or(NotebookError::NotAnObject)?;

        let nbformat = data
            .get("nbformat")
            .and_then(Value::as_i64)
            .unwrap_or(4);
        let nbformat_minor = data
            .get("nbformat_minor")
            .and_then(Value::as_i64)
            .unwrap_or(2);
        let metadata = data
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut cells = vec![];
        if let Some(raw_cells) = data.get("cells") {
            let raw_cells = raw_cells.as_array().ok_or(NotebookError::CellsNotAList)?;
            for raw in raw_cells {
                cells.push(parse_cell(raw)?);
            }
        }

        Ok(Self {
            nbformat,
            nbformat_minor,
            metadata,
            cells,
        })
    }

    /// Reads and parses a notebook file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, NotebookError> {
        let bytes = file_util::read_file(path)?;
        Self::parse(&bytes)
    }

    /// Produces JSON content suitable for writing to an .ipynb file.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Map::new();
        out.insert("nbformat".to_string(), Value::from(self.nbformat));
        out.insert(
            "nbformat_minor".to_string(),
            Value::from(self.nbformat_minor),
        );
        out.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        out.insert(
            "cells".to_string(),
            Value::Array(self.cells.iter().map(Cell::to_wire).collect()),
        );
        let mut bytes = serde_json::to_vec_pretty(&Value::Object(out)).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Runs a function on each cell and replaces the cell with the returned
    /// values. Returning an empty Vec drops the cell.
    pub fn map_cells<E>(
        &self,
        mut map_fn: impl FnMut(&Cell) -> Result<Vec<Cell>, E>,
    ) -> Result<Self, E> {
        let mut out = vec![];
        for cell in &self.cells {
            out.extend(map_fn(cell)?);
        }
        Ok(Self {
            nbformat: self.nbformat,
            nbformat_minor: self.nbformat_minor,
            metadata: self.metadata.clone(),
            cells: out,
        })
    }
}

// Accepts the notebook wire format's two source representations.
fn parse_text(v: &Value) -> Result<String, NotebookError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Array(parts) => {
            let mut text = String::new();
            for part in parts {
                text.push_str(part.as_str().ok_or(NotebookError::SourceNotText)?);
            }
            Ok(text)
        }
        _ => Err(NotebookError::SourceNotText),
    }
}

fn parse_cell(raw: &Value) -> Result<Cell, NotebookError> {
    let raw = raw.as_object().ok_or(NotebookError::CellNotAMap)?;
    let cell_type = raw
        .get("cell_type")
        .and_then(Value::as_str)
        .map(CellType::from_wire)
        .unwrap_or(CellType::Other(String::new()));
    let metadata = raw
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let source = match raw.get("source") {
        Some(v) => parse_text(v)?,
        None => String::new(),
    };
    let mut outputs = BTreeMap::new();
    if let Some(raw_outputs) = raw.get("outputs") {
        let raw_outputs = raw_outputs
            .as_array()
            .ok_or(NotebookError::OutputsNotAList)?;
        for output in raw_outputs {
            let Some(output) = output.as_object() else {
                continue;
            };
            let Some(name) = output.get("name") else {
                continue;
            };
            let name = name.as_str().ok_or(NotebookError::OutputNameNotAString)?;
            let text = match output.get("text") {
                Some(v) => parse_text(v)?,
                None => String::new(),
            };
            outputs.insert(name.to_string(), text);
        }
    }
    Ok(Cell {
        cell_type,
        metadata,
        source,
        outputs,
    })
}

// Splits multi-line text back into the wire format's list of lines, keeping
// the trailing newline on every line except the last.
fn split_lines(text: &str) -> Value {
    if text.is_empty() {
        return Value::Array(vec![]);
    }
    let mut lines = text.split('\n').collect::<Vec<_>>();
    let last = lines.pop().unwrap_or_default();
    let mut out = lines
        .into_iter()
        .map(|l| Value::from(format!("{l}\n")))
        .collect::<Vec<_>>();
    if !last.is_empty() {
        out.push(Value::from(last));
    }
    Value::Array(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    fn parse_json(s: &str) -> Notebook {
        Notebook::parse(s.as_bytes()).unwrap()
    }

    #[test]
    fn parses_source_as_string_or_list() {
        let n = parse_json(
            r#"{
  "nbformat": 4, "nbformat_minor": 5,
  "cells": [
    {"cell_type": "code", "source": "x = 1\ny = 2\n"},
    {"cell_type": "code", "source": ["x = 1\n", "y = 2\n"]}
  ]
}"#,
        );
        assert_eq!(n.cells[0].source, "x = 1\ny = 2\n");
        assert_eq!(n.cells[0].source, n.cells[1].source);
    }

    #[test]
    fn missing_source_and_metadata_default_to_empty() {
        let n = parse_json(r#"{"cells": [{"cell_type": "markdown"}]}"#);
        assert_eq!(n.cells[0].source, "");
        assert!(n.cells[0].metadata.is_empty());
    }

    #[test]
    fn parses_stream_outputs() {
        let n = parse_json(
            r#"{
  "cells": [{
    "cell_type": "code",
    "source": "print('hi')",
    "outputs": [
      {"name": "stdout", "output_type": "stream", "text": ["hi\n"]},
      {"output_type": "display_data", "data": {}}
    ]
  }]
}"#,
        );
        assert_eq!(n.cells[0].outputs["stdout"], "hi\n");
        assert_eq!(n.cells[0].outputs.len(), 1);
    }

    #[test]
    fn code_cells_emit_outputs_and_execution_count() {
        let n = parse_json(r#"{"cells": [{"cell_type": "code", "source": "x = 1"}]}"#);
        let emitted: Value = serde_json::from_slice(&n.to_bytes()).unwrap();
        let cell = &emitted["cells"][0];
        assert_eq!(cell["execution_count"], Value::Null);
        assert_eq!(cell["outputs"], Value::Array(vec![]));
        assert_eq!(cell["source"], serde_json::json!(["x = 1"]));
    }

    #[test]
    fn emission_keeps_line_structure() {
        let n = parse_json(r#"{"cells": [{"cell_type": "code", "source": "a\nb\n"}]}"#);
        let emitted: Value = serde_json::from_slice(&n.to_bytes()).unwrap();
        assert_eq!(emitted["cells"][0]["source"], serde_json::json!(["a\n", "b\n"]));
    }

    #[test]
    fn unknown_top_level_keys_are_dropped() {
        let n = parse_json(r#"{"cells": [], "unknown_key": 42}"#);
        let emitted: Value = serde_json::from_slice(&n.to_bytes()).unwrap();
        assert!(emitted.get("unknown_key").is_none());
    }

    #[test]
    fn unknown_cell_metadata_round_trips() {
        let n = parse_json(
            r#"{"cells": [{"cell_type": "code", "source": "", "metadata": {"custom": {"a": 1}}}]}"#,
        );
        let emitted: Value = serde_json::from_slice(&n.to_bytes()).unwrap();
        assert_eq!(emitted["cells"][0]["metadata"]["custom"]["a"], 1);
    }

    #[test]
    fn round_trip_is_stable() {
        let source = r##"{
  "nbformat": 4, "nbformat_minor": 5,
  "metadata": {"assignment_id": "helloworld-en", "language_info": {"name": "python"}},
  "cells": [
    {"cell_type": "markdown", "metadata": {}, "source": ["# Title\n", "text"]},
    {"cell_type": "code", "metadata": {"exercise_id": "exercise_hello"},
     "source": ["x = 1\n", "print(x)"],
     "outputs": [{"name": "stdout", "output_type": "stream", "text": "1\n"}]}
  ]
}"##;
        let once = parse_json(source);
        let twice = Notebook::parse(&once.to_bytes()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn bad_json_is_a_parse_error() {
        assert!(matches!(
            Notebook::parse(b"{not json"),
            Err(NotebookError::Json(_))
        ));
    }
}
