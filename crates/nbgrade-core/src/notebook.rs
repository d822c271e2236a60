//! nbformat notebook documents.
//!
//! Only the parts the grader needs are modelled: the ordered cells, their
//! type and their source text. Everything else in the document is ignored.
//! Version 3 documents are upgraded to the version 4 cell list on parse.

use std::path::Path;

use serde::Deserialize;

use crate::error::GradeError;

/// A parsed notebook document.
#[derive(Debug, Clone, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub nbformat: Option<u32>,
}

/// One cell of a notebook.
#[derive(Debug, Clone, Deserialize)]
pub struct Cell {
    pub cell_type: CellType,
    #[serde(default)]
    source: CellSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
    #[serde(other)]
    Other,
}

/// nbformat allows the source as one string or as a list of lines that
/// already carry their own newlines.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl CellSource {
    fn joined(self) -> String {
        match self {
            CellSource::Text(s) => s,
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl Cell {
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            cell_type: CellType::Code,
            source: CellSource::Text(source.into()),
        }
    }

    pub fn is_code(&self) -> bool {
        self.cell_type == CellType::Code
    }

    /// The cell text, with list-form sources joined without separators.
    pub fn source(&self) -> String {
        self.source.clone().joined()
    }
}

impl Notebook {
    /// Read and parse a notebook file.
    pub fn load(path: &Path) -> Result<Self, GradeError> {
        if !path.exists() {
            return Err(GradeError::NotebookNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|message| GradeError::NotebookInvalid {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse a notebook from its JSON text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let document: serde_json::Value =
            serde_json::from_str(content).map_err(|e| e.to_string())?;
        match document.get("nbformat").and_then(serde_json::Value::as_u64) {
            Some(3) => {
                let legacy: NotebookV3 =
                    serde_json::from_value(document).map_err(|e| e.to_string())?;
                tracing::debug!("upgrading nbformat 3 notebook");
                Ok(legacy.upgrade())
            }
            Some(version) if version < 3 => Err(format!("unsupported nbformat version {version}")),
            _ => serde_json::from_value(document).map_err(|e| e.to_string()),
        }
    }

    /// Code cells in document order.
    pub fn code_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.is_code())
    }

    /// All code-cell sources joined with newlines. Used only for validation.
    pub fn code_source(&self) -> String {
        self.code_cells()
            .map(Cell::source)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// nbformat 3 layout: cells live in worksheets and code is under `input`.
#[derive(Debug, Deserialize)]
struct NotebookV3 {
    #[serde(default)]
    worksheets: Vec<WorksheetV3>,
}

#[derive(Debug, Deserialize)]
struct WorksheetV3 {
    #[serde(default)]
    cells: Vec<CellV3>,
}

#[derive(Debug, Deserialize)]
struct CellV3 {
    cell_type: String,
    #[serde(default)]
    input: Option<CellSource>,
    #[serde(default)]
    source: Option<CellSource>,
    #[serde(default)]
    level: Option<usize>,
}

impl NotebookV3 {
    fn upgrade(self) -> Notebook {
        let cells = self
            .worksheets
            .into_iter()
            .flat_map(|sheet| sheet.cells)
            .map(CellV3::upgrade)
            .collect();
        Notebook {
            cells,
            nbformat: Some(4),
        }
    }
}

impl CellV3 {
    fn upgrade(self) -> Cell {
        match self.cell_type.as_str() {
            "code" => Cell {
                cell_type: CellType::Code,
                source: self.input.unwrap_or_default(),
            },
            // Headings become markdown titles.
            "heading" => {
                let text = self.source.unwrap_or_default().joined();
                let hashes = "#".repeat(self.level.unwrap_or(1).max(1));
                Cell {
                    cell_type: CellType::Markdown,
                    source: CellSource::Text(format!("{hashes} {text}")),
                }
            }
            other => Cell {
                cell_type: match other {
                    "markdown" => CellType::Markdown,
                    "raw" => CellType::Raw,
                    _ => CellType::Other,
                },
                source: self.source.unwrap_or_default(),
            },
        }
    }
}
