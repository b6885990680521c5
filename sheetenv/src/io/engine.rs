//! Narrow capability interface between the environment and a spreadsheet engine.
//!
//! The environment never reaches past these traits: connecting, opening and
//! closing documents, reading and writing cells, and exporting. Any backend
//! (the bundled in-memory engine, or a bridge to an office suite) plugs in by
//! implementing [`Connector`], [`Engine`] and [`Document`].

use std::path::Path;

use thiserror::Error;

use crate::core::address::{CellAddr, RangeAddr};
use crate::core::command::FormatOptions;
use crate::core::error::EnvError;
use crate::core::types::CellValue;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be reached. The only retryable kind.
    #[error("failed to connect to spreadsheet engine: {0}")]
    Connect(String),

    /// Unknown sheet, duplicate sheet name, or a cell outside the sheet.
    #[error("{0}")]
    Address(String),

    #[error("{0} is not supported by this engine")]
    Unsupported(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Flatten an `anyhow` chain from the storage layer into a single message.
    pub fn failed(err: &anyhow::Error) -> Self {
        EngineError::Failed(format!("{err:#}"))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Connect(_))
    }
}

impl From<EngineError> for EnvError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Address(msg) => EnvError::Address(msg),
            other => EnvError::Engine(other.to_string()),
        }
    }
}

/// Output format for [`Document::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// The engine's own document format; round-trips everything.
    Native,
    /// One sheet as comma-separated values.
    Csv,
    /// One sheet rendered to PDF.
    Pdf,
}

impl DocumentFormat {
    pub fn label(self) -> &'static str {
        match self {
            DocumentFormat::Native => "native",
            DocumentFormat::Csv => "csv",
            DocumentFormat::Pdf => "pdf",
        }
    }
}

/// Establishes engine connections. One call is one attempt.
pub trait Connector: Send {
    fn connect(&mut self) -> EngineResult<Box<dyn Engine>>;
}

/// A live engine connection.
pub trait Engine: Send {
    /// Open a blank document.
    fn new_document(&mut self) -> EngineResult<Box<dyn Document>>;

    fn load_document(&mut self, path: &Path) -> EngineResult<Box<dyn Document>>;

    /// Release the connection. Called once per connection during teardown.
    fn terminate(&mut self) -> EngineResult<()>;
}

/// An open spreadsheet document.
///
/// Text and number reads are separate: `cell_text` is empty for empty and purely
/// numeric cells, and `cell_value` is `0` for text and empty cells. Formulas
/// answer with their evaluated result.
pub trait Document: Send {
    /// Sheet names in index order. Never empty.
    fn sheet_names(&self) -> Vec<String>;

    fn insert_sheet(&mut self, name: &str, index: usize) -> EngineResult<()>;
    fn remove_sheet(&mut self, name: &str) -> EngineResult<()>;
    fn rename_sheet(&mut self, old_name: &str, new_name: &str) -> EngineResult<()>;

    fn cell_text(&self, sheet: &str, cell: CellAddr) -> EngineResult<String>;
    fn cell_value(&self, sheet: &str, cell: CellAddr) -> EngineResult<f64>;
    /// Formula source for formula cells; the literal content otherwise.
    fn cell_formula(&self, sheet: &str, cell: CellAddr) -> EngineResult<String>;

    fn set_cell_value(&mut self, sheet: &str, cell: CellAddr, value: f64) -> EngineResult<()>;
    fn set_cell_text(&mut self, sheet: &str, cell: CellAddr, text: &str) -> EngineResult<()>;
    fn set_cell_formula(&mut self, sheet: &str, cell: CellAddr, formula: &str) -> EngineResult<()>;

    /// Row-major values: numbers for numeric cells, strings otherwise (`""` when empty).
    fn range_values(&self, sheet: &str, range: RangeAddr) -> EngineResult<Vec<Vec<CellValue>>>;

    fn apply_format(&mut self, sheet: &str, range: RangeAddr, format: &FormatOptions) -> EngineResult<()>;

    /// Write the document to `path`. `sheet` selects the sheet for single-sheet formats.
    fn store(&mut self, path: &Path, format: DocumentFormat, sheet: &str) -> EngineResult<()>;

    fn close(&mut self) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connect_errors_are_retryable() {
        assert!(EngineError::Connect("refused".into()).is_retryable());
        assert!(!EngineError::Failed("boom".into()).is_retryable());
        assert!(!EngineError::Address("no sheet".into()).is_retryable());
    }

    #[test]
    fn address_errors_keep_their_kind_at_the_dispatch_boundary() {
        let env: EnvError = EngineError::Address("sheet 'X' not found".into()).into();
        assert_eq!(env.kind(), "address_error");

        let env: EnvError = EngineError::Unsupported("pdf export".into()).into();
        assert_eq!(env, EnvError::Engine("pdf export is not supported by this engine".into()));
    }
}
