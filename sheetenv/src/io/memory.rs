//! In-process spreadsheet engine.
//!
//! A complete [`Engine`] backend that needs no office suite: workbooks live in
//! memory, formulas are evaluated on read by [`crate::io::formula`], and
//! documents are stored through [`crate::io::storage`]. PDF export shells out
//! to the configured converter.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, instrument};

use crate::core::address::{CellAddr, RangeAddr};
use crate::core::command::FormatOptions;
use crate::core::types::CellValue;
use crate::io::config::ExportConfig;
use crate::io::engine::{Connector, Document, DocumentFormat, Engine, EngineError, EngineResult};
use crate::io::formula::{self, CellSource, Evaluated, Evaluator, Lookup};
use crate::io::process;
use crate::io::storage::{self, CellFile, SheetFile, WorkbookFile};

/// Largest addressable column (XFD) and row.
const MAX_COLS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;

/// Largest range a single read, format or export may touch.
pub const MAX_RANGE_CELLS: usize = 1_000_000;

pub const DEFAULT_SHEET: &str = "Sheet1";

/// Connects to a fresh [`MemoryEngine`]. Never fails.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    export: ExportConfig,
}

impl MemoryConnector {
    pub fn new(export: ExportConfig) -> Self {
        Self { export }
    }
}

impl Connector for MemoryConnector {
    fn connect(&mut self) -> EngineResult<Box<dyn Engine>> {
        Ok(Box::new(MemoryEngine::new(self.export.clone())))
    }
}

#[derive(Debug)]
pub struct MemoryEngine {
    export: ExportConfig,
    terminated: bool,
}

impl MemoryEngine {
    pub fn new(export: ExportConfig) -> Self {
        Self {
            export,
            terminated: false,
        }
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.terminated {
            return Err(EngineError::Failed("engine has been terminated".to_string()));
        }
        Ok(())
    }
}

impl Engine for MemoryEngine {
    fn new_document(&mut self) -> EngineResult<Box<dyn Document>> {
        self.ensure_running()?;
        Ok(Box::new(Workbook::new(self.export.clone())))
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn load_document(&mut self, path: &Path) -> EngineResult<Box<dyn Document>> {
        self.ensure_running()?;
        if !path.exists() {
            return Err(EngineError::io(
                format!("open {}", path.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        let workbook = if is_csv {
            let sheet = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .filter(|stem| !stem.is_empty())
                .unwrap_or_else(|| DEFAULT_SHEET.to_string());
            let rows = storage::read_csv(path).map_err(|err| EngineError::failed(&err))?;
            Workbook::from_csv(sheet, &rows, self.export.clone())
        } else {
            let file = storage::read_workbook(path).map_err(|err| EngineError::failed(&err))?;
            Workbook::from_file(file, self.export.clone())?
        };
        debug!(sheets = workbook.sheets.len(), "document loaded");
        Ok(Box::new(workbook))
    }

    fn terminate(&mut self) -> EngineResult<()> {
        self.terminated = true;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CellFormat {
    bold: bool,
    italic: bool,
    color: Option<u32>,
}

impl CellFormat {
    fn merge(&mut self, options: &FormatOptions) {
        if let Some(bold) = options.bold {
            self.bold = bold;
        }
        if let Some(italic) = options.italic {
            self.italic = italic;
        }
        if let Some(color) = options.color {
            self.color = Some(color);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Content {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Formula(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Cell {
    content: Content,
    format: CellFormat,
}

impl Cell {
    fn is_blank(&self) -> bool {
        self.content == Content::Empty && self.format == CellFormat::default()
    }
}

#[derive(Debug, Clone)]
struct Sheet {
    name: String,
    cells: BTreeMap<CellAddr, Cell>,
}

impl Sheet {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    fn evaluate(&self, cell: CellAddr) -> Evaluated {
        formula::evaluate_cell(self, cell)
    }

    fn set_content(&mut self, cell: CellAddr, content: Content) {
        let entry = self.cells.entry(cell).or_default();
        entry.content = content;
        if entry.is_blank() {
            self.cells.remove(&cell);
        }
    }

    /// Rows from A1 to the last populated cell.
    fn used_rows(&self) -> EngineResult<Vec<Vec<CellValue>>> {
        let populated = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.content != Content::Empty)
            .map(|(addr, _)| *addr);
        let Some((max_row, max_col)) = populated.fold(None, |acc: Option<(usize, usize)>, addr| {
            Some(match acc {
                Some((r, c)) => (r.max(addr.row), c.max(addr.col)),
                None => (addr.row, addr.col),
            })
        }) else {
            return Ok(Vec::new());
        };
        let range = RangeAddr {
            start: CellAddr::new(0, 0),
            end: CellAddr::new(max_col, max_row),
        };
        check_range_size(range)?;
        Ok(self.values(range))
    }

    /// One evaluator for the whole range, so shared dependencies are
    /// evaluated once.
    fn values(&self, range: RangeAddr) -> Vec<Vec<CellValue>> {
        let evaluator = Evaluator::new(self);
        (range.start.row..=range.end.row)
            .map(|row| {
                (range.start.col..=range.end.col)
                    .map(|col| match evaluator.evaluate(CellAddr::new(col, row)) {
                        Evaluated::Number(n) => CellValue::Number(n),
                        other => CellValue::Text(other.text()),
                    })
                    .collect()
            })
            .collect()
    }
}

impl CellSource for Sheet {
    fn lookup(&self, cell: CellAddr) -> Lookup<'_> {
        match self.cells.get(&cell).map(|c| &c.content) {
            None | Some(Content::Empty) => Lookup::Empty,
            Some(Content::Number(n)) => Lookup::Number(*n),
            Some(Content::Text(s)) => Lookup::Text(s),
            Some(Content::Formula(f)) => Lookup::Formula(f),
        }
    }

    fn populated(&self, range: RangeAddr) -> Vec<CellAddr> {
        self.cells
            .range(range.start..=range.end)
            .filter(|(addr, cell)| {
                addr.col >= range.start.col && addr.col <= range.end.col && cell.content != Content::Empty
            })
            .map(|(addr, _)| *addr)
            .collect()
    }
}

/// An open in-memory document.
#[derive(Debug)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    export: ExportConfig,
    closed: bool,
}

impl Workbook {
    /// A blank document with a single `Sheet1`.
    pub fn new(export: ExportConfig) -> Self {
        Self {
            sheets: vec![Sheet::new(DEFAULT_SHEET)],
            export,
            closed: false,
        }
    }

    fn from_csv(name: String, rows: &[Vec<String>], export: ExportConfig) -> Self {
        let mut sheet = Sheet::new(name);
        for (row, fields) in rows.iter().enumerate() {
            for (col, field) in fields.iter().enumerate() {
                let content = match storage::csv_field_value(field) {
                    Some(CellValue::Number(n)) => Content::Number(n),
                    Some(CellValue::Text(s)) => Content::Text(s),
                    None => continue,
                };
                sheet.set_content(CellAddr::new(col, row), content);
            }
        }
        Self {
            sheets: vec![sheet],
            export,
            closed: false,
        }
    }

    fn from_file(file: WorkbookFile, export: ExportConfig) -> EngineResult<Self> {
        let mut workbook = Self {
            sheets: Vec::with_capacity(file.sheets.len()),
            export,
            closed: false,
        };
        for sheet_file in file.sheets {
            if workbook.position(&sheet_file.name).is_some() {
                return Err(EngineError::Failed(format!(
                    "duplicate sheet '{}' in document",
                    sheet_file.name
                )));
            }
            let mut sheet = Sheet::new(sheet_file.name);
            for (reference, stored) in sheet_file.cells {
                let addr = CellAddr::parse(&reference).ok_or_else(|| {
                    EngineError::Failed(format!(
                        "invalid cell '{reference}' in sheet '{}'",
                        sheet.name
                    ))
                })?;
                let content = if let Some(f) = stored.formula {
                    Content::Formula(f)
                } else if let Some(n) = stored.number {
                    Content::Number(n)
                } else if let Some(s) = stored.text {
                    Content::Text(s)
                } else {
                    Content::Empty
                };
                let cell = Cell {
                    content,
                    format: CellFormat {
                        bold: stored.bold,
                        italic: stored.italic,
                        color: stored.color,
                    },
                };
                if !cell.is_blank() {
                    sheet.cells.insert(addr, cell);
                }
            }
            workbook.sheets.push(sheet);
        }
        Ok(workbook)
    }

    fn to_file(&self) -> WorkbookFile {
        WorkbookFile {
            version: storage::WORKBOOK_VERSION,
            sheets: self
                .sheets
                .iter()
                .map(|sheet| SheetFile {
                    name: sheet.name.clone(),
                    cells: sheet
                        .cells
                        .iter()
                        .map(|(addr, cell)| {
                            let mut stored = CellFile {
                                bold: cell.format.bold,
                                italic: cell.format.italic,
                                color: cell.format.color,
                                ..CellFile::default()
                            };
                            match &cell.content {
                                Content::Empty => {}
                                Content::Number(n) => stored.number = Some(*n),
                                Content::Text(s) => stored.text = Some(s.clone()),
                                Content::Formula(f) => stored.formula = Some(f.clone()),
                            }
                            (addr.to_string(), stored)
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed {
            return Err(EngineError::Failed("document has been closed".to_string()));
        }
        Ok(())
    }

    fn sheet(&self, name: &str) -> EngineResult<&Sheet> {
        self.ensure_open()?;
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| sheet_not_found(name))
    }

    fn sheet_mut(&mut self, name: &str) -> EngineResult<&mut Sheet> {
        self.ensure_open()?;
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| sheet_not_found(name))
    }

    fn write(&mut self, sheet: &str, cell: CellAddr, content: Content) -> EngineResult<()> {
        check_bounds(cell)?;
        self.sheet_mut(sheet)?.set_content(cell, content);
        Ok(())
    }
}

fn sheet_not_found(name: &str) -> EngineError {
    EngineError::Address(format!("sheet '{name}' not found"))
}

fn check_bounds(cell: CellAddr) -> EngineResult<()> {
    if cell.col >= MAX_COLS || cell.row >= MAX_ROWS {
        return Err(EngineError::Address(format!(
            "cell {cell} is outside the sheet"
        )));
    }
    Ok(())
}

fn check_range_bounds(range: RangeAddr) -> EngineResult<()> {
    check_bounds(range.start)?;
    check_bounds(range.end)?;
    check_range_size(range)
}

fn check_range_size(range: RangeAddr) -> EngineResult<()> {
    let cells = range.rows().saturating_mul(range.cols());
    if cells > MAX_RANGE_CELLS {
        return Err(EngineError::Address(format!(
            "range {range} covers {cells} cells; at most {MAX_RANGE_CELLS} are allowed"
        )));
    }
    Ok(())
}

impl Document for Workbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn insert_sheet(&mut self, name: &str, index: usize) -> EngineResult<()> {
        self.ensure_open()?;
        if name.trim().is_empty() {
            return Err(EngineError::Address("sheet name must not be empty".to_string()));
        }
        if self.position(name).is_some() {
            return Err(EngineError::Address(format!("sheet '{name}' already exists")));
        }
        let index = index.min(self.sheets.len());
        self.sheets.insert(index, Sheet::new(name));
        Ok(())
    }

    fn remove_sheet(&mut self, name: &str) -> EngineResult<()> {
        self.ensure_open()?;
        let index = self.position(name).ok_or_else(|| sheet_not_found(name))?;
        if self.sheets.len() == 1 {
            return Err(EngineError::Address(format!(
                "cannot delete '{name}': a document needs at least one sheet"
            )));
        }
        self.sheets.remove(index);
        Ok(())
    }

    fn rename_sheet(&mut self, old_name: &str, new_name: &str) -> EngineResult<()> {
        self.ensure_open()?;
        if new_name.trim().is_empty() {
            return Err(EngineError::Address("sheet name must not be empty".to_string()));
        }
        let index = self.position(old_name).ok_or_else(|| sheet_not_found(old_name))?;
        if old_name != new_name && self.position(new_name).is_some() {
            return Err(EngineError::Address(format!(
                "sheet '{new_name}' already exists"
            )));
        }
        self.sheets[index].name = new_name.to_string();
        Ok(())
    }

    fn cell_text(&self, sheet: &str, cell: CellAddr) -> EngineResult<String> {
        check_bounds(cell)?;
        Ok(self.sheet(sheet)?.evaluate(cell).text())
    }

    fn cell_value(&self, sheet: &str, cell: CellAddr) -> EngineResult<f64> {
        check_bounds(cell)?;
        Ok(self.sheet(sheet)?.evaluate(cell).number())
    }

    fn cell_formula(&self, sheet: &str, cell: CellAddr) -> EngineResult<String> {
        check_bounds(cell)?;
        let sheet = self.sheet(sheet)?;
        Ok(match sheet.cells.get(&cell).map(|c| &c.content) {
            None | Some(Content::Empty) => String::new(),
            Some(Content::Number(n)) => formula::format_number(*n),
            Some(Content::Text(s)) | Some(Content::Formula(s)) => s.clone(),
        })
    }

    fn set_cell_value(&mut self, sheet: &str, cell: CellAddr, value: f64) -> EngineResult<()> {
        self.write(sheet, cell, Content::Number(value))
    }

    fn set_cell_text(&mut self, sheet: &str, cell: CellAddr, text: &str) -> EngineResult<()> {
        let content = if text.is_empty() {
            Content::Empty
        } else {
            Content::Text(text.to_string())
        };
        self.write(sheet, cell, content)
    }

    fn set_cell_formula(&mut self, sheet: &str, cell: CellAddr, formula: &str) -> EngineResult<()> {
        let content = if formula.starts_with('=') {
            Content::Formula(formula.to_string())
        } else if formula.is_empty() {
            Content::Empty
        } else if let Ok(n) = formula.trim().parse::<f64>() {
            Content::Number(n)
        } else {
            Content::Text(formula.to_string())
        };
        self.write(sheet, cell, content)
    }

    fn range_values(&self, sheet: &str, range: RangeAddr) -> EngineResult<Vec<Vec<CellValue>>> {
        check_range_bounds(range)?;
        Ok(self.sheet(sheet)?.values(range))
    }

    fn apply_format(&mut self, sheet: &str, range: RangeAddr, format: &FormatOptions) -> EngineResult<()> {
        check_range_bounds(range)?;
        let sheet = self.sheet_mut(sheet)?;
        for cell in range.cells() {
            let entry = sheet.cells.entry(cell).or_default();
            entry.format.merge(format);
            if entry.is_blank() {
                sheet.cells.remove(&cell);
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(path = %path.display(), format = format.label(), sheet = %sheet))]
    fn store(&mut self, path: &Path, format: DocumentFormat, sheet: &str) -> EngineResult<()> {
        self.ensure_open()?;
        match format {
            DocumentFormat::Native => {
                storage::write_workbook(path, &self.to_file()).map_err(|err| EngineError::failed(&err))
            }
            DocumentFormat::Csv => {
                let rows = self.sheet(sheet)?.used_rows()?;
                storage::write_csv(path, &rows).map_err(|err| EngineError::failed(&err))
            }
            DocumentFormat::Pdf => {
                let rows = self.sheet(sheet)?.used_rows()?;
                let staging = tempfile::tempdir()
                    .map_err(|err| EngineError::io("create pdf staging directory", err))?;
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "export".to_string());
                let staged = staging.path().join(format!("{stem}.csv"));
                storage::write_csv(&staged, &rows).map_err(|err| EngineError::failed(&err))?;
                process::convert_to_pdf(&self.export, &staged, path)
                    .map_err(|err| EngineError::failed(&err))
            }
        }
    }

    fn close(&mut self) -> EngineResult<()> {
        self.closed = true;
        Ok(())
    }
}
