//! One handler per command.
//!
//! Handlers receive an already-validated [`Command`], resolve its addresses
//! against the live document and drive the engine. They return `Err` for any
//! failure; the episode converts errors into failed observations.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::core::address::{CellAddr, RangeAddr, parse_cell, parse_range};
use crate::core::command::{CellTarget, Command, FormatOptions, RangeTarget};
use crate::core::error::EnvError;
use crate::core::types::{CellValue, Observation, ObservationData};
use crate::handle::DocumentHandle;
use crate::io::engine::DocumentFormat;

type HandlerResult = Result<Observation, EnvError>;

/// Run one command against the document.
pub fn execute(handle: &mut DocumentHandle, command: Command) -> HandlerResult {
    match command {
        Command::CreateSheet => create_sheet(handle),
        Command::OpenFile { file_path } => open_file(handle, &file_path),
        Command::SaveFile { file_path } => save_file(handle, &file_path),
        Command::SetCell { target, value } => set_cell(handle, &target, &value),
        Command::GetCell(target) => get_cell(handle, &target),
        Command::SetRange { target, values } => set_range(handle, &target, &values),
        Command::GetRange(target) => get_range(handle, &target),
        Command::SetFormula { target, formula } => set_formula(handle, &target, &formula),
        Command::GetFormula(target) => get_formula(handle, &target),
        Command::AddSheet { name } => add_sheet(handle, name),
        Command::DeleteSheet { name } => delete_sheet(handle, &name),
        Command::RenameSheet { old_name, new_name } => rename_sheet(handle, &old_name, &new_name),
        Command::FormatCell { target, format } => format_cell(handle, &target, &format),
        Command::ExportPdf { file_path } => export_pdf(handle, &file_path),
        Command::ExportCsv { file_path, sheet } => export_csv(handle, &file_path, sheet.as_deref()),
    }
}

fn resolve_cell(handle: &DocumentHandle, target: &CellTarget) -> Result<(String, CellAddr), EnvError> {
    let cell = parse_cell(&target.cell)?;
    Ok((handle.resolve_sheet(target.sheet.as_deref()), cell))
}

fn resolve_range(handle: &DocumentHandle, target: &RangeTarget) -> Result<(String, RangeAddr), EnvError> {
    let range = parse_range(&target.range)?;
    Ok((handle.resolve_sheet(target.sheet.as_deref()), range))
}

fn write_value(
    handle: &mut DocumentHandle,
    sheet: &str,
    cell: CellAddr,
    value: &CellValue,
) -> Result<(), EnvError> {
    let document = handle.document_mut();
    match value {
        CellValue::Number(n) => document.set_cell_value(sheet, cell, *n)?,
        CellValue::Text(s) => document.set_cell_text(sheet, cell, s)?,
    }
    Ok(())
}

fn display_value(value: &CellValue) -> String {
    match value {
        CellValue::Number(n) => n.to_string(),
        CellValue::Text(s) => s.clone(),
    }
}

fn create_sheet(handle: &mut DocumentHandle) -> HandlerResult {
    Ok(Observation::success("New spreadsheet created")
        .with_current_sheet(handle.current_sheet())
        .with_sheet_names(handle.sheet_names()))
}

fn open_file(handle: &mut DocumentHandle, file_path: &Path) -> HandlerResult {
    if let Some(warning) = handle.replace_document(file_path)? {
        warn!(err = %warning, "failed to close previous document");
    }
    let shown = file_path.display().to_string();
    Ok(Observation::success(format!("File opened successfully: {shown}"))
        .with_current_sheet(handle.current_sheet())
        .with_sheet_names(handle.sheet_names())
        .with_file_path(shown))
}

fn save_file(handle: &mut DocumentHandle, file_path: &Path) -> HandlerResult {
    let sheet = handle.current_sheet().to_string();
    handle
        .document_mut()
        .store(file_path, DocumentFormat::Native, &sheet)?;
    handle.set_file_path(file_path);
    let shown = file_path.display().to_string();
    Ok(Observation::success(format!("File saved successfully: {shown}")).with_file_path(shown))
}

fn set_cell(handle: &mut DocumentHandle, target: &CellTarget, value: &CellValue) -> HandlerResult {
    let (sheet, cell) = resolve_cell(handle, target)?;
    write_value(handle, &sheet, cell, value)?;
    Ok(
        Observation::success(format!("Cell {} set to {}", target.cell, display_value(value)))
            .with_current_sheet(sheet),
    )
}

/// Text wins when it is non-empty after trimming; otherwise the numeric value.
fn get_cell(handle: &mut DocumentHandle, target: &CellTarget) -> HandlerResult {
    let (sheet, cell) = resolve_cell(handle, target)?;
    let document = handle.document();
    let text = document.cell_text(&sheet, cell)?;
    let value = if text.trim().is_empty() {
        CellValue::Number(document.cell_value(&sheet, cell)?)
    } else {
        CellValue::Text(text)
    };
    Ok(
        Observation::success(format!("Retrieved value from cell {}", target.cell))
            .with_data(ObservationData::Scalar(value))
            .with_current_sheet(sheet),
    )
}

/// Writes start at the range's top-left cell; the grid's own shape decides
/// how many cells are written.
fn set_range(handle: &mut DocumentHandle, target: &RangeTarget, values: &[Vec<CellValue>]) -> HandlerResult {
    let (sheet, range) = resolve_range(handle, target)?;
    if values.len() != range.rows() || values.iter().any(|row| row.len() != range.cols()) {
        debug!(range = %range, rows = values.len(), "value grid does not match range extent");
    }
    for (r, row) in values.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            let cell = CellAddr::new(range.start.col + c, range.start.row + r);
            write_value(handle, &sheet, cell, value)?;
        }
    }
    Ok(
        Observation::success(format!("Range {} set successfully.", target.range))
            .with_current_sheet(sheet),
    )
}

fn get_range(handle: &mut DocumentHandle, target: &RangeTarget) -> HandlerResult {
    let (sheet, range) = resolve_range(handle, target)?;
    let values = handle.document().range_values(&sheet, range)?;
    Ok(
        Observation::success(format!("Retrieved data from range {}", target.range))
            .with_data(ObservationData::Grid(values))
            .with_current_sheet(sheet),
    )
}

fn set_formula(handle: &mut DocumentHandle, target: &CellTarget, formula: &str) -> HandlerResult {
    let (sheet, cell) = resolve_cell(handle, target)?;
    handle.document_mut().set_cell_formula(&sheet, cell, formula)?;
    Ok(
        Observation::success(format!("Formula set in cell {}: {formula}", target.cell))
            .with_current_sheet(sheet),
    )
}

fn get_formula(handle: &mut DocumentHandle, target: &CellTarget) -> HandlerResult {
    let (sheet, cell) = resolve_cell(handle, target)?;
    let formula = handle.document().cell_formula(&sheet, cell)?;
    Ok(
        Observation::success(format!("Retrieved formula from cell {}", target.cell))
            .with_data(ObservationData::Scalar(CellValue::Text(formula)))
            .with_current_sheet(sheet),
    )
}

/// First `Sheet<n>` (n counting up from the sheet count + 1) that is not taken.
fn unique_sheet_name(existing: &[String]) -> String {
    (existing.len() + 1..)
        .map(|n| format!("Sheet{n}"))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| format!("Sheet{}", existing.len() + 1))
}

/// The new sheet is appended; the current sheet does not change.
fn add_sheet(handle: &mut DocumentHandle, name: Option<String>) -> HandlerResult {
    let names = handle.sheet_names();
    let name = name.unwrap_or_else(|| unique_sheet_name(&names));
    handle.document_mut().insert_sheet(&name, names.len())?;
    let current = handle.current_sheet().to_string();
    Ok(Observation::success(format!(
        "Sheet '{name}' added successfully; active sheet is still '{current}'"
    ))
    .with_current_sheet(current)
        .with_sheet_names(handle.sheet_names()))
}

fn delete_sheet(handle: &mut DocumentHandle, name: &str) -> HandlerResult {
    handle.document_mut().remove_sheet(name)?;
    let names = handle.sheet_names();
    if handle.current_sheet() == name
        && let Some(first) = names.first()
    {
        handle.set_current_sheet(first.clone());
    }
    Ok(Observation::success(format!("Sheet '{name}' deleted successfully"))
        .with_current_sheet(handle.current_sheet())
        .with_sheet_names(names))
}

fn rename_sheet(handle: &mut DocumentHandle, old_name: &str, new_name: &str) -> HandlerResult {
    handle.document_mut().rename_sheet(old_name, new_name)?;
    if handle.current_sheet() == old_name {
        handle.set_current_sheet(new_name);
    }
    Ok(
        Observation::success(format!("Sheet renamed from '{old_name}' to '{new_name}'"))
            .with_current_sheet(handle.current_sheet())
            .with_sheet_names(handle.sheet_names()),
    )
}

fn format_cell(handle: &mut DocumentHandle, target: &CellTarget, format: &FormatOptions) -> HandlerResult {
    // `cell` may name a single cell or a block; the format applies to every cell in it.
    let range = parse_range(&target.cell)?;
    let sheet = handle.resolve_sheet(target.sheet.as_deref());
    handle.document_mut().apply_format(&sheet, range, format)?;
    Ok(
        Observation::success(format!("Cell {} formatted successfully", target.cell))
            .with_current_sheet(sheet),
    )
}

fn export_pdf(handle: &mut DocumentHandle, file_path: &Path) -> HandlerResult {
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            EnvError::Engine(format!("create directory {}: {err}", parent.display()))
        })?;
    }
    let sheet = handle.current_sheet().to_string();
    handle
        .document_mut()
        .store(file_path, DocumentFormat::Pdf, &sheet)?;

    let shown = file_path.display().to_string();
    if file_path.exists() {
        Ok(Observation::success("PDF export completed").with_exported_file(&shown))
    } else {
        Ok(Observation::failure(
            "Export command issued but file not found",
            format!("exported file not found: {shown}"),
        )
        .with_exported_file(&shown))
    }
}

fn export_csv(handle: &mut DocumentHandle, file_path: &Path, sheet: Option<&str>) -> HandlerResult {
    let sheet = handle.resolve_sheet(sheet);
    handle
        .document_mut()
        .store(file_path, DocumentFormat::Csv, &sheet)?;
    let shown = file_path.display().to_string();
    Ok(Observation::success(format!("CSV export completed: {shown}"))
        .with_exported_file(&shown)
        .with_current_sheet(sheet))
}
