//! Typed commands parsed from untyped wire parameters.
//!
//! Each command name has its own parser, which performs the required-parameter
//! validation for that command. Parsers never touch the document: they only
//! shape the parameter mapping into a [`Command`] or explain what is missing.

use std::path::PathBuf;

use serde_json::Value;

use crate::core::error::EnvError;
use crate::core::types::{CellValue, Parameters};

/// Optional sheet plus a cell reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CellTarget {
    pub sheet: Option<String>,
    pub cell: String,
}

/// Optional sheet plus a range reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTarget {
    pub sheet: Option<String>,
    pub range: String,
}

/// Character formatting requested by `format_cell`. Unset fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    /// `0xRRGGBB`.
    pub color: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateSheet,
    OpenFile { file_path: PathBuf },
    SaveFile { file_path: PathBuf },
    SetCell { target: CellTarget, value: CellValue },
    GetCell(CellTarget),
    SetRange { target: RangeTarget, values: Vec<Vec<CellValue>> },
    GetRange(RangeTarget),
    SetFormula { target: CellTarget, formula: String },
    GetFormula(CellTarget),
    AddSheet { name: Option<String> },
    DeleteSheet { name: String },
    RenameSheet { old_name: String, new_name: String },
    FormatCell { target: CellTarget, format: FormatOptions },
    ExportPdf { file_path: PathBuf },
    ExportCsv { file_path: PathBuf, sheet: Option<String> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateSheet => "create_sheet",
            Command::OpenFile { .. } => "open_file",
            Command::SaveFile { .. } => "save_file",
            Command::SetCell { .. } => "set_cell",
            Command::GetCell(_) => "get_cell",
            Command::SetRange { .. } => "set_range",
            Command::GetRange(_) => "get_range",
            Command::SetFormula { .. } => "set_formula",
            Command::GetFormula(_) => "get_formula",
            Command::AddSheet { .. } => "add_sheet",
            Command::DeleteSheet { .. } => "delete_sheet",
            Command::RenameSheet { .. } => "rename_sheet",
            Command::FormatCell { .. } => "format_cell",
            Command::ExportPdf { .. } => "export_pdf",
            Command::ExportCsv { .. } => "export_csv",
        }
    }
}

pub fn parse_create_sheet(_params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::CreateSheet)
}

pub fn parse_open_file(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::OpenFile {
        file_path: required_path(params)?,
    })
}

pub fn parse_save_file(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::SaveFile {
        file_path: required_path(params)?,
    })
}

pub fn parse_set_cell(params: &Parameters) -> Result<Command, EnvError> {
    let target = cell_target(params)?;
    let value = params.get("value").map(CellValue::from_json).unwrap_or_else(|| CellValue::Text(String::new()));
    Ok(Command::SetCell { target, value })
}

pub fn parse_get_cell(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::GetCell(cell_target(params)?))
}

pub fn parse_set_range(params: &Parameters) -> Result<Command, EnvError> {
    let range = optional_str(params, "range")?;
    let values = match params.get("values") {
        Some(Value::Array(rows)) if !rows.is_empty() => Some(rows),
        Some(Value::Array(_)) | Some(Value::Null) | None => None,
        Some(_) => return Err(EnvError::invalid("values", "expected a 2-D array")),
    };
    let (range, rows) = match (range, values) {
        (Some(range), Some(rows)) => (range, rows),
        (range, rows) => {
            let mut missing = Vec::new();
            if range.is_none() {
                missing.push("range");
            }
            if rows.is_none() {
                missing.push("values");
            }
            return Err(EnvError::MissingParameter(missing));
        }
    };

    let values = rows
        .iter()
        .map(|row| match row {
            Value::Array(cells) => Ok(cells.iter().map(CellValue::from_json).collect()),
            _ => Err(EnvError::invalid("values", "every row must be an array")),
        })
        .collect::<Result<Vec<Vec<CellValue>>, EnvError>>()?;

    Ok(Command::SetRange {
        target: RangeTarget {
            sheet: optional_str(params, "sheet")?,
            range,
        },
        values,
    })
}

pub fn parse_get_range(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::GetRange(RangeTarget {
        sheet: optional_str(params, "sheet")?,
        range: required_str(params, "range")?,
    }))
}

pub fn parse_set_formula(params: &Parameters) -> Result<Command, EnvError> {
    let cell = optional_str(params, "cell")?;
    let formula = optional_str(params, "formula")?;
    match (cell, formula) {
        (Some(cell), Some(formula)) => Ok(Command::SetFormula {
            target: CellTarget {
                sheet: optional_str(params, "sheet")?,
                cell,
            },
            formula,
        }),
        (cell, formula) => {
            let mut missing = Vec::new();
            if cell.is_none() {
                missing.push("cell");
            }
            if formula.is_none() {
                missing.push("formula");
            }
            Err(EnvError::MissingParameter(missing))
        }
    }
}

pub fn parse_get_formula(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::GetFormula(cell_target(params)?))
}

pub fn parse_add_sheet(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::AddSheet {
        name: optional_str(params, "name")?,
    })
}

pub fn parse_delete_sheet(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::DeleteSheet {
        name: required_str(params, "name")?,
    })
}

pub fn parse_rename_sheet(params: &Parameters) -> Result<Command, EnvError> {
    let old_name = optional_str(params, "old_name")?;
    let new_name = optional_str(params, "new_name")?;
    match (old_name, new_name) {
        (Some(old_name), Some(new_name)) => Ok(Command::RenameSheet { old_name, new_name }),
        (old_name, new_name) => {
            let mut missing = Vec::new();
            if old_name.is_none() {
                missing.push("old_name");
            }
            if new_name.is_none() {
                missing.push("new_name");
            }
            Err(EnvError::MissingParameter(missing))
        }
    }
}

pub fn parse_format_cell(params: &Parameters) -> Result<Command, EnvError> {
    let target = cell_target(params)?;
    let format = match params.get("format_options") {
        None | Some(Value::Null) => FormatOptions::default(),
        Some(Value::Object(options)) => FormatOptions {
            bold: options.get("bold").map(|v| flag("bold", v)).transpose()?,
            italic: options.get("italic").map(|v| flag("italic", v)).transpose()?,
            color: options.get("color").map(color).transpose()?,
        },
        Some(_) => return Err(EnvError::invalid("format_options", "expected an object")),
    };
    Ok(Command::FormatCell { target, format })
}

pub fn parse_export_pdf(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::ExportPdf {
        file_path: required_path(params)?,
    })
}

pub fn parse_export_csv(params: &Parameters) -> Result<Command, EnvError> {
    Ok(Command::ExportCsv {
        file_path: required_path(params)?,
        sheet: optional_str(params, "sheet")?,
    })
}

fn cell_target(params: &Parameters) -> Result<CellTarget, EnvError> {
    Ok(CellTarget {
        sheet: optional_str(params, "sheet")?,
        cell: required_str(params, "cell")?,
    })
}

fn required_path(params: &Parameters) -> Result<PathBuf, EnvError> {
    required_str(params, "file_path").map(PathBuf::from)
}

fn required_str(params: &Parameters, name: &'static str) -> Result<String, EnvError> {
    optional_str(params, name)?.ok_or_else(|| EnvError::missing(name))
}

/// Absent, `null` and empty strings all count as "not supplied".
fn optional_str(params: &Parameters, name: &'static str) -> Result<Option<String>, EnvError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(EnvError::invalid(name, format!("expected a string, got {other}"))),
    }
}

fn flag(name: &'static str, value: &Value) -> Result<bool, EnvError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
        other => Err(EnvError::invalid(name, format!("expected a boolean, got {other}"))),
    }
}

/// Accepts `"#RRGGBB"` or an integer colour.
fn color(value: &Value) -> Result<u32, EnvError> {
    match value {
        Value::String(s) => s
            .strip_prefix('#')
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| EnvError::invalid("color", format!("expected '#RRGGBB', got '{s}'"))),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| EnvError::invalid("color", format!("expected a colour integer, got {n}"))),
        other => Err(EnvError::invalid("color", format!("unsupported colour {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn set_cell_without_value_writes_empty_text() {
        let cmd = parse_set_cell(&params(json!({"cell": "A1"}))).expect("parse");
        assert_eq!(
            cmd,
            Command::SetCell {
                target: CellTarget {
                    sheet: None,
                    cell: "A1".into()
                },
                value: CellValue::Text(String::new()),
            }
        );
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let err = parse_get_cell(&params(json!({"cell": ""}))).expect_err("missing");
        assert_eq!(err, EnvError::missing("cell"));
    }

    #[test]
    fn set_range_reports_each_missing_parameter() {
        let err = parse_set_range(&params(json!({}))).expect_err("missing");
        assert_eq!(err, EnvError::MissingParameter(vec!["range", "values"]));

        let err = parse_set_range(&params(json!({"range": "A1:B1", "values": []}))).expect_err("empty");
        assert_eq!(err, EnvError::MissingParameter(vec!["values"]));
    }

    #[test]
    fn set_range_rejects_non_grid_rows() {
        let err = parse_set_range(&params(json!({"range": "A1", "values": ["flat"]}))).expect_err("invalid");
        assert!(matches!(err, EnvError::InvalidParameter { name: "values", .. }));
    }

    #[test]
    fn set_formula_names_only_what_is_missing() {
        let err = parse_set_formula(&params(json!({"cell": "D1"}))).expect_err("missing");
        assert_eq!(err, EnvError::missing("formula"));
    }

    #[test]
    fn format_options_accept_hex_and_integer_colours() {
        let cmd = parse_format_cell(&params(json!({
            "cell": "A1",
            "format_options": {"bold": true, "color": "#FF0000"}
        })))
        .expect("parse");
        let Command::FormatCell { format, .. } = cmd else {
            panic!("expected format_cell");
        };
        assert_eq!(format.bold, Some(true));
        assert_eq!(format.italic, None);
        assert_eq!(format.color, Some(0xFF0000));

        let cmd = parse_format_cell(&params(json!({"cell": "A1", "format_options": {"color": 255}})))
            .expect("parse");
        assert!(matches!(cmd, Command::FormatCell { format: FormatOptions { color: Some(255), .. }, .. }));

        let err = parse_format_cell(&params(json!({"cell": "A1", "format_options": {"color": "red"}})))
            .expect_err("invalid");
        assert!(matches!(err, EnvError::InvalidParameter { name: "color", .. }));
    }

    #[test]
    fn non_string_cell_is_invalid_not_missing() {
        let err = parse_get_cell(&params(json!({"cell": 5}))).expect_err("invalid");
        assert!(matches!(err, EnvError::InvalidParameter { name: "cell", .. }));
    }
}
