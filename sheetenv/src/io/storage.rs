//! On-disk formats for the in-memory engine.
//!
//! The native format is a JSON workbook; CSV is supported for single-sheet
//! import and export.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::types::CellValue;
use crate::io::formula::format_number;

pub const WORKBOOK_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookFile {
    pub version: u32,
    pub sheets: Vec<SheetFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetFile {
    pub name: String,
    /// Keyed by A1 reference.
    #[serde(default)]
    pub cells: BTreeMap<String, CellFile>,
}

/// One stored cell. At most one of `number`, `text` and `formula` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

pub fn read_workbook(path: &Path) -> Result<WorkbookFile> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let workbook: WorkbookFile =
        serde_json::from_str(&contents).with_context(|| format!("parse workbook {}", path.display()))?;
    if workbook.version != WORKBOOK_VERSION {
        bail!(
            "unsupported workbook version {} in {}",
            workbook.version,
            path.display()
        );
    }
    if workbook.sheets.is_empty() {
        bail!("workbook {} has no sheets", path.display());
    }
    Ok(workbook)
}

/// Atomically write a workbook (temp file + rename).
pub fn write_workbook(path: &Path, workbook: &WorkbookFile) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(workbook).context("serialize workbook")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Read a CSV file into rows of raw fields.
pub fn read_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    let content = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(parse_csv(&content))
}

/// Write rows as CSV: comma separated, `"`-quoted where needed, LF line endings.
pub fn write_csv(path: &Path, rows: &[Vec<CellValue>]) -> Result<()> {
    let mut buf = String::new();
    for row in rows {
        let fields: Vec<String> = row
            .iter()
            .map(|value| match value {
                CellValue::Number(n) => format_number(*n),
                CellValue::Text(s) => escape_csv_field(s),
            })
            .collect();
        buf.push_str(&fields.join(","));
        buf.push('\n');
    }
    write_atomic(path, &buf)
}

/// Interpret a raw CSV field: numbers become numbers unless they carry a
/// leading zero (`007`), everything else stays text.
pub fn csv_field_value(field: &str) -> Option<CellValue> {
    if field.is_empty() {
        return None;
    }
    let has_leading_zero = field.len() > 1
        && field.starts_with('0')
        && field.chars().nth(1).is_some_and(|c| c.is_ascii_digit());
    if !has_leading_zero
        && field.trim() == field
        && let Ok(n) = field.parse::<f64>()
        && n.is_finite()
    {
        return Some(CellValue::Number(n));
    }
    Some(CellValue::Text(field.to_string()))
}

/// Split CSV text into records. Quoted fields may span line breaks; CRLF and
/// LF both end a record, and a trailing line break does not add an empty one.
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut current)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut current));
                records.push(std::mem::take(&mut fields));
                pending = false;
                continue;
            }
            _ => current.push(c),
        }
        pending = true;
    }
    if pending {
        fields.push(current);
        records.push(fields);
    }
    records
}

fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("path has no file name {}", path.display()))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_line_handles_quotes_and_empty_fields() {
        assert_eq!(parse_csv("a,,c"), vec![vec!["a", "", "c"]]);
        assert_eq!(
            parse_csv(r#"a,"hello, world","say ""hi""""#),
            vec![vec!["a", "hello, world", r#"say "hi""#]]
        );
        assert_eq!(parse_csv("a\r\n\nb\n"), vec![vec!["a"], vec![""], vec!["b"]]);
    }

    #[test]
    fn quoted_fields_keep_embedded_line_breaks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("notes.csv");
        write_csv(
            &path,
            &[
                vec!["Name".into(), "Note".into()],
                vec!["Alice".into(), "line one\nline two".into()],
                vec!["Bob".into(), CellValue::Number(3.0)],
            ],
        )
        .expect("write");

        let rows = read_csv(&path).expect("read");
        assert_eq!(
            rows,
            vec![
                vec!["Name", "Note"],
                vec!["Alice", "line one\nline two"],
                vec!["Bob", "3"],
            ]
        );
    }

    #[test]
    fn csv_fields_keep_leading_zero_strings_as_text() {
        assert_eq!(csv_field_value("42"), Some(CellValue::Number(42.0)));
        assert_eq!(csv_field_value("0"), Some(CellValue::Number(0.0)));
        assert_eq!(csv_field_value("007"), Some(CellValue::Text("007".into())));
        assert_eq!(csv_field_value("NY"), Some(CellValue::Text("NY".into())));
        assert_eq!(csv_field_value(""), None);
    }

    #[test]
    fn csv_export_quotes_and_prints_integers_plainly() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/out.csv");
        write_csv(
            &path,
            &[
                vec!["Name".into(), "Note".into()],
                vec!["Alice".into(), "likes \"tea\", a lot".into()],
                vec![CellValue::Number(25.0), CellValue::Number(2.5)],
            ],
        )
        .expect("write");

        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(
            contents,
            "Name,Note\nAlice,\"likes \"\"tea\"\", a lot\"\n25,2.5\n"
        );
    }

    #[test]
    fn workbook_round_trips_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("book.json");
        let mut cells = BTreeMap::new();
        cells.insert(
            "A1".to_string(),
            CellFile {
                number: Some(25.0),
                bold: true,
                ..CellFile::default()
            },
        );
        let workbook = WorkbookFile {
            version: WORKBOOK_VERSION,
            sheets: vec![SheetFile {
                name: "Data".to_string(),
                cells,
            }],
        };

        write_workbook(&path, &workbook).expect("write");
        assert_eq!(read_workbook(&path).expect("read"), workbook);
        assert!(!temp.path().join(".book.json.tmp").exists());
    }

    #[test]
    fn workbook_without_sheets_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("empty.json");
        fs::write(&path, r#"{"version":1,"sheets":[]}"#).expect("write");
        let err = read_workbook(&path).expect_err("invalid");
        assert!(err.to_string().contains("no sheets"));
    }
}
