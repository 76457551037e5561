#![cfg(feature = "excel")]

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader, Sheets};

use crate::error::{IngestError, IngestResult};

use super::unified::{SheetRows, SheetSelection};

/// Read rows from an Excel-family workbook (`.xlsx`, `.xls`, `.ods`, etc.) on disk.
///
/// Behavior:
/// - Picks sheets according to `selection` (the first sheet by default)
/// - Returns every row of each sheet as text cells, header row included
/// - Drops trailing empty cells, so a row that only fills 8 columns reports 8 cells even when the
///   sheet is wider
/// - Keeps positions absolute: leading blank rows and columns come back as empty rows and cells,
///   so cell `i` of row `r` is always column `i` of spreadsheet row `r + 1`
pub fn read_excel_rows_from_path(path: impl AsRef<Path>, selection: &SheetSelection) -> IngestResult<Vec<SheetRows>> {
    let workbook = open_workbook_auto(path)?;
    read_workbook(workbook, selection)
}

/// Read rows from an uploaded workbook held in memory.
pub fn read_excel_rows_from_bytes(bytes: &[u8], selection: &SheetSelection) -> IngestResult<Vec<SheetRows>> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    read_workbook(workbook, selection)
}

fn read_workbook<RS: Read + Seek>(mut workbook: Sheets<RS>, selection: &SheetSelection) -> IngestResult<Vec<SheetRows>> {
    let all: Vec<String> = workbook.sheet_names().to_vec();
    let sheets: Vec<String> = match selection {
        SheetSelection::First => all.into_iter().take(1).collect(),
        SheetSelection::Sheet(name) => vec![name.clone()],
        SheetSelection::AllSheets => all,
        SheetSelection::Sheets(names) => names.clone(),
    };
    if sheets.is_empty() {
        return Err(IngestError::schema_mismatch("workbook has no sheets"));
    }

    let mut out = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let range = workbook.worksheet_range(&sheet)?;
        // The range starts at its first used cell; pad back to A1.
        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<String>> = vec![Vec::new(); first_row as usize];
        rows.extend(range.rows().map(|r| row_to_cells(first_col as usize, r)));
        out.push(SheetRows { name: sheet, rows });
    }
    Ok(out)
}

fn row_to_cells(leading_blank: usize, row: &[Data]) -> Vec<String> {
    let Some(last) = row.iter().rposition(|c| !matches!(c, Data::Empty)) else {
        return Vec::new();
    };
    let mut cells = vec![String::new(); leading_blank];
    cells.extend(row[..=last].iter().map(cell_to_string));
    cells
}

fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Numeric-looking text (shop ids, barcodes) often arrives as floats.
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(d) => d.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}
