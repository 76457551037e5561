//! CSV sheet reading.
//!
//! Rows are returned as raw text cells, header included. The file may have ragged rows; a short
//! row is reported by the normalizer rather than failing the read.

use std::io::Read;
use std::path::Path;

use crate::error::IngestResult;

use super::unified::SheetRows;

/// Read every row of a CSV file.
pub fn read_csv_rows_from_path(path: impl AsRef<Path>) -> IngestResult<SheetRows> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("csv")
        .to_string();
    let rdr = csv_reader_builder().from_path(path)?;
    read_rows(name, rdr)
}

/// Read every row of CSV data from `reader`.
pub fn read_csv_rows_from_reader<R: Read>(name: impl Into<String>, reader: R) -> IngestResult<SheetRows> {
    read_rows(name.into(), csv_reader_builder().from_reader(reader))
}

fn csv_reader_builder() -> csv::ReaderBuilder {
    let mut b = csv::ReaderBuilder::new();
    b.has_headers(false).flexible(true);
    b
}

fn read_rows<R: Read>(name: String, mut rdr: csv::Reader<R>) -> IngestResult<SheetRows> {
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(SheetRows { name, rows })
}
