//! CSV export of indicator rows.
//!
//! Columns follow `IndicatorRow` field order. Values that are not warm yet are
//! written as empty cells.

use std::io::Write;
use std::path::Path;

use crate::models::IndicatorRow;

/// Write a header plus one record per row. Returns the number of records.
pub fn write_csv<W: Write>(rows: &[IndicatorRow], writer: W) -> Result<usize, csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

pub fn write_csv_file(rows: &[IndicatorRow], path: impl AsRef<Path>) -> Result<usize, csv::Error> {
    let file = std::fs::File::create(path)?;
    write_csv(rows, file)
}
