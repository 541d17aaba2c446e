//! Row-oriented tracking tables.
//!
//! Layout: three header rows (`scorer`, `bodyparts`, `coords`) followed by
//! one row per frame. The first column carries the frame index; every other
//! column is keyed by `(scorer, body part, channel)` with channel one of
//! `x`, `y`, `likelihood`.

use std::io::Read;
use std::path::Path;

use super::columns::ColumnLayout;
use super::KeypointTable;
use crate::error::{Result, RoiError};

const HEADER_ROWS: usize = 3;

pub fn read_path(path: &Path) -> Result<KeypointTable> {
    let file = std::fs::File::open(path)?;
    read(file)
}

pub fn read<R: Read>(reader: R) -> Result<KeypointTable> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = rdr.records();

    let mut header = Vec::with_capacity(HEADER_ROWS);
    for level in 0..HEADER_ROWS {
        let record = records.next().ok_or_else(|| {
            RoiError::InvalidTable(format!(
                "expected {} header rows, found {}",
                HEADER_ROWS, level
            ))
        })??;
        header.push(record);
    }
    let width = header[0].len();
    if header.iter().any(|r| r.len() != width) {
        return Err(RoiError::InvalidTable(
            "header rows have different lengths".to_string(),
        ));
    }

    let layout = ColumnLayout::resolve((1..width).map(|col| {
        (
            col,
            header[1].get(col).unwrap_or_default(),
            header[2].get(col).unwrap_or_default(),
        )
    }))?;

    let mut table = KeypointTable::new(&layout.parts)?;
    for (position, record) in records.enumerate() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let frame = record
            .get(0)
            .and_then(|cell| cell.trim().parse::<usize>().ok())
            .unwrap_or(position);
        table.push_frame(frame, layout.samples(|col| cell(&record, col)))?;
    }

    log::debug!(
        "loaded tracking table: {} body parts, {} frames",
        table.body_parts.len(),
        table.frames.len()
    );
    Ok(table)
}

fn cell(record: &::csv::StringRecord, col: usize) -> f64 {
    record
        .get(col)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}
