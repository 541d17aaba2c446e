//! CSV export of batch results.
//!
//! Columns: `details_name, video_file, mode, start_time, end_time`, then one
//! column per region name in order of first appearance across rows. A row
//! without a given region leaves that cell empty.

use std::io::Write;
use std::path::Path;

use crate::batch::ResultRow;
use crate::error::Result;

pub const FIXED_COLUMNS: [&str; 5] = ["details_name", "video_file", "mode", "start_time", "end_time"];

/// Header for a set of rows.
pub fn header(rows: &[ResultRow]) -> Vec<String> {
    let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    for row in rows {
        for (region, _) in &row.region_times {
            if !columns[FIXED_COLUMNS.len()..].contains(region) {
                columns.push(region.clone());
            }
        }
    }
    columns
}

pub fn write<W: Write>(writer: W, rows: &[ResultRow]) -> Result<()> {
    let header = header(rows);
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&header)?;
    for row in rows {
        let mut record = vec![
            row.details_name.clone(),
            row.video_file.clone(),
            row.mode.clone(),
            row.start_time.clone(),
            row.end_time.clone(),
        ];
        record.extend(header[FIXED_COLUMNS.len()..].iter().map(|region| {
            row.region_seconds(region)
                .map(format_seconds)
                .unwrap_or_default()
        }));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_file(path: &Path, rows: &[ResultRow]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write(file, rows)?;
    log::info!("Results saved to {}.", path.display());
    Ok(())
}

/// Seconds always carry a decimal point.
fn format_seconds(seconds: f64) -> String {
    let text = seconds.to_string();
    if text.contains(['.', 'e', 'E']) || !seconds.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}
