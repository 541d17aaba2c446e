//! Hierarchical binary tracking tables.
//!
//! The export is a pandas fixed-format frame stored in the group
//! [`HDF5_DATASET_KEY`]:
//! - `axis0_level{n}` holds the unique labels of column level `n` and
//!   `axis0_label{n}` the per-column codes into them, for the three levels
//!   `scorer`, `bodyparts` and `coords`
//! - `axis1` is the frame index
//! - `block0_values` is one `(frames, columns)` float matrix, row-major
//!
//! Negative codes stand for a missing label; such columns are skipped.

use std::path::Path;

use hdf5::types::FixedAscii;
use hdf5::Group;

use super::columns::ColumnLayout;
use super::loader::HDF5_DATASET_KEY;
use super::KeypointTable;
use crate::error::{Result, RoiError};

const COLUMN_LEVELS: usize = 3;
const LABEL_WIDTH: usize = 256;

pub fn read_path(path: &Path) -> Result<KeypointTable> {
    let file = hdf5::File::open(path)?;
    let frame = file.group(HDF5_DATASET_KEY)?;
    read_group(&frame)
}

pub fn read_group(frame: &Group) -> Result<KeypointTable> {
    if frame.link_exists("block1_values") {
        return Err(RoiError::InvalidTable(
            "expected one float block, found several".to_string(),
        ));
    }
    if frame.link_exists(&format!("axis0_level{}", COLUMN_LEVELS)) {
        return Err(RoiError::InvalidTable(format!(
            "expected {} column levels, found more",
            COLUMN_LEVELS
        )));
    }
    let levels = (0..COLUMN_LEVELS)
        .map(|level| column_level(frame, level))
        .collect::<Result<Vec<_>>>()?;
    let width = levels[0].len();
    if levels.iter().any(|l| l.len() != width) {
        return Err(RoiError::InvalidTable(
            "column levels have different lengths".to_string(),
        ));
    }
    let layout = ColumnLayout::resolve(
        (0..width).map(|col| (col, levels[1][col].as_str(), levels[2][col].as_str())),
    )?;

    let block = frame.dataset("block0_values")?;
    let &[rows, cols] = block.shape().as_slice() else {
        return Err(RoiError::InvalidTable(
            "value block is not two-dimensional".to_string(),
        ));
    };
    if cols != width {
        return Err(RoiError::InvalidTable(format!(
            "value block has {} columns, labels describe {}",
            cols, width
        )));
    }
    let values: Vec<f64> = block.read_raw()?;
    let index = frame_index(frame, rows);

    let mut table = KeypointTable::new(&layout.parts)?;
    for (row, frame_no) in values.chunks_exact(cols.max(1)).zip(index) {
        table.push_frame(frame_no, layout.samples(|col| row[col]))?;
    }

    log::debug!(
        "loaded tracking table: {} body parts, {} frames",
        table.body_parts.len(),
        table.frames.len()
    );
    Ok(table)
}

fn column_level(frame: &Group, level: usize) -> Result<Vec<String>> {
    let labels: Vec<FixedAscii<LABEL_WIDTH>> = frame
        .dataset(&format!("axis0_level{}", level))?
        .read_raw()?;
    let labels: Vec<String> = labels
        .iter()
        .map(|l| String::from_utf8_lossy(l.as_bytes()).into_owned())
        .collect();
    let codes: Vec<i64> = frame
        .dataset(&format!("axis0_label{}", level))?
        .read_raw()?;
    codes
        .into_iter()
        .map(|code| match usize::try_from(code) {
            Err(_) => Ok(String::new()),
            Ok(code) => labels.get(code).cloned().ok_or_else(|| {
                RoiError::InvalidTable(format!(
                    "column level {} refers to label {} of {}",
                    level,
                    code,
                    labels.len()
                ))
            }),
        })
        .collect()
}

/// Frame numbers from `axis1`, or row positions when it is absent or not a
/// non-negative integer index.
fn frame_index(frame: &Group, rows: usize) -> Vec<usize> {
    let index = frame
        .dataset("axis1")
        .and_then(|axis| axis.read_raw::<i64>())
        .ok()
        .filter(|index| index.len() == rows)
        .and_then(|index| {
            index
                .into_iter()
                .map(|i| usize::try_from(i).ok())
                .collect::<Option<Vec<_>>>()
        });
    index.unwrap_or_else(|| {
        log::debug!("no integer frame index; using row positions");
        (0..rows).collect()
    })
}
