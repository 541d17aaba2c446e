//! `(body part, channel)` column keys resolved to sample columns.

use super::{KeypointSample, RESERVED_BODY_PART_LABEL};
use crate::error::{Result, RoiError};

#[derive(Default)]
struct PartColumns {
    x: Option<usize>,
    y: Option<usize>,
    likelihood: Option<usize>,
}

/// Body parts in first-seen order, each with its x, y and likelihood column.
pub(crate) struct ColumnLayout {
    pub(crate) parts: Vec<String>,
    columns: Vec<[usize; 3]>,
}

impl ColumnLayout {
    /// Build from `(column, body part, channel)` keys. The reserved label and
    /// empty part names are skipped; unknown channels are ignored.
    pub(crate) fn resolve<'a, I>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, &'a str, &'a str)>,
    {
        let mut parts: Vec<String> = Vec::new();
        let mut found: Vec<PartColumns> = Vec::new();
        for (col, part, channel) in keys {
            let part = part.trim();
            if part == RESERVED_BODY_PART_LABEL || part.is_empty() {
                continue;
            }
            let idx = match parts.iter().position(|p| p == part) {
                Some(idx) => idx,
                None => {
                    parts.push(part.to_string());
                    found.push(PartColumns::default());
                    parts.len() - 1
                }
            };
            match channel.trim() {
                "x" => found[idx].x = Some(col),
                "y" => found[idx].y = Some(col),
                "likelihood" => found[idx].likelihood = Some(col),
                other => log::debug!("ignoring column ({}, {}) with unknown channel", part, other),
            }
        }

        let mut columns = Vec::with_capacity(parts.len());
        for (part, cols) in parts.iter().zip(found.iter()) {
            match (cols.x, cols.y, cols.likelihood) {
                (Some(x), Some(y), Some(l)) => columns.push([x, y, l]),
                _ => {
                    return Err(RoiError::InvalidTable(format!(
                        "body part '{}' lacks one of the x, y, likelihood columns",
                        part
                    )))
                }
            }
        }
        Ok(Self { parts, columns })
    }

    /// One row's samples in body part order, reading cells through `cell`.
    pub(crate) fn samples(&self, cell: impl Fn(usize) -> f64) -> Vec<KeypointSample> {
        self.columns
            .iter()
            .map(|&[x, y, l]| KeypointSample::new(cell(x), cell(y), cell(l)))
            .collect()
    }
}
