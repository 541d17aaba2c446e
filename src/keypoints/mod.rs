//! Keypoint frame sources.
//!
//! A tracking table holds, for every frame and body part, the `(x, y,
//! likelihood)` triple produced by the pose-estimation pipeline. Values the
//! pipeline did not detect are NaN and mean "not observed"; they are never
//! errors.
//!
//! Body parts are fixed for the lifetime of a table. The placeholder label
//! [`RESERVED_BODY_PART_LABEL`] comes from the header of the frame index
//! column and is stripped once, at load time.

mod columns;
pub mod csv_table;
#[cfg(feature = "tracking-hdf5")]
pub mod hdf5_table;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, RoiError};

pub use loader::{load_tracking_table, FileTableLoader, TableLoader, TrackingFormat};

/// Header artifact that is never a real body part.
pub const RESERVED_BODY_PART_LABEL: &str = "bodyparts";

/// One body part in one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeypointSample {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl KeypointSample {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    pub fn missing() -> Self {
        Self::new(f64::NAN, f64::NAN, f64::NAN)
    }

    /// Both coordinates present.
    pub fn is_visible(&self) -> bool {
        !self.x.is_nan() && !self.y.is_nan()
    }
}

/// Random access to per-frame, per-body-part keypoints.
pub trait FrameSource: Sync {
    /// Body part names, reserved label excluded.
    fn body_parts(&self) -> &[String];

    /// Sample for a frame. Unknown body parts are an error, absent frames and
    /// absent values come back as NaN.
    fn sample(&self, frame: usize, body_part: &str) -> Result<KeypointSample>;

    /// Number of rows in the table.
    fn frame_count(&self) -> usize;

    fn has_frame(&self, frame: usize) -> bool;

    /// Frame indices in `[0, expected_total)` that have no row.
    fn missing_frames(&self, expected_total: usize) -> Vec<usize> {
        (0..expected_total).filter(|f| !self.has_frame(*f)).collect()
    }
}

/// In-memory tracking table.
#[derive(Clone, Debug, Default)]
pub struct KeypointTable {
    body_parts: Vec<String>,
    column_of: HashMap<String, usize>,
    frames: Vec<usize>,
    row_of: HashMap<usize, usize>,
    values: Vec<KeypointSample>,
}

impl KeypointTable {
    /// Empty table with the given body part columns. The reserved label is
    /// dropped; duplicate names are rejected.
    pub fn new<S: AsRef<str>>(body_parts: &[S]) -> Result<Self> {
        let mut table = Self::default();
        for part in body_parts {
            let part = part.as_ref();
            if part == RESERVED_BODY_PART_LABEL {
                continue;
            }
            if table.column_of.contains_key(part) {
                return Err(RoiError::InvalidTable(format!(
                    "duplicate body part column '{}'",
                    part
                )));
            }
            table.column_of.insert(part.to_string(), table.body_parts.len());
            table.body_parts.push(part.to_string());
        }
        Ok(table)
    }

    /// Append one row. `samples` follows the order of `body_parts()`.
    pub fn push_frame(&mut self, frame: usize, samples: Vec<KeypointSample>) -> Result<()> {
        if samples.len() != self.body_parts.len() {
            return Err(RoiError::InvalidTable(format!(
                "frame {} has {} samples, expected {}",
                frame,
                samples.len(),
                self.body_parts.len()
            )));
        }
        if self.row_of.contains_key(&frame) {
            return Err(RoiError::InvalidTable(format!(
                "frame {} appears more than once",
                frame
            )));
        }
        self.row_of.insert(frame, self.frames.len());
        self.frames.push(frame);
        self.values.extend(samples);
        Ok(())
    }

    /// Frame indices in row order.
    pub fn frames(&self) -> &[usize] {
        &self.frames
    }
}

impl FrameSource for KeypointTable {
    fn body_parts(&self) -> &[String] {
        &self.body_parts
    }

    fn sample(&self, frame: usize, body_part: &str) -> Result<KeypointSample> {
        let column = *self
            .column_of
            .get(body_part)
            .ok_or_else(|| RoiError::MissingColumn {
                body_part: body_part.to_string(),
            })?;
        let Some(row) = self.row_of.get(&frame) else {
            return Ok(KeypointSample::missing());
        };
        Ok(self.values[row * self.body_parts.len() + column])
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn has_frame(&self, frame: usize) -> bool {
        self.row_of.contains_key(&frame)
    }
}

/// Advisory verification pass: log frames of the video that the table lacks.
pub fn verify_frames(source: &dyn FrameSource, expected_total: usize) -> Vec<usize> {
    let missing = source.missing_frames(expected_total);
    if missing.is_empty() {
        log::info!("All frames are present in the file.");
    } else {
        log::warn!("Missing frames in file: {:?}", missing);
    }
    missing
}

/// Body part names with the reserved label removed.
pub fn clean_body_parts<'a, I>(parts: I) -> BTreeSet<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .filter(|p| *p != RESERVED_BODY_PART_LABEL)
        .collect()
}

/// Body parts ignored during classification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet(BTreeSet<String>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, body_part: impl Into<String>) -> bool {
        self.0.insert(body_part.into())
    }

    pub fn contains(&self, body_part: &str) -> bool {
        self.0.contains(body_part)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Exclusions to use after loading a new table: the previous ones when the
    /// body part sets match, nothing otherwise.
    pub fn carry_over<S: AsRef<str>>(
        previous_parts: &[S],
        new_parts: &[S],
        previous: &ExclusionSet,
    ) -> ExclusionSet {
        let before = clean_body_parts(previous_parts.iter().map(AsRef::as_ref));
        let after = clean_body_parts(new_parts.iter().map(AsRef::as_ref));
        let matches = before == after;
        log::debug!("Body parts match: {}", matches);
        if matches {
            previous.clone()
        } else {
            ExclusionSet::new()
        }
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> KeypointTable {
        let mut table = KeypointTable::new(&["bodyparts", "nose", "tail"]).unwrap();
        table
            .push_frame(
                0,
                vec![
                    KeypointSample::new(1.0, 2.0, 0.9),
                    KeypointSample::missing(),
                ],
            )
            .unwrap();
        table
            .push_frame(
                2,
                vec![
                    KeypointSample::new(3.0, 4.0, 0.8),
                    KeypointSample::new(5.0, 6.0, 0.7),
                ],
            )
            .unwrap();
        table
    }

    #[test]
    fn reserved_label_is_stripped() {
        assert_eq!(table().body_parts(), &["nose".to_string(), "tail".to_string()]);
    }

    #[test]
    fn unknown_body_part_is_missing_column() {
        let err = table().sample(0, "ear").unwrap_err();
        assert!(matches!(err, RoiError::MissingColumn { ref body_part } if body_part == "ear"));
    }

    #[test]
    fn absent_values_are_nan_not_errors() {
        let t = table();
        assert!(!t.sample(0, "tail").unwrap().is_visible());
        assert!(!t.sample(1, "nose").unwrap().is_visible());
        assert_eq!(t.sample(2, "tail").unwrap(), KeypointSample::new(5.0, 6.0, 0.7));
    }

    #[test]
    fn missing_frames_lists_gaps_and_truncation() {
        let t = table();
        assert_eq!(t.frame_count(), 2);
        assert_eq!(verify_frames(&t, 5), vec![1, 3, 4]);
    }

    #[test]
    fn duplicate_frame_is_rejected() {
        let mut t = table();
        let err = t
            .push_frame(0, vec![KeypointSample::missing(), KeypointSample::missing()])
            .unwrap_err();
        assert!(matches!(err, RoiError::InvalidTable(_)));
    }

    #[test]
    fn exclusions_carry_over_only_for_identical_parts() {
        let previous: ExclusionSet = ["tail"].into_iter().collect();
        let kept = ExclusionSet::carry_over(
            &["bodyparts", "nose", "tail"],
            &["tail", "nose"],
            &previous,
        );
        assert_eq!(kept, previous);

        let reset = ExclusionSet::carry_over(&["nose", "tail"], &["nose", "ear"], &previous);
        assert!(reset.is_empty());
    }
}
