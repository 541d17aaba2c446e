//! Occupancy classifier.
//!
//! Decides, for one frame, whether the subject is inside each region. The
//! decision reads only that frame's samples, so frames can be classified in
//! any order or in parallel with identical results.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoiError};
use crate::geometry::{GeometryStore, SpaceMapping};
use crate::keypoints::{ExclusionSet, FrameSource, KeypointSample};

/// Minimum likelihood for a contained sample to count in `any_part` mode.
pub const ANY_PART_CONFIDENCE: f64 = 0.99;

/// Default share of tracked body parts required in `majority` mode.
pub const DEFAULT_MAJORITY_FRACTION: f64 = 0.5;

/// Occupancy policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrackingMode {
    /// Occupied when at least `percent` (a fraction in `[0, 1]`) of the
    /// table's body parts lie inside the region.
    Majority { percent: f64 },
    /// Occupied when the designated body part lies inside the region.
    Specific { body_part: String },
    /// Occupied when any confident body part lies inside the region.
    AnyPart,
}

impl TrackingMode {
    /// Majority mode from a whole-number percentage in `[0, 100]`.
    pub fn majority_from_percentage(percentage: f64) -> Result<Self> {
        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return Err(RoiError::config(format!(
                "percent must be between 0 and 100, got {}",
                percentage
            )));
        }
        Ok(Self::Majority {
            percent: percentage / 100.0,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Majority { .. } => "majority",
            Self::Specific { .. } => "specific",
            Self::AnyPart => "any_part",
        }
    }
}

impl Default for TrackingMode {
    fn default() -> Self {
        Self::Majority {
            percent: DEFAULT_MAJORITY_FRACTION,
        }
    }
}

/// Read-only policy input for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Policy {
    pub mode: TrackingMode,
    pub excluded: ExclusionSet,
    pub any_part_confidence: f64,
}

impl Policy {
    pub fn new(mode: TrackingMode) -> Self {
        Self {
            mode,
            excluded: ExclusionSet::new(),
            any_part_confidence: ANY_PART_CONFIDENCE,
        }
    }

    pub fn with_exclusions(mut self, excluded: ExclusionSet) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn with_any_part_confidence(mut self, threshold: f64) -> Self {
        self.any_part_confidence = threshold;
        self
    }

    /// Reject policies that cannot be evaluated.
    pub fn validate(&self) -> Result<()> {
        match &self.mode {
            TrackingMode::Majority { percent } => {
                if !percent.is_finite() || !(0.0..=1.0).contains(percent) {
                    return Err(RoiError::config(format!(
                        "majority fraction must be within [0, 1], got {}",
                        percent
                    )));
                }
            }
            TrackingMode::Specific { body_part } => {
                if body_part.trim().is_empty() {
                    return Err(RoiError::config(
                        "specific mode requires a designated body part",
                    ));
                }
            }
            TrackingMode::AnyPart => {}
        }
        if !(0.0..=1.0).contains(&self.any_part_confidence) {
            return Err(RoiError::config(format!(
                "any_part confidence must be within [0, 1], got {}",
                self.any_part_confidence
            )));
        }
        Ok(())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(TrackingMode::default())
    }
}

/// All body part samples of one frame, in video coordinates.
#[derive(Clone, Debug, Default)]
pub struct FrameSamples<'a> {
    entries: Vec<(&'a str, KeypointSample)>,
}

impl<'a> FrameSamples<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, body_part: &'a str, sample: KeypointSample) -> Self {
        self.insert(body_part, sample);
        self
    }

    pub fn insert(&mut self, body_part: &'a str, sample: KeypointSample) {
        match self.entries.iter_mut().find(|(p, _)| *p == body_part) {
            Some(entry) => entry.1 = sample,
            None => self.entries.push((body_part, sample)),
        }
    }

    /// Read one frame from a source.
    pub fn from_source<S: FrameSource + ?Sized>(source: &'a S, frame: usize) -> Result<Self> {
        let entries = source
            .body_parts()
            .iter()
            .map(|part| source.sample(frame, part).map(|s| (part.as_str(), s)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn get(&self, body_part: &str) -> Option<KeypointSample> {
        self.entries
            .iter()
            .find(|(p, _)| *p == body_part)
            .map(|(_, s)| *s)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-region decision for one frame, in store order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameOccupancy<'s> {
    entries: Vec<(&'s str, bool)>,
}

impl<'s> FrameOccupancy<'s> {
    pub fn get(&self, region: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(name, _)| *name == region)
            .map(|(_, occupied)| *occupied)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'s str, bool)> + '_ {
        self.entries.iter().copied()
    }
}

/// Classify one frame against every region.
pub fn classify<'s>(
    samples: &FrameSamples<'_>,
    regions: &'s GeometryStore,
    policy: &Policy,
    mapping: &SpaceMapping,
) -> FrameOccupancy<'s> {
    let flags = classify_flags(samples, regions, policy, mapping);
    FrameOccupancy {
        entries: regions.names().zip(flags).collect(),
    }
}

struct Candidate<'a> {
    body_part: &'a str,
    x: f64,
    y: f64,
    confidence: f64,
}

/// Decisions aligned with `regions.regions()`.
pub(crate) fn classify_flags(
    samples: &FrameSamples<'_>,
    regions: &GeometryStore,
    policy: &Policy,
    mapping: &SpaceMapping,
) -> Vec<bool> {
    // Denominator counts every body part in the table, excluded or not.
    let tracked = samples.len();
    let active = samples
        .entries
        .iter()
        .filter(|(part, _)| !policy.excluded.contains(part))
        .count();
    let candidates: Vec<Candidate<'_>> = samples
        .entries
        .iter()
        .filter(|(part, sample)| !policy.excluded.contains(part) && sample.is_visible())
        .map(|(part, sample)| {
            let (x, y) = mapping.apply(sample.x, sample.y);
            Candidate {
                body_part: *part,
                x,
                y,
                confidence: sample.confidence,
            }
        })
        .collect();

    regions
        .regions()
        .iter()
        .map(|named| {
            let region = &named.region;
            match &policy.mode {
                TrackingMode::Majority { percent } => {
                    if active == 0 {
                        return false;
                    }
                    let inside = candidates
                        .iter()
                        .filter(|c| region.contains(c.x, c.y))
                        .count();
                    inside as f64 >= percent * tracked as f64
                }
                TrackingMode::Specific { body_part } => candidates
                    .iter()
                    .find(|c| c.body_part == body_part)
                    .map_or(false, |c| region.contains(c.x, c.y)),
                TrackingMode::AnyPart => candidates.iter().any(|c| {
                    c.confidence >= policy.any_part_confidence && region.contains(c.x, c.y)
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Region, Size};

    fn left_half() -> GeometryStore {
        let mut store = GeometryStore::new();
        store.add_or_merge(
            "left",
            Region::polygon(&[[0.0, 0.0], [50.0, 0.0], [50.0, 100.0], [0.0, 100.0]]).unwrap(),
        );
        store
    }

    fn inside() -> KeypointSample {
        KeypointSample::new(25.0, 50.0, 1.0)
    }

    fn outside() -> KeypointSample {
        KeypointSample::new(75.0, 50.0, 1.0)
    }

    fn majority(percent: f64, excluded: &[&str]) -> Policy {
        Policy::new(TrackingMode::Majority { percent })
            .with_exclusions(excluded.iter().copied().collect())
    }

    /// Four parts, `d` excluded, the first `m` of a..c inside.
    fn four_parts(m: usize) -> FrameSamples<'static> {
        let parts = ["a", "b", "c"];
        let mut samples = FrameSamples::new().with("d", inside());
        for (i, part) in parts.iter().enumerate() {
            samples.insert(*part, if i < m { inside() } else { outside() });
        }
        samples
    }

    #[test]
    fn majority_denominator_counts_excluded_parts() {
        let store = left_half();
        let id = SpaceMapping::identity();
        let policy = majority(0.5, &["d"]);
        let occupied = |m| classify(&four_parts(m), &store, &policy, &id).get("left");
        assert_eq!(occupied(0), Some(false));
        assert_eq!(occupied(1), Some(false));
        assert_eq!(occupied(2), Some(true));
        assert_eq!(occupied(3), Some(true));

        // 0.6 * 4 = 2.4, while 0.6 * 3 would be 1.8
        let policy = majority(0.6, &["d"]);
        assert_eq!(classify(&four_parts(2), &store, &policy, &id).get("left"), Some(false));
        assert_eq!(classify(&four_parts(3), &store, &policy, &id).get("left"), Some(true));
    }

    #[test]
    fn majority_with_everything_excluded_is_never_occupied() {
        let store = left_half();
        let samples = FrameSamples::new().with("a", inside()).with("b", inside());
        let policy = majority(0.0, &["a", "b"]);
        let result = classify(&samples, &store, &policy, &SpaceMapping::identity());
        assert_eq!(result.get("left"), Some(false));
    }

    #[test]
    fn nan_samples_are_ignored() {
        let store = left_half();
        let samples = FrameSamples::new()
            .with("a", KeypointSample::missing())
            .with("b", inside());
        let result = classify(&samples, &store, &majority(1.0, &[]), &SpaceMapping::identity());
        assert_eq!(result.get("left"), Some(false));
        let result = classify(&samples, &store, &majority(0.5, &[]), &SpaceMapping::identity());
        assert_eq!(result.get("left"), Some(true));
    }

    #[test]
    fn any_part_threshold_is_inclusive() {
        let store = left_half();
        let id = SpaceMapping::identity();
        let policy = Policy::new(TrackingMode::AnyPart);
        let at = FrameSamples::new().with("a", KeypointSample::new(25.0, 50.0, 0.99));
        let below = FrameSamples::new().with("a", KeypointSample::new(25.0, 50.0, 0.989999));
        assert_eq!(classify(&at, &store, &policy, &id).get("left"), Some(true));
        assert_eq!(classify(&below, &store, &policy, &id).get("left"), Some(false));
    }

    #[test]
    fn any_part_ignores_confident_parts_outside() {
        let store = left_half();
        let samples = FrameSamples::new()
            .with("a", KeypointSample::new(25.0, 50.0, 0.5))
            .with("b", outside());
        let policy = Policy::new(TrackingMode::AnyPart);
        let result = classify(&samples, &store, &policy, &SpaceMapping::identity());
        assert_eq!(result.get("left"), Some(false));
    }

    #[test]
    fn specific_ignores_confidence_but_honours_exclusion() {
        let store = left_half();
        let id = SpaceMapping::identity();
        let samples = FrameSamples::new()
            .with("nose", KeypointSample::new(25.0, 50.0, 0.01))
            .with("tail", outside());
        let policy = Policy::new(TrackingMode::Specific {
            body_part: "nose".to_string(),
        });
        assert_eq!(classify(&samples, &store, &policy, &id).get("left"), Some(true));

        let excluded = policy.clone().with_exclusions(["nose"].into_iter().collect());
        assert_eq!(classify(&samples, &store, &excluded, &id).get("left"), Some(false));

        let absent = Policy::new(TrackingMode::Specific {
            body_part: "ear".to_string(),
        });
        assert_eq!(classify(&samples, &store, &absent, &id).get("left"), Some(false));
    }

    #[test]
    fn samples_are_mapped_into_canvas_space() {
        let store = left_half();
        // (150, 100) in a 400x200 video is (37.5, 50) on a 100x100 canvas
        let mapping = SpaceMapping::new(Size::new(400.0, 200.0), Size::new(100.0, 100.0)).unwrap();
        let samples = FrameSamples::new().with("a", KeypointSample::new(150.0, 100.0, 1.0));
        let result = classify(&samples, &store, &majority(1.0, &[]), &mapping);
        assert_eq!(result.get("left"), Some(true));
        let unmapped = classify(&samples, &store, &majority(1.0, &[]), &SpaceMapping::identity());
        assert_eq!(unmapped.get("left"), Some(false));
    }

    #[test]
    fn classification_is_deterministic() {
        let store = left_half();
        let samples = four_parts(2);
        let policy = majority(0.5, &["d"]);
        let id = SpaceMapping::identity();
        assert_eq!(
            classify(&samples, &store, &policy, &id),
            classify(&samples, &store, &policy, &id)
        );
    }

    #[test]
    fn policy_validation() {
        assert!(majority(1.5, &[]).validate().unwrap_err().is_config());
        assert!(Policy::new(TrackingMode::Specific {
            body_part: " ".to_string()
        })
        .validate()
        .is_err());
        assert!(TrackingMode::majority_from_percentage(101.0).is_err());
        assert_eq!(
            TrackingMode::majority_from_percentage(50.0).unwrap(),
            TrackingMode::Majority { percent: 0.5 }
        );
    }

    #[test]
    fn mode_serializes_with_tag() {
        let json = serde_json::to_string(&TrackingMode::AnyPart).unwrap();
        assert_eq!(json, r#"{"mode":"any_part"}"#);
        let mode: TrackingMode =
            serde_json::from_str(r#"{"mode":"specific","body_part":"nose"}"#).unwrap();
        assert_eq!(mode.name(), "specific");
    }
}
