//! Segment aggregator.
//!
//! Drives the classifier over an inclusive frame range for every region and
//! turns occupied-frame counts into seconds. Counters are built fresh on every
//! run; nothing carries over between runs.
//!
//! Frames are processed in chunks of `progress_every`. Inside a chunk frames
//! may be classified on the rayon pool; counts are plain integer sums, so the
//! result does not depend on scheduling. The cancellation flag is checked
//! before each frame.
//!
//! A run borrows the geometry store immutably for its whole lifetime, which
//! keeps region mutation (merge, clear) out of an in-flight run.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::classify::{classify_flags, FrameSamples, Policy, TrackingMode};
use crate::error::{Result, RoiError};
use crate::geometry::{GeometryStore, SpaceMapping};
use crate::keypoints::FrameSource;

/// Frames between progress notifications.
pub const DEFAULT_PROGRESS_EVERY: usize = 50;

/// Inclusive frame range with `start < end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRange {
    start: usize,
    end: usize,
}

impl FrameRange {
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start >= end {
            return Err(RoiError::config(format!(
                "start frame ({}) must be before end frame ({})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of frames in the range, saturating at `usize::MAX`.
    pub(crate) fn len(&self) -> usize {
        (self.end - self.start).saturating_add(1)
    }

    /// Reject a range that runs past the last frame of the video.
    pub fn check_within(&self, total_frames: usize) -> Result<()> {
        if self.end >= total_frames {
            return Err(RoiError::config(format!(
                "end frame ({}) is past the last frame of the video ({} frames)",
                self.end, total_frames
            )));
        }
        Ok(())
    }

    pub fn contains(&self, frame: usize) -> bool {
        (self.start..=self.end).contains(&frame)
    }
}

/// Receives progress for one run: `start`, then non-decreasing `advance`
/// calls ending at `total`, then `finish`.
pub trait ProgressSink {
    fn start(&mut self, total: usize);
    fn advance(&mut self, current: usize);
    fn finish(&mut self);
}

/// Sink that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&mut self, _total: usize) {}
    fn advance(&mut self, _current: usize) {}
    fn finish(&mut self) {}
}

/// Cooperative cancellation flag shared between a run and its caller.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Occupancy total for one region.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionTime {
    pub name: String,
    pub frames: usize,
    pub seconds: f64,
}

/// Per-region totals of one run, in store order. Every region has an entry,
/// including regions that were never occupied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionTimes {
    entries: Vec<RegionTime>,
}

impl RegionTimes {
    pub fn seconds(&self, region: &str) -> Option<f64> {
        self.get(region).map(|t| t.seconds)
    }

    pub fn frames(&self, region: &str) -> Option<usize> {
        self.get(region).map(|t| t.frames)
    }

    pub fn get(&self, region: &str) -> Option<&RegionTime> {
        self.entries.iter().find(|t| t.name == region)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegionTime> {
        self.entries.iter()
    }

    /// `(name, seconds)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|t| (t.name.as_str(), t.seconds))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Policy and timing for one run over one segment.
#[derive(Clone, Debug)]
pub struct Segment<'a> {
    pub range: FrameRange,
    pub policy: &'a Policy,
    /// Video coordinates into the regions' coordinate space.
    pub mapping: SpaceMapping,
    /// Seconds per frame, `1 / fps`.
    pub frame_duration: f64,
}

#[derive(Clone, Debug)]
pub struct SegmentAggregator {
    progress_every: usize,
    parallel: bool,
}

impl Default for SegmentAggregator {
    fn default() -> Self {
        Self {
            progress_every: DEFAULT_PROGRESS_EVERY,
            parallel: true,
        }
    }
}

impl SegmentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress_every(mut self, frames: usize) -> Self {
        self.progress_every = frames.max(1);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Classify every frame of the segment and total the occupied time.
    ///
    /// Configuration problems are reported before the first frame. On
    /// cancellation the partial counts are dropped.
    pub fn run(
        &self,
        source: &dyn FrameSource,
        regions: &GeometryStore,
        segment: &Segment<'_>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<RegionTimes> {
        validate(source, regions, segment)?;

        let range = segment.range;
        let total = range.len();
        let mut counts = vec![0usize; regions.len()];
        let mut processed = 0usize;

        progress.start(total);
        let mut chunk_start = range.start();
        loop {
            let chunk_end = range
                .end()
                .min(chunk_start.saturating_add(self.progress_every - 1));
            let chunk = chunk_start..=chunk_end;

            let flags: Vec<Vec<bool>> = if self.parallel {
                chunk
                    .into_par_iter()
                    .map(|frame| classify_frame(source, regions, segment, cancel, frame))
                    .collect::<Result<_>>()?
            } else {
                chunk
                    .map(|frame| classify_frame(source, regions, segment, cancel, frame))
                    .collect::<Result<_>>()?
            };
            for frame_flags in &flags {
                for (count, occupied) in counts.iter_mut().zip(frame_flags) {
                    if *occupied {
                        *count += 1;
                    }
                }
            }

            processed = processed.saturating_add((chunk_end - chunk_start).saturating_add(1));
            progress.advance(processed);
            if chunk_end == range.end() {
                break;
            }
            chunk_start = chunk_end + 1;
        }
        progress.finish();

        let entries: Vec<RegionTime> = regions
            .names()
            .zip(counts)
            .map(|(name, frames)| RegionTime {
                name: name.to_string(),
                frames,
                seconds: frames as f64 * segment.frame_duration,
            })
            .collect();
        for t in &entries {
            log::info!("Total frames in shape '{}': {}", t.name, t.frames);
            log::info!("Total time in shape '{}': {:.2} seconds", t.name, t.seconds);
        }
        Ok(RegionTimes { entries })
    }
}

fn validate(source: &dyn FrameSource, regions: &GeometryStore, segment: &Segment<'_>) -> Result<()> {
    if regions.is_empty() {
        return Err(RoiError::config("no regions defined"));
    }
    segment.policy.validate()?;
    if !segment.frame_duration.is_finite() || segment.frame_duration <= 0.0 {
        return Err(RoiError::config(format!(
            "frame duration must be positive, got {}",
            segment.frame_duration
        )));
    }
    if let TrackingMode::Specific { body_part } = &segment.policy.mode {
        if !source.body_parts().iter().any(|p| p == body_part) {
            log::warn!(
                "designated body part '{}' is not in the tracking table; no frame will be occupied",
                body_part
            );
        }
    }
    Ok(())
}

fn classify_frame(
    source: &dyn FrameSource,
    regions: &GeometryStore,
    segment: &Segment<'_>,
    cancel: &CancelToken,
    frame: usize,
) -> Result<Vec<bool>> {
    if cancel.is_cancelled() {
        return Err(RoiError::Cancelled);
    }
    if !source.has_frame(frame) {
        return Ok(vec![false; regions.len()]);
    }
    let samples = FrameSamples::from_source(source, frame)?;
    Ok(classify_flags(
        &samples,
        regions,
        segment.policy,
        &segment.mapping,
    ))
}
