//! Batch job runner.
//!
//! Replays saved job descriptors one after another. Each job rebuilds its own
//! regions, tracking table and policy from the descriptor, so results depend
//! only on the descriptor and the referenced files. A job that fails is
//! skipped with a logged reason; only cancellation stops the batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::aggregate::{CancelToken, FrameRange, ProgressSink, Segment, SegmentAggregator};
use crate::classify::{Policy, TrackingMode, ANY_PART_CONFIDENCE};
use crate::error::{Result, RoiError};
use crate::geometry::{GeometryStore, Size, SpaceMapping};
use crate::keypoints::{verify_frames, ExclusionSet, TableLoader};
use crate::regions;
use crate::video::VideoProbe;

/// Snapshot of one analysis, replayable later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub video_path: String,
    pub tracking_path: PathBuf,
    pub start_frame: usize,
    pub end_frame: usize,
    /// Region document in canvas coordinates, as written by [`regions::to_value`].
    pub regions: Value,
    #[serde(default)]
    pub excluded_body_parts: ExclusionSet,
    pub mode: TrackingMode,
}

impl JobDescriptor {
    /// Capture the current state. Rejects an empty name or region set.
    pub fn capture(
        name: &str,
        video_path: &str,
        tracking_path: &Path,
        range: FrameRange,
        regions: &GeometryStore,
        excluded_body_parts: ExclusionSet,
        mode: TrackingMode,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RoiError::config("job name is empty"));
        }
        if regions.is_empty() {
            return Err(RoiError::config("no regions defined"));
        }
        Ok(Self {
            name: name.to_string(),
            video_path: video_path.to_string(),
            tracking_path: tracking_path.to_path_buf(),
            start_frame: range.start(),
            end_frame: range.end(),
            regions: regions::to_value(regions),
            excluded_body_parts,
            mode,
        })
    }

    pub fn range(&self) -> Result<FrameRange> {
        FrameRange::new(self.start_frame, self.end_frame)
    }

    pub fn geometry(&self) -> Result<GeometryStore> {
        let mut store = GeometryStore::new();
        regions::load_value_into(&mut store, &self.regions)?;
        Ok(store)
    }

    pub fn policy(&self, any_part_confidence: f64) -> Policy {
        Policy::new(self.mode.clone())
            .with_exclusions(self.excluded_body_parts.clone())
            .with_any_part_confidence(any_part_confidence)
    }

    pub fn video_file_name(&self) -> &str {
        Path::new(&self.video_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.video_path)
    }

    /// One-line listing: `name: video, start - end`. Times are shown when the
    /// frame rate is known, frame numbers otherwise.
    pub fn summary(&self, fps: Option<f64>) -> String {
        let (start, end) = match fps.filter(|f| f.is_finite() && *f > 0.0) {
            Some(fps) => (
                frame_to_time(self.start_frame, fps),
                frame_to_time(self.end_frame, fps),
            ),
            None => (self.start_frame.to_string(), self.end_frame.to_string()),
        };
        format!("{}: {}, {} - {}", self.name, self.video_file_name(), start, end)
    }
}

/// `HH:MM:SS` for a frame index, truncating fractional seconds.
pub fn frame_to_time(frame: usize, fps: f64) -> String {
    let total = (frame as f64 / fps).max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Output of one processed job.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRow {
    pub details_name: String,
    pub video_file: String,
    pub mode: String,
    pub start_time: String,
    pub end_time: String,
    /// Seconds per region, in the job's region order.
    pub region_times: Vec<(String, f64)>,
}

impl ResultRow {
    pub fn region_seconds(&self, region: &str) -> Option<f64> {
        self.region_times
            .iter()
            .find(|(name, _)| name == region)
            .map(|(_, seconds)| *seconds)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkippedJob {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// One row per processed job, in descriptor order.
    pub rows: Vec<ResultRow>,
    pub skipped: Vec<SkippedJob>,
}

pub struct BatchRunner<'a> {
    loader: &'a dyn TableLoader,
    probe: &'a dyn VideoProbe,
    canvas: Size,
    aggregator: SegmentAggregator,
    any_part_confidence: f64,
}

impl<'a> BatchRunner<'a> {
    /// `canvas` is the space the descriptors' regions were drawn in.
    pub fn new(loader: &'a dyn TableLoader, probe: &'a dyn VideoProbe, canvas: Size) -> Self {
        Self {
            loader,
            probe,
            canvas,
            aggregator: SegmentAggregator::default(),
            any_part_confidence: ANY_PART_CONFIDENCE,
        }
    }

    pub fn with_aggregator(mut self, aggregator: SegmentAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_any_part_confidence(mut self, threshold: f64) -> Self {
        self.any_part_confidence = threshold;
        self
    }

    pub fn run(
        &self,
        jobs: &[JobDescriptor],
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for (index, job) in jobs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(RoiError::Cancelled);
            }
            match self.run_job(job, progress, cancel) {
                Ok(row) => report.rows.push(row),
                Err(RoiError::Cancelled) => return Err(RoiError::Cancelled),
                Err(err) => {
                    log::warn!("skipping job {} ('{}'): {}", index + 1, job.name, err);
                    report.skipped.push(SkippedJob {
                        index,
                        name: job.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        log::info!(
            "batch finished: {} processed, {} skipped",
            report.rows.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Process one descriptor.
    pub fn run_job(
        &self,
        job: &JobDescriptor,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ResultRow> {
        let video = self.probe.probe(&job.video_path)?;
        let range = job.range()?;
        range.check_within(video.total_frames)?;
        let table = self.loader.load(&job.tracking_path)?;
        verify_frames(&table, video.total_frames);

        let store = job.geometry()?;
        let policy = job.policy(self.any_part_confidence);
        let segment = Segment {
            range,
            policy: &policy,
            mapping: SpaceMapping::new(video.size(), self.canvas)?,
            frame_duration: video.frame_duration(),
        };
        log::debug!(
            "job '{}': {} regions, mode {}, frames {}..={}",
            job.name,
            store.len(),
            job.mode.name(),
            job.start_frame,
            job.end_frame
        );
        let times = self.aggregator.run(&table, &store, &segment, progress, cancel)?;

        Ok(ResultRow {
            details_name: job.name.clone(),
            video_file: job.video_path.clone(),
            mode: job.mode.name().to_string(),
            start_time: frame_to_time(job.start_frame, video.fps),
            end_time: frame_to_time(job.end_frame, video.fps),
            region_times: times.pairs().map(|(n, s)| (n.to_string(), s)).collect(),
        })
    }
}
