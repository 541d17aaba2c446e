//! Region-of-interest occupancy engine
//!
//! Measures how long a tracked animal spends inside named polygon regions,
//! given per-frame body-part keypoints from a pose-estimation pipeline.
//!
//! # Architecture
//!
//! Data flows leaf first:
//!
//! 1. **Geometry store** (`geometry`, `regions`): named polygon or multipolygon
//!    regions in canvas space, with union-on-name-collision.
//! 2. **Keypoint frame source** (`keypoints`): random access to
//!    `(x, y, likelihood)` per frame and body part.
//! 3. **Occupancy classifier** (`classify`): per-frame in/out decision under a
//!    `majority`, `specific` or `any_part` policy.
//! 4. **Segment aggregator** (`aggregate`): drives the classifier over a frame
//!    range and turns occupied frames into seconds.
//! 5. **Batch runner** (`batch`, `jobs`, `export`): replays saved jobs and
//!    writes one CSV row per processed job.
//!
//! Video access (`video`) and the movement summary (`movement`) sit beside
//! the pipeline. Nothing in the engine reads ambient state: every run takes
//! its regions, frame source and policy as arguments.

pub mod aggregate;
pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod jobs;
pub mod keypoints;
pub mod movement;
pub mod regions;
pub mod video;

pub use aggregate::{
    CancelToken, FrameRange, NoProgress, ProgressSink, RegionTime, RegionTimes, Segment,
    SegmentAggregator,
};
pub use batch::{frame_to_time, BatchReport, BatchRunner, JobDescriptor, ResultRow, SkippedJob};
pub use classify::{classify, FrameOccupancy, FrameSamples, Policy, TrackingMode};
pub use error::{Result, RoiError};
pub use geometry::{GeometryStore, MergeOutcome, NamedRegion, Region, Size, SpaceMapping};
pub use jobs::{InMemoryJobStore, JobStore, SqliteJobStore};
pub use keypoints::{
    load_tracking_table, ExclusionSet, FileTableLoader, FrameSource, KeypointSample,
    KeypointTable, TableLoader,
};
pub use video::{FileVideoProbe, VideoFile, VideoMetadata, VideoProbe};
