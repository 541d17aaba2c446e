use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::aggregate::{SegmentAggregator, DEFAULT_PROGRESS_EVERY};
use crate::classify::{TrackingMode, ANY_PART_CONFIDENCE};
use crate::geometry::Size;
use crate::movement::MOVEMENT_CONFIDENCE;

const DEFAULT_CANVAS_WIDTH: f64 = 960.0;
const DEFAULT_CANVAS_HEIGHT: f64 = 540.0;
const DEFAULT_PERCENT: f64 = 50.0;
const DEFAULT_JOBS_DB: &str = "roi_jobs.db";

#[derive(Debug, Deserialize, Default)]
struct RoiConfigFile {
    canvas: Option<CanvasConfigFile>,
    tracking: Option<TrackingConfigFile>,
    progress: Option<ProgressConfigFile>,
    jobs: Option<JobsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CanvasConfigFile {
    width: Option<f64>,
    height: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    percent: Option<f64>,
    any_part_confidence: Option<f64>,
    movement_confidence: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ProgressConfigFile {
    every: Option<usize>,
    parallel: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct JobsConfigFile {
    db_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoiConfig {
    /// Space the regions are drawn in.
    pub canvas: Size,
    pub tracking: TrackingSettings,
    pub progress: ProgressSettings,
    pub jobs_db_path: String,
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    /// Majority share as a percentage in `[0, 100]`.
    pub percent: f64,
    pub any_part_confidence: f64,
    pub movement_confidence: f64,
}

#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub every: usize,
    pub parallel: bool,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self::from_file(RoiConfigFile::default())
    }
}

impl RoiConfig {
    /// Defaults, then the file named by `ROI_CONFIG`, then environment
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROI_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RoiConfigFile) -> Self {
        let canvas = file.canvas.unwrap_or_default();
        let tracking = file.tracking.unwrap_or_default();
        let progress = file.progress.unwrap_or_default();
        Self {
            canvas: Size::new(
                canvas.width.unwrap_or(DEFAULT_CANVAS_WIDTH),
                canvas.height.unwrap_or(DEFAULT_CANVAS_HEIGHT),
            ),
            tracking: TrackingSettings {
                percent: tracking.percent.unwrap_or(DEFAULT_PERCENT),
                any_part_confidence: tracking.any_part_confidence.unwrap_or(ANY_PART_CONFIDENCE),
                movement_confidence: tracking.movement_confidence.unwrap_or(MOVEMENT_CONFIDENCE),
            },
            progress: ProgressSettings {
                every: progress.every.unwrap_or(DEFAULT_PROGRESS_EVERY),
                parallel: progress.parallel.unwrap_or(true),
            },
            jobs_db_path: file
                .jobs
                .and_then(|jobs| jobs.db_path)
                .unwrap_or_else(|| DEFAULT_JOBS_DB.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(width) = std::env::var("ROI_CANVAS_WIDTH") {
            self.canvas.width = width
                .trim()
                .parse()
                .map_err(|_| anyhow!("ROI_CANVAS_WIDTH must be a number"))?;
        }
        if let Ok(height) = std::env::var("ROI_CANVAS_HEIGHT") {
            self.canvas.height = height
                .trim()
                .parse()
                .map_err(|_| anyhow!("ROI_CANVAS_HEIGHT must be a number"))?;
        }
        if let Ok(percent) = std::env::var("ROI_PERCENT") {
            self.tracking.percent = percent
                .trim()
                .parse()
                .map_err(|_| anyhow!("ROI_PERCENT must be a number between 0 and 100"))?;
        }
        if let Ok(every) = std::env::var("ROI_PROGRESS_EVERY") {
            self.progress.every = every
                .trim()
                .parse()
                .map_err(|_| anyhow!("ROI_PROGRESS_EVERY must be a whole number of frames"))?;
        }
        if let Ok(parallel) = std::env::var("ROI_PARALLEL") {
            self.progress.parallel = parse_flag(&parallel)
                .ok_or_else(|| anyhow!("ROI_PARALLEL must be true or false"))?;
        }
        if let Ok(path) = std::env::var("ROI_JOBS_DB") {
            if !path.trim().is_empty() {
                self.jobs_db_path = path;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let Size { width, height } = self.canvas;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(anyhow!(
                "canvas size must be positive, got {}x{}",
                width,
                height
            ));
        }
        if !(0.0..=100.0).contains(&self.tracking.percent) {
            return Err(anyhow!(
                "percent must be between 0 and 100, got {}",
                self.tracking.percent
            ));
        }
        for (name, value) in [
            ("any_part_confidence", self.tracking.any_part_confidence),
            ("movement_confidence", self.tracking.movement_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be between 0 and 1, got {}", name, value));
            }
        }
        if self.progress.every == 0 {
            return Err(anyhow!("progress.every must be greater than zero"));
        }
        Ok(())
    }

    /// Majority mode at the configured percentage.
    pub fn majority_mode(&self) -> Result<TrackingMode> {
        Ok(TrackingMode::majority_from_percentage(self.tracking.percent)?)
    }

    pub fn aggregator(&self) -> SegmentAggregator {
        SegmentAggregator::new()
            .with_progress_every(self.progress.every)
            .with_parallel(self.progress.parallel)
    }
}

fn read_config_file(path: &Path) -> Result<RoiConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
