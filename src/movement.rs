//! Movement summary for one body part over a frame range.
//!
//! Samples below [`MOVEMENT_CONFIDENCE`], missing, or pinned to the origin are
//! dropped, then outliers outside 1.5 IQR on either axis are removed. What is
//! left feeds the bounding box, path length and area under the path.

use crate::aggregate::FrameRange;
use crate::error::Result;
use crate::keypoints::FrameSource;

/// Minimum likelihood for a sample to enter the movement summary.
///
/// Deliberately distinct from the `any_part` occupancy threshold.
pub const MOVEMENT_CONFIDENCE: f64 = 0.75;

/// Coordinates at or below this magnitude are treated as undetected.
const ORIGIN_EPSILON: f64 = 1e-5;

const IQR_FENCE: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Bounds {
    pub fn area(&self) -> f64 {
        (self.x_max - self.x_min) * (self.y_max - self.y_min)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MovementSummary {
    pub body_part: String,
    /// Samples kept after filtering, in frame order.
    pub points: Vec<(usize, f64, f64)>,
    /// `None` when no sample survived filtering.
    pub bounds: Option<Bounds>,
    /// Sum of distances between consecutive kept samples.
    pub path_length: f64,
    /// Trapezoidal area under `y` over `x`, with samples sorted by `x`.
    pub auc: f64,
}

pub fn summarize(
    source: &dyn FrameSource,
    body_part: &str,
    range: FrameRange,
    threshold: f64,
) -> Result<MovementSummary> {
    let mut candidates = Vec::new();
    for frame in range.start()..=range.end() {
        if !source.has_frame(frame) {
            continue;
        }
        let s = source.sample(frame, body_part)?;
        if s.is_visible()
            && s.x.abs() > ORIGIN_EPSILON
            && s.y.abs() > ORIGIN_EPSILON
            && s.confidence >= threshold
        {
            candidates.push((frame, s.x, s.y));
        }
    }

    let points = if candidates.is_empty() {
        candidates
    } else {
        let xs: Vec<f64> = candidates.iter().map(|p| p.1).collect();
        let ys: Vec<f64> = candidates.iter().map(|p| p.2).collect();
        let (x_lo, x_hi) = fences(&xs);
        let (y_lo, y_hi) = fences(&ys);
        candidates
            .into_iter()
            .filter(|&(_, x, y)| x >= x_lo && x <= x_hi && y >= y_lo && y <= y_hi)
            .collect()
    };

    let bounds = points.iter().fold(None, |acc: Option<Bounds>, &(_, x, y)| {
        Some(match acc {
            None => Bounds {
                x_min: x,
                x_max: x,
                y_min: y,
                y_max: y,
            },
            Some(b) => Bounds {
                x_min: b.x_min.min(x),
                x_max: b.x_max.max(x),
                y_min: b.y_min.min(y),
                y_max: b.y_max.max(y),
            },
        })
    });

    let path_length = points
        .windows(2)
        .map(|w| (w[1].1 - w[0].1).hypot(w[1].2 - w[0].2))
        .sum();

    let mut by_x: Vec<(f64, f64)> = points.iter().map(|&(_, x, y)| (x, y)).collect();
    by_x.sort_by(|a, b| a.0.total_cmp(&b.0));
    let auc = by_x
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
        .sum();

    log::debug!(
        "movement summary for '{}': {} samples kept",
        body_part,
        points.len()
    );
    Ok(MovementSummary {
        body_part: body_part.to_string(),
        points,
        bounds,
        path_length,
        auc,
    })
}

fn fences(values: &[f64]) -> (f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    (q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr)
}

/// Linear-interpolated quantile of sorted, non-empty data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
