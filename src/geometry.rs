//! Geometry store.
//!
//! Regions are drawn in canvas space and kept here by name. A region is either
//! a single polygon or the disjoint union of several polygons that share one
//! name. Containment is strict: a point lying exactly on a region's boundary
//! is outside. Fractional-pixel keypoints make exact boundary hits rare, and
//! the rule is applied the same way for every region and every mode.
//!
//! The store is borrowed immutably for the whole of an aggregation run, so
//! geometry cannot change while frames are being classified against it.

use geo::{
    Area, BooleanOps, Contains, Coord, Intersects, LineString, MapCoords, MultiPolygon, Point,
    Polygon,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoiError};

/// Width and height of a pixel space (video frame or drawing canvas).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn validate(&self, label: &str) -> Result<()> {
        let ok = self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0;
        if !ok {
            return Err(RoiError::config(format!(
                "{} size must be positive, got {}x{}",
                label, self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Linear per-axis map from one pixel space into another.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpaceMapping {
    scale_x: f64,
    scale_y: f64,
}

impl SpaceMapping {
    /// Mapping that takes `from` coordinates into `to` coordinates.
    pub fn new(from: Size, to: Size) -> Result<Self> {
        from.validate("source")?;
        to.validate("target")?;
        Ok(Self {
            scale_x: to.width / from.width,
            scale_y: to.height / from.height,
        })
    }

    pub fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn inverse(&self) -> Self {
        Self {
            scale_x: 1.0 / self.scale_x,
            scale_y: 1.0 / self.scale_y,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale_x, y * self.scale_y)
    }

    fn apply_coord(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: c.x * self.scale_x,
            y: c.y * self.scale_y,
        }
    }
}

/// Region geometry: one polygon, or several disjoint polygons under one name.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    polygons: Vec<Polygon<f64>>,
    multi: bool,
    /// Members with positive area; containment only looks at these.
    solid: Vec<Polygon<f64>>,
}

impl Region {
    fn new(polygons: Vec<Polygon<f64>>, multi: bool) -> Self {
        let solid = polygons
            .iter()
            .filter(|p| p.unsigned_area() > 0.0)
            .cloned()
            .collect();
        Self {
            polygons,
            multi,
            solid,
        }
    }

    /// Build a simple polygon from an ordered point list. Closure is implicit.
    ///
    /// Zero-area and collinear rings are accepted; they never contain a point.
    pub fn polygon(points: &[[f64; 2]]) -> Result<Self> {
        Ok(Self::new(vec![ring_to_polygon(points)?], false))
    }

    /// Build a region from several point lists.
    pub fn multi(rings: &[Vec<[f64; 2]>]) -> Result<Self> {
        let polygons = rings
            .iter()
            .map(|ring| ring_to_polygon(ring))
            .collect::<Result<Vec<_>>>()?;
        if polygons.is_empty() {
            return Err(RoiError::InvalidRegions(
                "multipolygon has no member polygons".to_string(),
            ));
        }
        Ok(Self::new(polygons, true))
    }

    fn from_polygons(polygons: Vec<Polygon<f64>>) -> Self {
        let multi = polygons.len() > 1;
        Self::new(polygons, multi)
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        &self.polygons
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn area(&self) -> f64 {
        self.solid.iter().map(|p| p.unsigned_area()).sum()
    }

    /// Strict point-in-region test. NaN coordinates are never contained.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        let point = Point::new(x, y);
        self.solid.iter().any(|polygon| polygon.contains(&point))
    }

    /// Geometric union of two regions.
    ///
    /// Disjoint inputs are concatenated into a multipolygon, overlapping ones
    /// are merged. A degenerate side contributes nothing.
    pub fn union(&self, other: &Region) -> Region {
        let (left, right) = (&self.solid, &other.solid);
        if right.is_empty() {
            return self.clone();
        }
        if left.is_empty() {
            return other.clone();
        }
        if right.iter().all(|p| left.iter().any(|q| q == p)) {
            return self.clone();
        }

        let overlaps = left
            .iter()
            .any(|a| right.iter().any(|b| a.intersects(b)));
        if !overlaps {
            let mut polygons = left.clone();
            polygons.extend(right.iter().cloned());
            return Region::from_polygons(polygons);
        }

        let merged = MultiPolygon::new(left.clone()).union(&MultiPolygon::new(right.clone()));
        Region::from_polygons(merged.0)
    }

    /// Scale every vertex. Each member of a multipolygon is scaled on its own
    /// and the variant is preserved.
    pub fn rescale(&self, mapping: &SpaceMapping) -> Region {
        let polygons = self
            .polygons
            .iter()
            .map(|polygon| polygon.map_coords(|c| mapping.apply_coord(c)))
            .collect();
        Region::new(polygons, self.multi)
    }

    /// Exterior rings as closed point lists, one per member polygon.
    pub fn exterior_rings(&self) -> Vec<Vec<[f64; 2]>> {
        self.polygons
            .iter()
            .map(|polygon| polygon.exterior().coords().map(|c| [c.x, c.y]).collect())
            .collect()
    }
}

fn ring_to_polygon(points: &[[f64; 2]]) -> Result<Polygon<f64>> {
    if points.len() < 3 {
        return Err(RoiError::InvalidRegions(format!(
            "polygon needs at least 3 points, got {}",
            points.len()
        )));
    }
    if points.iter().any(|[x, y]| !x.is_finite() || !y.is_finite()) {
        return Err(RoiError::InvalidRegions(
            "polygon vertices must be finite numbers".to_string(),
        ));
    }
    let ring: LineString<f64> = points.iter().map(|[x, y]| (*x, *y)).collect::<Vec<_>>().into();
    Ok(Polygon::new(ring, vec![]))
}

/// A region together with its unique name.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedRegion {
    pub name: String,
    pub region: Region,
}

/// What `add_or_merge` did with the incoming geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Merged,
}

/// Named regions in insertion order, plus the elapsed-time counters of the
/// last completed run.
#[derive(Clone, Debug, Default)]
pub struct GeometryStore {
    regions: Vec<NamedRegion>,
    time_counters: Vec<(String, f64)>,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn regions(&self) -> &[NamedRegion] {
        &self.regions
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.region)
    }

    /// Insert a region, or union it into an existing region of the same name.
    pub fn add_or_merge(&mut self, name: &str, region: Region) -> MergeOutcome {
        if let Some(existing) = self.regions.iter_mut().find(|r| r.name == name) {
            existing.region = existing.region.union(&region);
            log::debug!("region '{}' merged with existing geometry", name);
            return MergeOutcome::Merged;
        }
        self.regions.push(NamedRegion {
            name: name.to_string(),
            region,
        });
        self.time_counters.push((name.to_string(), 0.0));
        MergeOutcome::Inserted
    }

    /// Containment against a named region. `None` when no such region exists.
    pub fn contains(&self, name: &str, x: f64, y: f64) -> Option<bool> {
        self.get(name).map(|region| region.contains(x, y))
    }

    /// Copy of the store with every region scaled from `from` into `to`.
    pub fn rescaled(&self, from: Size, to: Size) -> Result<GeometryStore> {
        let mapping = SpaceMapping::new(from, to)?;
        Ok(GeometryStore {
            regions: self
                .regions
                .iter()
                .map(|r| NamedRegion {
                    name: r.name.clone(),
                    region: r.region.rescale(&mapping),
                })
                .collect(),
            time_counters: self.time_counters.clone(),
        })
    }

    /// Drop every region and every time counter.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.time_counters.clear();
        log::info!("All shapes cleared.");
    }

    /// Replace the time counters with the results of a completed run.
    pub fn record_times<'a>(&mut self, times: impl IntoIterator<Item = (&'a str, f64)>) {
        self.time_counters = times
            .into_iter()
            .map(|(name, seconds)| (name.to_string(), seconds))
            .collect();
    }

    pub fn time_counter(&self, name: &str) -> Option<f64> {
        self.time_counters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, seconds)| *seconds)
    }

    pub fn time_counters(&self) -> &[(String, f64)] {
        &self.time_counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, side: f64) -> Region {
        Region::polygon(&[
            [x0, y0],
            [x0 + side, y0],
            [x0 + side, y0 + side],
            [x0, y0 + side],
        ])
        .unwrap()
    }

    #[test]
    fn contains_interior_point_only() {
        let region = square(0.0, 0.0, 10.0);
        assert!(region.contains(5.0, 5.0));
        assert!(!region.contains(15.0, 5.0));
        // boundary is outside
        assert!(!region.contains(0.0, 5.0));
        assert!(!region.contains(f64::NAN, 5.0));
    }

    #[test]
    fn degenerate_region_never_contains() {
        let line = Region::polygon(&[[0.0, 0.0], [5.0, 5.0], [10.0, 10.0]]).unwrap();
        assert_eq!(line.area(), 0.0);
        assert!(!line.contains(5.0, 5.0));
        assert!(!line.contains(2.0, 3.0));
    }

    #[test]
    fn degenerate_members_are_dropped_once_at_build() {
        let region = Region::multi(&[
            vec![[0.0, 0.0], [5.0, 5.0], [10.0, 10.0]],
            vec![[20.0, 0.0], [30.0, 0.0], [30.0, 10.0], [20.0, 10.0]],
        ])
        .unwrap();
        assert_eq!(region.polygons().len(), 2);
        assert_eq!(region.solid.len(), 1);
        assert!(region.contains(25.0, 5.0));
        assert!(!region.contains(5.0, 5.0));

        let mapping = SpaceMapping::new(Size::new(100.0, 100.0), Size::new(200.0, 200.0)).unwrap();
        let scaled = region.rescale(&mapping);
        assert!(scaled.is_multi());
        assert_eq!(scaled.solid.len(), 1);
        assert!(scaled.contains(50.0, 10.0));

        let merged = square(100.0, 100.0, 1.0).union(&region);
        assert_eq!(merged.solid.len(), 2);
        assert_eq!(merged.polygons().len(), 2);
    }

    #[test]
    fn polygon_needs_three_points() {
        assert!(Region::polygon(&[[0.0, 0.0], [1.0, 1.0]]).is_err());
    }

    #[test]
    fn union_with_itself_keeps_area() {
        let region = square(0.0, 0.0, 10.0);
        let merged = region.union(&region);
        assert!((merged.area() - region.area()).abs() < 1e-9);
        assert!(!merged.is_multi());
    }

    #[test]
    fn disjoint_union_is_multi_with_summed_area() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(20.0, 0.0, 5.0);
        let merged = a.union(&b);
        assert!(merged.is_multi());
        assert!((merged.area() - 125.0).abs() < 1e-9);
        assert!(merged.contains(22.0, 2.0));
        assert!(merged.contains(2.0, 2.0));
    }

    #[test]
    fn overlapping_union_does_not_double_count() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 0.0, 10.0);
        let merged = a.union(&b);
        assert!((merged.area() - 150.0).abs() < 1e-6);
        assert!(merged.contains(12.0, 5.0));
    }

    #[test]
    fn union_is_commutative_in_area() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(30.0, 30.0, 4.0);
        assert!((a.union(&b).area() - b.union(&a).area()).abs() < 1e-9);
    }

    #[test]
    fn rescale_round_trip_restores_vertices() {
        let region = square(0.0, 0.0, 10.0).union(&square(40.0, 40.0, 3.0));
        let canvas = Size::new(960.0, 540.0);
        let video = Size::new(1920.0, 1080.0);
        let there = region.rescale(&SpaceMapping::new(canvas, video).unwrap());
        let back = there.rescale(&SpaceMapping::new(video, canvas).unwrap());
        assert!(back.is_multi());
        for (a, b) in region.exterior_rings().iter().zip(back.exterior_rings().iter()) {
            for (p, q) in a.iter().zip(b.iter()) {
                assert!((p[0] - q[0]).abs() < 1e-9);
                assert!((p[1] - q[1]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn rescale_scales_each_axis() {
        let region = square(10.0, 10.0, 10.0);
        let mapping = SpaceMapping::new(Size::new(100.0, 100.0), Size::new(200.0, 50.0)).unwrap();
        let scaled = region.rescale(&mapping);
        assert!((scaled.area() - 100.0 * 2.0 * 0.5).abs() < 1e-9);
        assert!(scaled.contains(30.0, 7.5));
    }

    #[test]
    fn zero_sized_source_is_config_error() {
        let err = SpaceMapping::new(Size::new(0.0, 540.0), Size::new(960.0, 540.0)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn store_merges_same_name_and_reports_missing_region() {
        let mut store = GeometryStore::new();
        assert_eq!(store.contains("arena", 1.0, 1.0), None);
        assert_eq!(store.add_or_merge("arena", square(0.0, 0.0, 10.0)), MergeOutcome::Inserted);
        assert_eq!(store.add_or_merge("arena", square(50.0, 50.0, 10.0)), MergeOutcome::Merged);
        assert_eq!(store.len(), 1);
        assert_eq!(store.contains("arena", 55.0, 55.0), Some(true));
        assert_eq!(store.time_counter("arena"), Some(0.0));
    }

    #[test]
    fn clear_drops_regions_and_counters() {
        let mut store = GeometryStore::new();
        store.add_or_merge("a", square(0.0, 0.0, 1.0));
        store.record_times([("a", 3.5)]);
        assert_eq!(store.time_counter("a"), Some(3.5));
        store.clear();
        assert!(store.is_empty());
        assert!(store.time_counters().is_empty());
    }
}
