//! Region persistence.
//!
//! Document shape: a JSON object keyed by region name. A single polygon is a
//! list of `[x, y]` points; a multipolygon is a list of such lists. The two
//! are told apart by the first element of the first coordinate: a number
//! means a single polygon, a nested list means a multipolygon.
//!
//! Loading never overwrites: a name already present in the store is unioned
//! with the incoming geometry. Saving writes exterior rings only.

use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{Result, RoiError};
use crate::geometry::{GeometryStore, MergeOutcome, Region};

/// Parse a region document into `(name, region)` pairs in document order.
pub fn parse(doc: &Value) -> Result<Vec<(String, Region)>> {
    let object = doc
        .as_object()
        .ok_or_else(|| invalid("region document must be a JSON object"))?;
    object
        .iter()
        .map(|(name, coords)| {
            let region = parse_region(name, coords)?;
            Ok((name.clone(), region))
        })
        .collect()
}

fn parse_region(name: &str, coords: &Value) -> Result<Region> {
    let items = coords
        .as_array()
        .ok_or_else(|| invalid(format!("region '{}' is not a list", name)))?;
    let first_coordinate = items
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(format!("region '{}' has no coordinates", name)))?;
    match first_coordinate.first() {
        Some(Value::Number(_)) => Region::polygon(&parse_ring(name, items)?),
        Some(Value::Array(_)) => {
            let rings = items
                .iter()
                .map(|ring| {
                    let points = ring.as_array().ok_or_else(|| {
                        invalid(format!("region '{}' mixes points and polygons", name))
                    })?;
                    parse_ring(name, points)
                })
                .collect::<Result<Vec<_>>>()?;
            Region::multi(&rings)
        }
        _ => Err(invalid(format!(
            "region '{}' has a malformed first coordinate",
            name
        ))),
    }
}

fn parse_ring(name: &str, points: &[Value]) -> Result<Vec<[f64; 2]>> {
    points
        .iter()
        .map(|point| match point.as_array().map(Vec::as_slice) {
            Some([x, y]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok([x, y]),
                _ => Err(invalid(format!("region '{}' has a non-numeric point", name))),
            },
            _ => Err(invalid(format!(
                "region '{}' has a point that is not an [x, y] pair",
                name
            ))),
        })
        .collect()
}

fn invalid(reason: impl Into<String>) -> RoiError {
    RoiError::InvalidRegions(reason.into())
}

/// Add every region of `doc` to the store. Returns how many names were new.
pub fn load_value_into(store: &mut GeometryStore, doc: &Value) -> Result<usize> {
    let parsed = parse(doc)?;
    let mut inserted = 0;
    for (name, region) in parsed {
        if store.add_or_merge(&name, region) == MergeOutcome::Inserted {
            inserted += 1;
        }
    }
    Ok(inserted)
}

pub fn load_into(store: &mut GeometryStore, json: &str) -> Result<usize> {
    let doc: Value = serde_json::from_str(json)?;
    load_value_into(store, &doc)
}

pub fn load_file(store: &mut GeometryStore, path: &Path) -> Result<usize> {
    let json = std::fs::read_to_string(path)?;
    let inserted = load_into(store, &json)?;
    log::info!("loaded regions from {} ({} new)", path.display(), inserted);
    Ok(inserted)
}

/// Region document for the store, in store order.
pub fn to_value(store: &GeometryStore) -> Value {
    let mut doc = Map::new();
    for named in store.regions() {
        let rings = named.region.exterior_rings();
        let coords = if named.region.is_multi() {
            Value::Array(rings.iter().map(|r| ring_value(r)).collect())
        } else {
            ring_value(rings.first().map(Vec::as_slice).unwrap_or_default())
        };
        doc.insert(named.name.clone(), coords);
    }
    Value::Object(doc)
}

fn ring_value(ring: &[[f64; 2]]) -> Value {
    Value::Array(
        ring.iter()
            .map(|[x, y]| Value::Array(vec![Value::from(*x), Value::from(*y)]))
            .collect(),
    )
}

pub fn to_json(store: &GeometryStore) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_value(store))?)
}

pub fn save_file(store: &GeometryStore, path: &Path) -> Result<()> {
    std::fs::write(path, to_json(store)?)?;
    log::info!("saved {} regions to {}", store.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_and_multi_are_disambiguated() {
        let doc = json!({
            "arena": [[0, 0], [10, 0], [10, 10], [0, 10]],
            "corners": [
                [[0, 0], [1, 0], [1, 1]],
                [[5, 5], [6, 5], [6, 6]]
            ]
        });
        let parsed = parse(&doc).unwrap();
        assert_eq!(parsed[0].0, "arena");
        assert!(!parsed[0].1.is_multi());
        assert_eq!(parsed[1].0, "corners");
        assert_eq!(parsed[1].1.polygons().len(), 2);
    }

    #[test]
    fn collision_unions_instead_of_overwriting() {
        let mut store = GeometryStore::new();
        load_into(&mut store, r#"{"r": [[0,0],[2,0],[2,2],[0,2]]}"#).unwrap();
        let inserted = load_into(&mut store, r#"{"r": [[10,10],[12,10],[12,12],[10,12]]}"#).unwrap();
        assert_eq!(inserted, 0);
        let region = store.get("r").unwrap();
        assert!(region.is_multi());
        assert!((region.area() - 8.0).abs() < 1e-9);
        assert!(region.contains(1.0, 1.0));
        assert!(region.contains(11.0, 11.0));
    }

    #[test]
    fn saved_rings_are_closed_and_reload() {
        let mut store = GeometryStore::new();
        load_into(&mut store, r#"{"b": [[0,0],[4,0],[4,4]], "a": [[[0,0],[1,0],[1,1]],[[3,3],[4,3],[4,4]]]}"#)
            .unwrap();
        let doc = to_value(&store);
        let names: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(doc["b"][0], doc["b"][3]);

        let mut reloaded = GeometryStore::new();
        load_value_into(&mut reloaded, &doc).unwrap();
        assert_eq!(reloaded.get("a").unwrap().polygons().len(), 2);
        assert!((reloaded.get("b").unwrap().area() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        for bad in [
            json!([1, 2]),
            json!({"r": []}),
            json!({"r": [[0, 0], [1, 1]]}),
            json!({"r": [[0, 0, 0], [1, 1, 1], [2, 2, 2]]}),
            json!({"r": [["a", 0], [1, 1], [2, 0]]}),
            json!({"r": "square"}),
        ] {
            assert!(
                matches!(parse(&bad), Err(RoiError::InvalidRegions(_))),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn file_round_trip() {
        let mut store = GeometryStore::new();
        load_into(&mut store, r#"{"zone": [[0,0],[5,0],[5,5],[0,5]]}"#).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        save_file(&store, file.path()).unwrap();
        let mut reloaded = GeometryStore::new();
        assert_eq!(load_file(&mut reloaded, file.path()).unwrap(), 1);
        assert_eq!(reloaded.get("zone"), store.get("zone"));
    }
}
