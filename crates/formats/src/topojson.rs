use serde_json::{Map, Value};

use crate::feature::{DecodeError, Feature, FeatureCollection, GeoPoint, Geometry};

/// Quantization transform from a topology header.
#[derive(Debug, Clone, Copy)]
struct Transform {
    scale: [f64; 2],
    translate: [f64; 2],
}

impl Transform {
    const IDENTITY: Transform = Transform {
        scale: [1.0, 1.0],
        translate: [0.0, 0.0],
    };

    fn apply(&self, x: f64, y: f64) -> GeoPoint {
        GeoPoint::new(
            x * self.scale[0] + self.translate[0],
            y * self.scale[1] + self.translate[1],
        )
    }
}

/// Normalizes a TopoJSON topology into a flat feature list.
///
/// Every geometry of every named object becomes one feature; a
/// `GeometryCollection` object contributes one feature per member. Objects
/// are visited in key order, so output is deterministic for a given input
/// (not necessarily insertion order).
pub fn decode_topojson(value: &Value) -> Result<FeatureCollection, DecodeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::UnexpectedRoot("non-object".to_string()))?;
    let ty = obj.get("type").and_then(|v| v.as_str()).unwrap_or("");
    if ty != "Topology" {
        return Err(DecodeError::UnexpectedRoot(format!(
            "expected Topology, found {ty:?}"
        )));
    }

    let transform = match obj.get("transform") {
        None => None,
        Some(t) => Some(parse_transform(t)?),
    };

    let arcs = decode_arcs(
        obj.get("arcs")
            .and_then(|v| v.as_array())
            .ok_or_else(|| DecodeError::Topology("missing arcs".to_string()))?,
        transform,
    )?;

    let objects = obj
        .get("objects")
        .and_then(|v| v.as_object())
        .ok_or_else(|| DecodeError::Topology("missing objects".to_string()))?;

    let point_transform = transform.unwrap_or(Transform::IDENTITY);
    let mut features = Vec::new();
    // serde_json::Map iterates in key order.
    for geom_val in objects.values() {
        collect_features(geom_val, &arcs, point_transform, &mut features)?;
    }

    Ok(FeatureCollection { features })
}

pub fn decode_topojson_str(payload: &str) -> Result<FeatureCollection, DecodeError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| DecodeError::Json(e.to_string()))?;
    decode_topojson(&value)
}

fn parse_transform(value: &Value) -> Result<Transform, DecodeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::Topology("transform must be an object".to_string()))?;
    let pair = |key: &str| -> Result<[f64; 2], DecodeError> {
        let arr = obj
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| DecodeError::Topology(format!("transform missing {key}")))?;
        if arr.len() != 2 {
            return Err(DecodeError::Topology(format!(
                "transform {key} must have two entries"
            )));
        }
        let a = arr[0]
            .as_f64()
            .ok_or_else(|| DecodeError::Topology(format!("transform {key} must be numeric")))?;
        let b = arr[1]
            .as_f64()
            .ok_or_else(|| DecodeError::Topology(format!("transform {key} must be numeric")))?;
        Ok([a, b])
    };
    Ok(Transform {
        scale: pair("scale")?,
        translate: pair("translate")?,
    })
}

/// Decodes all arcs up front. With a transform present, arc positions are
/// delta-encoded quantized integers; without one they are absolute.
fn decode_arcs(raw: &[Value], transform: Option<Transform>) -> Result<Vec<Vec<GeoPoint>>, DecodeError> {
    let mut arcs = Vec::with_capacity(raw.len());
    for (arc_index, arc_val) in raw.iter().enumerate() {
        let positions = arc_val
            .as_array()
            .ok_or_else(|| DecodeError::Topology(format!("arc {arc_index} must be an array")))?;
        let mut arc = Vec::with_capacity(positions.len());
        let mut x = 0.0;
        let mut y = 0.0;
        for pos in positions {
            let pair = pos.as_array().filter(|a| a.len() >= 2).ok_or_else(|| {
                DecodeError::Topology(format!("arc {arc_index} has a malformed position"))
            })?;
            let px = pair[0].as_f64().ok_or_else(|| {
                DecodeError::Topology(format!("arc {arc_index} has a non-numeric position"))
            })?;
            let py = pair[1].as_f64().ok_or_else(|| {
                DecodeError::Topology(format!("arc {arc_index} has a non-numeric position"))
            })?;
            match transform {
                Some(t) => {
                    x += px;
                    y += py;
                    arc.push(t.apply(x, y));
                }
                None => arc.push(GeoPoint::new(px, py)),
            }
        }
        arcs.push(arc);
    }
    Ok(arcs)
}

fn collect_features(
    geom_val: &Value,
    arcs: &[Vec<GeoPoint>],
    point_transform: Transform,
    out: &mut Vec<Feature>,
) -> Result<(), DecodeError> {
    let obj = geom_val
        .as_object()
        .ok_or_else(|| DecodeError::Topology("object geometry must be an object".to_string()))?;
    let ty = obj.get("type").and_then(|v| v.as_str()).unwrap_or("");

    if ty == "GeometryCollection" {
        let members = obj
            .get("geometries")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                DecodeError::Topology("GeometryCollection missing geometries".to_string())
            })?;
        for member in members {
            collect_features(member, arcs, point_transform, out)?;
        }
        return Ok(());
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let properties = obj
        .get("properties")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_else(Map::new);

    let geometry = match ty {
        "Point" => point_coords(obj, point_transform)?.map(Geometry::Point),
        "MultiPoint" => multi_point_coords(obj, point_transform)?.map(Geometry::MultiPoint),
        "LineString" => Some(Geometry::LineString(stitch_line(arc_indices(obj)?, arcs)?)),
        "MultiLineString" => {
            let mut lines = Vec::new();
            for line in nested_arc_indices(obj)? {
                lines.push(stitch_line(line, arcs)?);
            }
            Some(Geometry::MultiLineString(lines))
        }
        "Polygon" => {
            let mut rings = Vec::new();
            for ring in nested_arc_indices(obj)? {
                rings.push(stitch_line(ring, arcs)?);
            }
            Some(Geometry::Polygon(rings))
        }
        "MultiPolygon" => {
            let polys_val = obj
                .get("arcs")
                .and_then(|v| v.as_array())
                .ok_or_else(|| DecodeError::Topology("MultiPolygon missing arcs".to_string()))?;
            let mut polys = Vec::with_capacity(polys_val.len());
            for poly in polys_val {
                let rings_val = poly.as_array().ok_or_else(|| {
                    DecodeError::Topology("MultiPolygon polygon must be an array".to_string())
                })?;
                let mut rings = Vec::with_capacity(rings_val.len());
                for ring in rings_val {
                    rings.push(stitch_line(index_list(ring)?, arcs)?);
                }
                polys.push(rings);
            }
            Some(Geometry::MultiPolygon(polys))
        }
        // Null or unknown object types carry through as unusable geometry.
        _ => None,
    };

    out.push(Feature {
        id,
        properties,
        geometry,
    });
    Ok(())
}

fn point_coords(
    obj: &Map<String, Value>,
    transform: Transform,
) -> Result<Option<GeoPoint>, DecodeError> {
    let Some(arr) = obj.get("coordinates").and_then(|v| v.as_array()) else {
        return Ok(None);
    };
    if arr.len() < 2 {
        return Err(DecodeError::Topology(
            "Point coordinates must have [x, y]".to_string(),
        ));
    }
    let x = arr[0]
        .as_f64()
        .ok_or_else(|| DecodeError::Topology("Point x must be numeric".to_string()))?;
    let y = arr[1]
        .as_f64()
        .ok_or_else(|| DecodeError::Topology("Point y must be numeric".to_string()))?;
    Ok(Some(transform.apply(x, y)))
}

fn multi_point_coords(
    obj: &Map<String, Value>,
    transform: Transform,
) -> Result<Option<Vec<GeoPoint>>, DecodeError> {
    let Some(arr) = obj.get("coordinates").and_then(|v| v.as_array()) else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(arr.len());
    for pos in arr {
        let pair = pos.as_array().filter(|a| a.len() >= 2).ok_or_else(|| {
            DecodeError::Topology("MultiPoint has a malformed position".to_string())
        })?;
        let x = pair[0]
            .as_f64()
            .ok_or_else(|| DecodeError::Topology("MultiPoint x must be numeric".to_string()))?;
        let y = pair[1]
            .as_f64()
            .ok_or_else(|| DecodeError::Topology("MultiPoint y must be numeric".to_string()))?;
        out.push(transform.apply(x, y));
    }
    Ok(Some(out))
}

fn arc_indices(obj: &Map<String, Value>) -> Result<Vec<i64>, DecodeError> {
    index_list(
        obj.get("arcs")
            .ok_or_else(|| DecodeError::Topology("geometry missing arcs".to_string()))?,
    )
}

fn nested_arc_indices(obj: &Map<String, Value>) -> Result<Vec<Vec<i64>>, DecodeError> {
    let outer = obj
        .get("arcs")
        .and_then(|v| v.as_array())
        .ok_or_else(|| DecodeError::Topology("geometry missing arcs".to_string()))?;
    let mut out = Vec::with_capacity(outer.len());
    for inner in outer {
        out.push(index_list(inner)?);
    }
    Ok(out)
}

fn index_list(value: &Value) -> Result<Vec<i64>, DecodeError> {
    let arr = value
        .as_array()
        .ok_or_else(|| DecodeError::Topology("arc index list must be an array".to_string()))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(item.as_i64().ok_or_else(|| {
            DecodeError::Topology("arc index must be an integer".to_string())
        })?);
    }
    Ok(out)
}

/// Stitches arcs into one point run. A negative index `i` means arc `!i`
/// traversed in reverse. Consecutive arcs share their junction point, which
/// is emitted once.
fn stitch_line(indices: Vec<i64>, arcs: &[Vec<GeoPoint>]) -> Result<Vec<GeoPoint>, DecodeError> {
    let mut out: Vec<GeoPoint> = Vec::new();
    for index in indices {
        let (arc_index, reversed) = if index >= 0 {
            (index as usize, false)
        } else {
            (!index as usize, true)
        };
        let arc = arcs
            .get(arc_index)
            .ok_or_else(|| DecodeError::Topology(format!("arc index {index} out of range")))?;

        let points: Box<dyn Iterator<Item = &GeoPoint>> = if reversed {
            Box::new(arc.iter().rev())
        } else {
            Box::new(arc.iter())
        };
        for (i, p) in points.enumerate() {
            // The first point of every arc after the first duplicates the
            // previous arc's endpoint.
            if i == 0 && !out.is_empty() {
                continue;
            }
            out.push(*p);
        }
    }
    Ok(out)
}
