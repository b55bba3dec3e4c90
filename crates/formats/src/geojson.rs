use serde_json::{Map, Value};

use crate::feature::{DecodeError, Feature, FeatureCollection, GeoPoint, Geometry};

/// Normalizes a GeoJSON document into a flat feature list.
///
/// Accepts a `FeatureCollection`, a single `Feature`, or a bare geometry
/// object (wrapped as one feature with empty properties). Deterministic:
/// features come out in document order.
pub fn decode_geojson(value: &Value) -> Result<FeatureCollection, DecodeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::UnexpectedRoot(json_type_name(value).to_string()))?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DecodeError::UnexpectedRoot("object without type".to_string()))?;

    match ty {
        "FeatureCollection" => {
            let features_val = obj.get("features").and_then(|v| v.as_array()).ok_or_else(|| {
                DecodeError::UnexpectedRoot("FeatureCollection without features".to_string())
            })?;
            let mut features = Vec::with_capacity(features_val.len());
            for (index, feat_val) in features_val.iter().enumerate() {
                features.push(parse_feature(feat_val, index)?);
            }
            Ok(FeatureCollection { features })
        }
        "Feature" => Ok(FeatureCollection {
            features: vec![parse_feature(value, 0)?],
        }),
        "Point" | "MultiPoint" | "LineString" | "MultiLineString" | "Polygon"
        | "MultiPolygon" | "GeometryCollection" => {
            // Bare geometry document, wrapped as one feature.
            let geometry =
                parse_geometry(value).map_err(|reason| DecodeError::InvalidFeature {
                    index: 0,
                    reason,
                })?;
            Ok(FeatureCollection {
                features: vec![Feature {
                    id: None,
                    properties: Map::new(),
                    geometry,
                }],
            })
        }
        other => Err(DecodeError::UnexpectedRoot(format!(
            "unexpected document type: {other}"
        ))),
    }
}

pub fn decode_geojson_str(payload: &str) -> Result<FeatureCollection, DecodeError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| DecodeError::Json(e.to_string()))?;
    decode_geojson(&value)
}

fn parse_feature(value: &Value, index: usize) -> Result<Feature, DecodeError> {
    let obj = value.as_object().ok_or(DecodeError::InvalidFeature {
        index,
        reason: "feature must be an object".to_string(),
    })?;

    let feat_type = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::InvalidFeature {
            index,
            reason: "feature missing type".to_string(),
        })?;
    if feat_type != "Feature" {
        return Err(DecodeError::InvalidFeature {
            index,
            reason: format!("unexpected feature type: {feat_type}"),
        });
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
        .unwrap_or_default();

    // Missing or null geometry is a valid, skippable feature.
    let geometry = match obj.get("geometry") {
        None | Some(Value::Null) => None,
        Some(geom_val) => parse_geometry(geom_val)
            .map_err(|reason| DecodeError::InvalidFeature { index, reason })?,
    };

    Ok(Feature {
        id,
        properties,
        geometry,
    })
}

/// Parses one geometry object.
///
/// Returns `Ok(None)` for geometry types outside the pipeline's model
/// (e.g. `GeometryCollection`) and for `null` coordinates; returns `Err`
/// only for structurally malformed coordinates of a known type.
pub(crate) fn parse_geometry(value: &Value) -> Result<Option<Geometry>, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "geometry missing type".to_string())?;

    let coords = match obj.get("coordinates") {
        None | Some(Value::Null) => return Ok(None),
        Some(c) => c,
    };

    match ty {
        "Point" => Ok(Some(Geometry::Point(parse_point(coords)?))),
        "MultiPoint" => Ok(Some(Geometry::MultiPoint(parse_points(coords)?))),
        "LineString" => Ok(Some(Geometry::LineString(parse_points(coords)?))),
        "MultiLineString" => Ok(Some(Geometry::MultiLineString(parse_lines(coords)?))),
        "Polygon" => Ok(Some(Geometry::Polygon(parse_lines(coords)?))),
        "MultiPolygon" => Ok(Some(Geometry::MultiPolygon(parse_polygons(coords)?))),
        _ => Ok(None),
    }
}

fn parse_point(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords
        .as_array()
        .ok_or_else(|| "position must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("position must have [lon, lat]".to_string());
    }
    let lon = arr[0]
        .as_f64()
        .ok_or_else(|| "lon must be a number".to_string())?;
    let lat = arr[1]
        .as_f64()
        .ok_or_else(|| "lat must be a number".to_string())?;
    Ok(GeoPoint::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<GeoPoint>, String> {
    let arr = coords
        .as_array()
        .ok_or_else(|| "coordinates must be an array".to_string())?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(parse_point(item)?);
    }
    Ok(out)
}

fn parse_lines(coords: &Value) -> Result<Vec<Vec<GeoPoint>>, String> {
    let arr = coords
        .as_array()
        .ok_or_else(|| "coordinates must be an array of arrays".to_string())?;
    let mut out = Vec::with_capacity(arr.len());
    for line in arr {
        out.push(parse_points(line)?);
    }
    Ok(out)
}

fn parse_polygons(coords: &Value) -> Result<Vec<Vec<Vec<GeoPoint>>>, String> {
    let polys = coords
        .as_array()
        .ok_or_else(|| "MultiPolygon coordinates must be an array of polygons".to_string())?;
    let mut out = Vec::with_capacity(polys.len());
    for poly in polys {
        out.push(parse_lines(poly)?);
    }
    Ok(out)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
