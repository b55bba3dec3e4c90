use formats::{DecodeError, Feature, decode_geojson, decode_topojson};
use serde_json::Value;

/// Normalizes a raw document into an ordered feature list and applies the
/// optional predicate filter.
///
/// Filtered features are dropped before styling or dispatch, so they
/// produce no layer objects and no picking geometry. A malformed document
/// fails the whole extraction; no partial list is returned.
pub fn extract_features(
    document: &Value,
    topojson: bool,
    filter: Option<&dyn Fn(&Feature) -> bool>,
) -> Result<Vec<Feature>, DecodeError> {
    let collection = if topojson {
        decode_topojson(document)?
    } else {
        decode_geojson(document)?
    };

    let features = match filter {
        Some(pred) => collection
            .features
            .into_iter()
            .filter(|f| pred(f))
            .collect(),
        None => collection.features,
    };
    Ok(features)
}
