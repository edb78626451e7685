use serde_json::{Map, Value};

use crate::error::HarvestError;

/// One region-month-variable observation with only scalar fields.
pub type FeatureRecord = Map<String, Value>;

const GEOMETRY: &str = "geometry";

/// Scalar properties of one feature. Geometry and list or object valued
/// properties are dropped.
pub fn flatten_feature(feature: &Value) -> FeatureRecord {
    let Some(Value::Object(properties)) = feature.get("properties") else {
        return FeatureRecord::new();
    };
    properties
        .iter()
        .filter(|(key, _)| key.as_str() != GEOMETRY)
        .filter(|(_, value)| !matches!(value, Value::Array(_) | Value::Object(_)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Parses a feature collection document and flattens each feature into a row.
/// A document without `features` yields no rows.
pub fn flatten_collection(name: &str, text: &str) -> Result<Vec<FeatureRecord>, HarvestError> {
    let malformed = |message: String| HarvestError::FeatureCollection {
        name: name.to_string(),
        message,
    };
    let document: Value = serde_json::from_str(text).map_err(|err| malformed(err.to_string()))?;
    let Value::Object(document) = document else {
        return Err(malformed("document is not a JSON object".to_string()));
    };
    match document.get("features") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(features)) => Ok(features.iter().map(flatten_feature).collect()),
        Some(_) => Err(malformed("`features` is not an array".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn drops_geometry_and_nested_values() {
        let feature = json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [100.5, 13.7]},
            "properties": {
                "year": 2020,
                "tags": ["a", "b"],
                "geometry": {"type": "Point"},
            },
        });
        let record = flatten_feature(&feature);
        assert_eq!(Value::Object(record), json!({"year": 2020}));
    }

    #[test]
    fn keeps_null_and_string_scalars() {
        let feature = json!({
            "properties": {"ADM1_EN": "Chiang Mai", "mean": null, "month": 3, "hasFire": true}
        });
        let record = flatten_feature(&feature);
        assert_eq!(record.len(), 4);
        assert_eq!(record["mean"], Value::Null);
    }

    #[test]
    fn missing_features_is_empty() {
        let rows = flatten_collection("a.geojson", r#"{"type": "FeatureCollection"}"#).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn feature_without_properties_is_an_empty_row() {
        let rows =
            flatten_collection("a.geojson", r#"{"features": [{"type": "Feature"}]}"#).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_empty());
    }

    #[test]
    fn rejects_non_json() {
        assert_matches!(
            flatten_collection("a.geojson", "not json"),
            Err(HarvestError::FeatureCollection { .. })
        );
    }
}
