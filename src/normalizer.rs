//! Request normalization: turns a parsed JSON body into a feature matrix.
//!
//! Accepts either a single sample (`{"features": [5.1, 3.5, 1.4, 0.2]}`) or a
//! batch (`{"features": [[5.1, 3.5, 1.4, 0.2], [6.2, 2.9, 4.3, 1.3]]}`). Both
//! produce the same rectangular `FeatureBatch`, rows in request order.

use crate::error::{ServeError, ServeResult};
use crate::types::features::{FeatureBatch, FeatureVector};
use serde_json::Value;

/// Name of the request field carrying the feature data.
pub const FEATURES_FIELD: &str = "features";

/// Validates and reshapes request bodies. Pure, holds no per-request state.
#[derive(Debug, Clone, Default)]
pub struct RequestNormalizer {
    /// Feature count every row must have, when known ahead of time.
    expected_features: Option<usize>,
}

impl RequestNormalizer {
    pub fn new(expected_features: Option<usize>) -> Self {
        Self { expected_features }
    }

    pub fn expected_features(&self) -> Option<usize> {
        self.expected_features
    }

    /// Normalize using the configured dimensionality.
    pub fn normalize(&self, body: &Value) -> ServeResult<FeatureBatch> {
        self.normalize_with(body, self.expected_features)
    }

    /// Normalize with an explicit dimensionality (e.g. reported by the model).
    /// `None` defers the length check to the model itself.
    pub fn normalize_with(&self, body: &Value, expected: Option<usize>) -> ServeResult<FeatureBatch> {
        let object = body
            .as_object()
            .ok_or_else(|| ServeError::validation("request body must be a JSON object"))?;

        let features = match object.get(FEATURES_FIELD) {
            None | Some(Value::Null) => return Err(ServeError::validation("missing features")),
            Some(features) => features,
        };

        let items = features
            .as_array()
            .ok_or_else(|| ServeError::validation("features must be a list"))?;

        if items.is_empty() {
            return Err(ServeError::validation("features must be non-empty"));
        }

        let rows = if items.iter().any(Value::is_array) {
            items
                .iter()
                .enumerate()
                .map(|(row_idx, item)| match item {
                    Value::Array(values) => parse_row(values, Some(row_idx)),
                    other => Err(ServeError::validation(format!(
                        "features[{}] must be a list when features is a batch, got {}",
                        row_idx, other
                    ))),
                })
                .collect::<ServeResult<Vec<_>>>()?
        } else {
            // Single-sample shorthand
            vec![parse_row(items, None)?]
        };

        let batch = FeatureBatch::new(rows)?;

        if let Some(expected) = expected {
            check_dimensions(&batch, expected)?;
        }

        Ok(batch)
    }
}

/// Reject rows whose length differs from the model's feature count.
pub fn check_dimensions(batch: &FeatureBatch, expected: usize) -> ServeResult<()> {
    match batch
        .rows()
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != expected)
    {
        Some((idx, row)) => Err(ServeError::validation(format!(
            "expected {} features, got {} (row {})",
            expected,
            row.len(),
            idx
        ))),
        None => Ok(()),
    }
}

fn parse_row(values: &[Value], row_idx: Option<usize>) -> ServeResult<FeatureVector> {
    if values.is_empty() {
        return Err(ServeError::validation(format!(
            "features[{}] must be non-empty",
            row_idx.unwrap_or(0)
        )));
    }

    values
        .iter()
        .enumerate()
        .map(|(col, value)| coerce(value, position(row_idx, col)))
        .collect::<ServeResult<Vec<f64>>>()
        .map(FeatureVector::new)
}

fn position(row_idx: Option<usize>, col: usize) -> String {
    match row_idx {
        Some(row) => format!("features[{}][{}]", row, col),
        None => format!("features[{}]", col),
    }
}

/// Coerce a JSON scalar to `f64`. Numbers and numeric strings pass; values
/// must stay finite once narrowed to the model's `f32` input.
fn coerce(value: &Value, at: String) -> ServeResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() && (v as f32).is_finite() => Ok(v),
        Some(v) if v.is_finite() => Err(ServeError::validation(format!(
            "{} is too large for a 32-bit float: {}",
            at, value
        ))),
        _ => Err(ServeError::validation(format!(
            "{} is not a number: {}",
            at, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> RequestNormalizer {
        RequestNormalizer::new(Some(4))
    }

    fn message(err: ServeError) -> String {
        match err {
            ServeError::Validation(msg) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_single_sample_shorthand_matches_batch() {
        let single = normalizer()
            .normalize(&json!({"features": [5.1, 3.5, 1.4, 0.2]}))
            .unwrap();
        let batch = normalizer()
            .normalize(&json!({"features": [[5.1, 3.5, 1.4, 0.2]]}))
            .unwrap();

        assert_eq!(single, batch);
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_batch_preserves_row_order() {
        let batch = normalizer()
            .normalize(&json!({"features": [[5.1, 3.5, 1.4, 0.2], [6.2, 2.9, 4.3, 1.3]]}))
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rows()[0].values(), &[5.1, 3.5, 1.4, 0.2]);
        assert_eq!(batch.rows()[1].values(), &[6.2, 2.9, 4.3, 1.3]);
    }

    #[test]
    fn test_missing_features() {
        let err = normalizer().normalize(&json!({})).unwrap_err();
        assert_eq!(message(err), "missing features");

        let err = normalizer().normalize(&json!({"features": null})).unwrap_err();
        assert_eq!(message(err), "missing features");
    }

    #[test]
    fn test_non_object_body() {
        let err = normalizer().normalize(&json!([1, 2, 3, 4])).unwrap_err();
        assert_eq!(message(err), "request body must be a JSON object");
    }

    #[test]
    fn test_features_must_be_list() {
        for body in [
            json!({"features": "not-a-list"}),
            json!({"features": 5.1}),
            json!({"features": {"a": 1}}),
        ] {
            let err = normalizer().normalize(&body).unwrap_err();
            assert_eq!(message(err), "features must be a list");
        }
    }

    #[test]
    fn test_empty_features() {
        let err = normalizer().normalize(&json!({"features": []})).unwrap_err();
        assert_eq!(message(err), "features must be non-empty");
    }

    #[test]
    fn test_empty_inner_row() {
        let err = normalizer().normalize(&json!({"features": [[]]})).unwrap_err();
        assert_eq!(message(err), "features[0] must be non-empty");
    }

    #[test]
    fn test_non_numeric_value_is_named() {
        let err = normalizer()
            .normalize(&json!({"features": [5.1, "abc", 1.4, 0.2]}))
            .unwrap_err();
        let msg = message(err);
        assert!(msg.contains("features[1]"), "{}", msg);
        assert!(msg.contains("\"abc\""), "{}", msg);

        let err = normalizer()
            .normalize(&json!({"features": [[5.1, 3.5, 1.4, 0.2], [6.2, true, 4.3, 1.3]]}))
            .unwrap_err();
        let msg = message(err);
        assert!(msg.contains("features[1][1]"), "{}", msg);
        assert!(msg.contains("true"), "{}", msg);
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let batch = normalizer()
            .normalize(&json!({"features": ["5.1", "3.5", 1.4, 0.2]}))
            .unwrap();
        assert_eq!(batch.rows()[0].values(), &[5.1, 3.5, 1.4, 0.2]);
    }

    #[test]
    fn test_values_beyond_f32_range_rejected() {
        let err = normalizer()
            .normalize(&json!({"features": [1e300, 3.5, 1.4, 0.2]}))
            .unwrap_err();
        let msg = message(err);
        assert!(msg.starts_with("features[0] is too large"), "{}", msg);

        let err = normalizer()
            .normalize(&json!({"features": [[5.1, 3.5, 1.4, 0.2], [6.2, "-1e40", 4.3, 1.3]]}))
            .unwrap_err();
        assert!(message(err).starts_with("features[1][1] is too large"));

        // Largest f32 still passes
        let batch = normalizer()
            .normalize(&json!({"features": [3.4e38, 3.5, 1.4, 0.2]}))
            .unwrap();
        assert!(batch.to_f32_row_major().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_mixed_scalars_and_rows_rejected() {
        let err = normalizer()
            .normalize(&json!({"features": [[5.1, 3.5, 1.4, 0.2], 6.2]}))
            .unwrap_err();
        assert!(message(err).starts_with("features[1] must be a list"));
    }

    #[test]
    fn test_dimension_mismatch_names_lengths() {
        let err = normalizer()
            .normalize(&json!({"features": [[5.1, 3.5, 1.4], [6.2, 2.9, 4.3]]}))
            .unwrap_err();
        assert_eq!(message(err), "expected 4 features, got 3 (row 0)");
    }

    #[test]
    fn test_unknown_dimension_defers_check() {
        let batch = RequestNormalizer::new(None)
            .normalize(&json!({"features": [1.0, 2.0]}))
            .unwrap();
        assert_eq!(batch.n_features(), 2);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = RequestNormalizer::new(None)
            .normalize(&json!({"features": [[1.0, 2.0], [1.0]]}))
            .unwrap_err();
        assert!(message(err).contains("expected 2, got 1 (row 1)"));
    }
}
