//! Maps raw model outputs to the reply body of the deployed model kind.

use crate::config::{ModelConfig, ModelKind};
use crate::error::{ServeError, ServeResult};
use crate::types::features::RawOutput;
use crate::types::response::PredictResponse;

/// Fixed class index to label lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for `index`; out of range means model and table disagree.
    pub fn label(&self, index: u64) -> ServeResult<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
            .ok_or_else(|| {
                ServeError::internal(format!(
                    "class index {} has no label (table has {} entries)",
                    index,
                    self.labels.len()
                ))
            })
    }
}

/// Builds the success body from raw outputs.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    kind: ModelKind,
    labels: Option<LabelTable>,
    model_version: String,
}

impl ResponseBuilder {
    pub fn classifier(labels: Option<LabelTable>) -> Self {
        Self {
            kind: ModelKind::Classifier,
            labels: labels.filter(|t| !t.is_empty()),
            model_version: String::new(),
        }
    }

    pub fn regressor(model_version: impl Into<String>) -> Self {
        Self {
            kind: ModelKind::Regressor,
            labels: None,
            model_version: model_version.into(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        match config.kind {
            ModelKind::Classifier => Self::classifier(Some(LabelTable::new(config.labels.clone()))),
            ModelKind::Regressor => Self::regressor(config.version.clone()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn labels(&self) -> Option<&LabelTable> {
        self.labels.as_ref()
    }

    /// Build the body for `outputs`, which must hold one entry per input row.
    pub fn build(&self, outputs: &[RawOutput], batch_len: usize) -> ServeResult<PredictResponse> {
        if outputs.len() != batch_len {
            return Err(ServeError::internal(format!(
                "model returned {} predictions for {} rows",
                outputs.len(),
                batch_len
            )));
        }

        match self.kind {
            ModelKind::Classifier => self.build_classification(outputs),
            ModelKind::Regressor => self.build_regression(outputs),
        }
    }

    fn build_classification(&self, outputs: &[RawOutput]) -> ServeResult<PredictResponse> {
        let predictions = outputs
            .iter()
            .map(|&o| class_index(o))
            .collect::<ServeResult<Vec<u64>>>()?;

        let labels = match &self.labels {
            Some(table) => Some(
                predictions
                    .iter()
                    .map(|&idx| table.label(idx).map(str::to_string))
                    .collect::<ServeResult<Vec<String>>>()?,
            ),
            None => None,
        };

        Ok(PredictResponse::Classification {
            predictions,
            labels,
        })
    }

    fn build_regression(&self, outputs: &[RawOutput]) -> ServeResult<PredictResponse> {
        let prediction = match outputs {
            [RawOutput::Value(v)] => *v,
            [RawOutput::Class(c)] => *c as f64,
            _ => {
                return Err(ServeError::internal(format!(
                    "regression model must produce exactly one value, got {}",
                    outputs.len()
                )))
            }
        };

        if !prediction.is_finite() {
            return Err(ServeError::internal(format!(
                "model produced a non-finite value: {}",
                prediction
            )));
        }

        Ok(PredictResponse::Regression {
            prediction,
            model_version: self.model_version.clone(),
        })
    }
}

/// Interpret a raw output as a class index. Float labels must be whole and non-negative.
fn class_index(output: RawOutput) -> ServeResult<u64> {
    match output {
        RawOutput::Class(c) => u64::try_from(c)
            .map_err(|_| ServeError::internal(format!("model produced negative class index {}", c))),
        RawOutput::Value(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as u64),
        RawOutput::Value(v) => Err(ServeError::internal(format!(
            "model produced {} where a class index was expected",
            v
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iris() -> ResponseBuilder {
        ResponseBuilder::classifier(Some(LabelTable::new(
            ["setosa", "versicolor", "virginica"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )))
    }

    #[test]
    fn test_labels_follow_prediction_order() {
        let body = iris()
            .build(&[RawOutput::Class(2), RawOutput::Class(0), RawOutput::Class(1)], 3)
            .unwrap();

        assert_eq!(
            body,
            PredictResponse::Classification {
                predictions: vec![2, 0, 1],
                labels: Some(vec![
                    "virginica".to_string(),
                    "setosa".to_string(),
                    "versicolor".to_string()
                ]),
            }
        );
    }

    #[test]
    fn test_label_mapping_is_stable() {
        let builder = iris();
        let table = builder.labels().unwrap();
        for _ in 0..3 {
            assert_eq!(table.label(1).unwrap(), "versicolor");
        }
    }

    #[test]
    fn test_out_of_range_index_is_internal() {
        let err = iris().build(&[RawOutput::Class(3)], 1).unwrap_err();
        assert_eq!(
            err,
            ServeError::internal("class index 3 has no label (table has 3 entries)")
        );
    }

    #[test]
    fn test_float_class_labels_accepted_when_integral() {
        let body = iris().build(&[RawOutput::Value(1.0)], 1).unwrap();
        assert_eq!(body.len(), 1);

        let err = iris().build(&[RawOutput::Value(1.5)], 1).unwrap_err();
        assert!(matches!(err, ServeError::Internal(_)));

        let err = iris().build(&[RawOutput::Class(-1)], 1).unwrap_err();
        assert!(matches!(err, ServeError::Internal(_)));
    }

    #[test]
    fn test_no_label_table_omits_labels() {
        let body = ResponseBuilder::classifier(None)
            .build(&[RawOutput::Class(7)], 1)
            .unwrap();
        assert_eq!(
            body,
            PredictResponse::Classification {
                predictions: vec![7],
                labels: None,
            }
        );
    }

    #[test]
    fn test_count_mismatch_is_internal() {
        let err = iris().build(&[RawOutput::Class(0)], 2).unwrap_err();
        assert!(matches!(err, ServeError::Internal(_)));
    }

    #[test]
    fn test_regression_shape() {
        let body = ResponseBuilder::regressor("v1")
            .build(&[RawOutput::Value(151.25)], 1)
            .unwrap();
        assert_eq!(
            body,
            PredictResponse::Regression {
                prediction: 151.25,
                model_version: "v1".to_string(),
            }
        );
    }

    #[test]
    fn test_regression_rejects_non_finite() {
        let err = ResponseBuilder::regressor("v1")
            .build(&[RawOutput::Value(f64::NAN)], 1)
            .unwrap_err();
        assert!(matches!(err, ServeError::Internal(_)));
    }
}
