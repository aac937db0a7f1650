//! Feature matrix and raw model output types

use crate::error::{ServeError, ServeResult};
use serde::Serialize;

/// One sample's numeric attributes, in the order the model expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Non-empty, rectangular batch of samples (rows = samples, columns = features).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureBatch {
    rows: Vec<FeatureVector>,
}

impl FeatureBatch {
    /// Build a batch, checking it is non-empty and every row has the same length.
    pub fn new(rows: Vec<FeatureVector>) -> ServeResult<Self> {
        let first = rows
            .first()
            .ok_or_else(|| ServeError::validation("features must be non-empty"))?;
        let width = first.len();
        if width == 0 {
            return Err(ServeError::validation("row 0 must be non-empty"));
        }

        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ServeError::validation(format!(
                "all rows must have the same length: expected {}, got {} (row {})",
                width,
                row.len(),
                idx
            )));
        }

        Ok(Self { rows })
    }

    /// Batch of a single sample.
    pub fn single(row: FeatureVector) -> ServeResult<Self> {
        Self::new(vec![row])
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of features per sample.
    pub fn n_features(&self) -> usize {
        self.rows.first().map(FeatureVector::len).unwrap_or(0)
    }

    /// Row-major `f32` copy of the matrix, the layout ONNX tensors take.
    pub fn to_f32_row_major(&self) -> Vec<f32> {
        self.rows
            .iter()
            .flat_map(|row| row.values().iter().map(|&v| v as f32))
            .collect()
    }
}

/// One raw model output per input row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawOutput {
    /// Discrete class index emitted by a classifier.
    Class(i64),
    /// Scalar emitted by a regressor (or a classifier exporting float labels).
    Value(f64),
}
