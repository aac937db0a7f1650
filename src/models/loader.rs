//! ONNX model loader

use crate::config::{ModelConfig, ModelKind};
use crate::models::inference::{Model, ModelSource};
use crate::types::features::{FeatureBatch, RawOutput};
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{Tensor, ValueType};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Loaded ONNX model with the names needed to run it
pub struct OnnxModel {
    /// Model name
    name: String,
    /// ONNX Runtime session (runs need exclusive access)
    session: Mutex<Session>,
    /// Input name for the model
    input_name: String,
    /// Output read back as the prediction
    output_name: String,
    /// Feature count fixed by the input shape, if any
    n_features: Option<usize>,
}

impl OnnxModel {
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

impl Model for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn predict(&self, batch: &FeatureBatch) -> Result<Vec<RawOutput>> {
        let rows = batch.len();

        // Input tensor - shape [rows, n_features]
        let shape = vec![rows as i64, batch.n_features() as i64];
        let input_tensor = Tensor::from_array((shape, batch.to_f32_row_major()))
            .context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        let output = outputs
            .get(&self.output_name)
            .with_context(|| format!("Model produced no output named {}", self.output_name))?;

        // Classifiers export int64 labels, regressors float values
        let values: Vec<RawOutput> = if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
            data.iter().map(|&c| RawOutput::Class(c)).collect()
        } else if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
            data.iter().map(|&v| RawOutput::Value(v as f64)).collect()
        } else if let Ok((_, data)) = output.try_extract_tensor::<f64>() {
            data.iter().map(|&v| RawOutput::Value(v)).collect()
        } else {
            anyhow::bail!(
                "Unsupported output type {:?} for {}",
                output.dtype(),
                self.output_name
            );
        };

        debug!(model = %self.name, rows = rows, outputs = values.len(), "ONNX inference complete");

        Ok(values)
    }
}

/// Loader for ONNX models
pub struct OnnxModelLoader {
    /// Model file location
    path: PathBuf,
    /// Deployed model kind, used to pick the output
    kind: ModelKind,
    /// Explicit output name, overrides the kind-based choice
    output_name: Option<String>,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl OnnxModelLoader {
    /// Create a loader from the model section of the configuration
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::new(&config.path, config.kind, config.output_name.clone(), config.onnx_threads)
    }

    /// Create a new model loader with explicit settings
    pub fn new<P: AsRef<Path>>(
        path: P,
        kind: ModelKind,
        output_name: Option<String>,
        onnx_threads: usize,
    ) -> Result<Self> {
        // Initialize ONNX Runtime
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            kind,
            output_name,
            onnx_threads,
        })
    }

    /// Path the model is read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ONNX model from file
    pub fn load_model(&self) -> Result<OnnxModel> {
        let path = &self.path;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input = session
            .inputs
            .first()
            .context("Model declares no inputs")?;
        let input_name = input.name.clone();

        // [batch, features]; a positive second dimension is a fixed feature count
        let n_features = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape
                .get(1)
                .copied()
                .filter(|&d| d > 0)
                .map(|d| d as usize),
            _ => None,
        };

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let output_name = select_output(&output_names, self.kind, self.output_name.as_deref())?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            n_features = ?n_features,
            "Model loaded successfully"
        );

        Ok(OnnxModel {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
            n_features,
        })
    }
}

impl ModelSource for OnnxModelLoader {
    fn load(&self) -> Result<Option<Arc<dyn Model>>> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "Model file not found");
            return Ok(None);
        }
        let model = self.load_model()?;
        Ok(Some(Arc::new(model)))
    }
}

/// Choose which session output carries the prediction.
fn select_output(outputs: &[String], kind: ModelKind, configured: Option<&str>) -> Result<String> {
    if let Some(name) = configured {
        return outputs
            .iter()
            .find(|o| o.as_str() == name)
            .cloned()
            .with_context(|| format!("Configured output {} not found in {:?}", name, outputs));
    }

    let by_kind = match kind {
        ModelKind::Classifier => outputs.iter().find(|o| o.contains("label")),
        ModelKind::Regressor => None,
    };

    by_kind
        .or_else(|| outputs.first())
        .cloned()
        .context("Model declares no outputs")
}
