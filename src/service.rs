//! Request boundary: parsed body in, status and body out.
//!
//! Runs normalizer, invoker and response builder in order. Every error kind is
//! turned into a structured `{"error": ...}` reply here and nowhere else.

use crate::config::{ModelConfig, ModelKind};
use crate::error::{ServeError, ServeResult};
use crate::models::inference::{ModelHandle, ModelInvoker};
use crate::normalizer::RequestNormalizer;
use crate::response_builder::ResponseBuilder;
use crate::types::response::{PredictResponse, Reply};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Immutable prediction service shared by all request handlers.
pub struct PredictionService {
    normalizer: RequestNormalizer,
    invoker: ModelInvoker,
    builder: ResponseBuilder,
}

impl PredictionService {
    pub fn new(
        normalizer: RequestNormalizer,
        invoker: ModelInvoker,
        builder: ResponseBuilder,
    ) -> Self {
        Self {
            normalizer,
            invoker,
            builder,
        }
    }

    /// Wire the service for the configured model kind.
    pub fn from_config(handle: Arc<ModelHandle>, config: &ModelConfig) -> Self {
        Self::new(
            RequestNormalizer::new(config.n_features),
            ModelInvoker::new(handle),
            ResponseBuilder::from_config(config),
        )
    }

    pub fn model_handle(&self) -> &Arc<ModelHandle> {
        self.invoker.handle()
    }

    /// Health check. Always OK, whether or not a model is loaded.
    pub fn handle_health(&self) -> Reply {
        Reply::health()
    }

    /// Predict for an already decoded JSON body.
    pub fn handle_predict(&self, body: &Value) -> Reply {
        match self.predict(body) {
            Ok(response) => Reply::prediction(response),
            Err(err) => {
                if err.is_retryable() {
                    warn!(kind = err.kind(), error = %err, "Prediction unavailable");
                } else {
                    debug!(kind = err.kind(), error = %err, "Prediction rejected");
                }
                Reply::error(&err)
            }
        }
    }

    /// Predict for a raw request payload. An unset model is reported before
    /// the payload is decoded.
    pub fn handle_predict_bytes(&self, payload: &[u8]) -> Reply {
        if let Err(err) = self.invoker.acquire() {
            warn!(kind = err.kind(), error = %err, "Prediction unavailable");
            return Reply::error(&err);
        }

        match serde_json::from_slice::<Value>(payload) {
            Ok(body) => self.handle_predict(&body),
            Err(e) => Reply::error(&ServeError::validation(format!(
                "request body must be valid JSON: {}",
                e
            ))),
        }
    }

    /// Normalize, invoke and build. Availability is checked first so an unset
    /// model reports `ServiceUnavailable` for any request.
    pub fn predict(&self, body: &Value) -> ServeResult<PredictResponse> {
        let model = self.invoker.acquire()?;

        let expected = self
            .normalizer
            .expected_features()
            .or_else(|| model.n_features());
        let batch = self.normalizer.normalize_with(body, expected)?;

        if self.builder.kind() == ModelKind::Regressor && batch.len() != 1 {
            return Err(ServeError::validation(format!(
                "regression model accepts exactly one sample, got {}",
                batch.len()
            )));
        }

        let outputs = self.invoker.invoke(model.as_ref(), &batch)?;
        self.builder.build(&outputs, batch.len())
    }
}
