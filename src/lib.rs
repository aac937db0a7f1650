//! Prediction Service Library
//!
//! Serves a pre-trained classifier over NATS request/reply: callers send
//! feature vectors and get back predicted classes and their labels.

pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod producer;
pub mod response_builder;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use error::{ServeError, ServeResult};
pub use models::{Model, ModelHandle, ModelInvoker, ModelSource, OnnxModelLoader};
pub use normalizer::RequestNormalizer;
pub use producer::ReplyPublisher;
pub use response_builder::{LabelTable, ResponseBuilder};
pub use service::PredictionService;
pub use types::{FeatureBatch, FeatureVector, PredictResponse, RawOutput, Reply, StatusCategory};
