//! Type definitions for the prediction service

pub mod features;
pub mod response;

pub use features::{FeatureBatch, FeatureVector, RawOutput};
pub use response::{PredictResponse, Reply, StatusCategory};
