//! ML model loading and invocation

pub mod inference;
pub mod loader;

pub use inference::{Model, ModelHandle, ModelInvoker, ModelSource};
pub use loader::{OnnxModel, OnnxModelLoader};
