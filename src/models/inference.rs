//! Model capability, load-once handle and the invoker used per request

use crate::error::{ServeError, ServeResult};
use crate::types::features::{FeatureBatch, RawOutput};
use anyhow::Result;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// A loaded, read-only model. One raw output per input row, in row order.
pub trait Model: Send + Sync {
    /// Human-readable identifier used in logs.
    fn name(&self) -> &str;

    /// Feature count the model expects, when it is fixed by the model itself.
    fn n_features(&self) -> Option<usize> {
        None
    }

    /// Predict the whole batch in one call.
    fn predict(&self, batch: &FeatureBatch) -> Result<Vec<RawOutput>>;
}

/// Where models come from. `Ok(None)` means there is nothing to load yet.
pub trait ModelSource: Send + Sync {
    fn load(&self) -> Result<Option<Arc<dyn Model>>>;
}

/// Process-wide "model loaded / not loaded" slot.
///
/// Built by the bootstrap and handed to the service. Once set, the model is
/// never replaced. With on-demand loading, an unset handle attempts a load
/// when a request arrives; concurrent first requests share a single attempt.
pub struct ModelHandle {
    model: RwLock<Option<Arc<dyn Model>>>,
    source: Option<Box<dyn ModelSource>>,
    load_on_demand: bool,
}

impl ModelHandle {
    /// A handle that never gets a model.
    pub fn empty() -> Self {
        Self {
            model: RwLock::new(None),
            source: None,
            load_on_demand: false,
        }
    }

    /// A handle with an already loaded model.
    pub fn loaded(model: Arc<dyn Model>) -> Self {
        Self {
            model: RwLock::new(Some(model)),
            source: None,
            load_on_demand: false,
        }
    }

    /// A handle that loads from `source` on the first request that needs it.
    pub fn lazy(source: Box<dyn ModelSource>) -> Self {
        Self {
            model: RwLock::new(None),
            source: Some(source),
            load_on_demand: true,
        }
    }

    /// Load from `source` now. A failed or empty load leaves the handle unset;
    /// `load_on_demand` decides whether later requests try again.
    pub fn eager(source: Box<dyn ModelSource>, load_on_demand: bool) -> Self {
        let handle = Self {
            model: RwLock::new(None),
            source: Some(source),
            load_on_demand,
        };
        if !handle.try_load() {
            warn!(
                load_on_demand = load_on_demand,
                "Model not loaded at startup, prediction requests will be rejected until it is"
            );
        }
        handle
    }

    /// Whether a model is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.read_slot().is_some()
    }

    /// Current model, loading it first if allowed.
    pub fn get(&self) -> Option<Arc<dyn Model>> {
        if let Some(model) = self.current() {
            return Some(model);
        }
        if self.load_on_demand && self.try_load() {
            return self.current();
        }
        None
    }

    fn current(&self) -> Option<Arc<dyn Model>> {
        self.read_slot().clone()
    }

    // A load that panicked under the write lock leaves the slot unset, so a
    // poisoned lock still holds a usable value.
    fn read_slot(&self) -> RwLockReadGuard<'_, Option<Arc<dyn Model>>> {
        self.model.read().unwrap_or_else(|e| {
            warn!(error = %e, "Model slot lock poisoned");
            e.into_inner()
        })
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Option<Arc<dyn Model>>> {
        self.model.write().unwrap_or_else(|e| {
            warn!(error = %e, "Model slot lock poisoned");
            e.into_inner()
        })
    }

    /// Attempt one load. Returns true if a model is set afterwards.
    fn try_load(&self) -> bool {
        let Some(source) = &self.source else {
            return false;
        };

        let mut slot = self.write_slot();

        // Another request may have finished loading while we waited for the lock
        if slot.is_some() {
            return true;
        }

        match source.load() {
            Ok(Some(model)) => {
                info!(model = %model.name(), n_features = ?model.n_features(), "Model loaded");
                *slot = Some(model);
                true
            }
            Ok(None) => {
                warn!("Model file not found");
                false
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Failed to load model");
                false
            }
        }
    }
}

/// Runs the model on a normalized batch.
pub struct ModelInvoker {
    handle: Arc<ModelHandle>,
}

impl ModelInvoker {
    pub fn new(handle: Arc<ModelHandle>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    /// Model to serve this request with, or `ServiceUnavailable`.
    pub fn acquire(&self) -> ServeResult<Arc<dyn Model>> {
        self.handle.get().ok_or_else(ServeError::model_not_loaded)
    }

    /// One batched `predict` call. Model failures become `InvalidInput`.
    pub fn invoke(&self, model: &dyn Model, batch: &FeatureBatch) -> ServeResult<Vec<RawOutput>> {
        let outputs = model
            .predict(batch)
            .map_err(|e| ServeError::invalid_input(format!("{:#}", e)))?;

        debug!(
            model = %model.name(),
            rows = batch.len(),
            outputs = outputs.len(),
            "Model invocation complete"
        );

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::features::FeatureVector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ConstantModel;

    impl Model for ConstantModel {
        fn name(&self) -> &str {
            "constant"
        }

        fn predict(&self, batch: &FeatureBatch) -> Result<Vec<RawOutput>> {
            Ok(vec![RawOutput::Class(1); batch.len()])
        }
    }

    struct FailingModel;

    impl Model for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        fn predict(&self, _batch: &FeatureBatch) -> Result<Vec<RawOutput>> {
            anyhow::bail!("X has 3 features, but model is expecting 4 features as input")
        }
    }

    struct CountingSource {
        loads: AtomicUsize,
        available: bool,
    }

    impl ModelSource for CountingSource {
        fn load(&self) -> Result<Option<Arc<dyn Model>>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            if self.available {
                Ok(Some(Arc::new(ConstantModel)))
            } else {
                Ok(None)
            }
        }
    }

    impl ModelSource for Arc<CountingSource> {
        fn load(&self) -> Result<Option<Arc<dyn Model>>> {
            self.as_ref().load()
        }
    }

    /// Panics on the first load, succeeds afterwards.
    struct PanicOnceSource {
        loads: AtomicUsize,
    }

    impl ModelSource for PanicOnceSource {
        fn load(&self) -> Result<Option<Arc<dyn Model>>> {
            if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("loader crashed");
            }
            Ok(Some(Arc::new(ConstantModel)))
        }
    }

    fn batch() -> FeatureBatch {
        FeatureBatch::single(FeatureVector::new(vec![5.1, 3.5, 1.4, 0.2])).unwrap()
    }

    #[test]
    fn test_unset_model_is_unavailable() {
        let invoker = ModelInvoker::new(Arc::new(ModelHandle::empty()));
        let err = invoker.acquire().err().unwrap();
        assert_eq!(err, ServeError::model_not_loaded());
    }

    #[test]
    fn test_model_error_becomes_invalid_input() {
        let invoker = ModelInvoker::new(Arc::new(ModelHandle::loaded(Arc::new(FailingModel))));
        let model = invoker.acquire().unwrap();
        let err = invoker.invoke(model.as_ref(), &batch()).unwrap_err();
        assert!(matches!(err, ServeError::InvalidInput(_)));
        assert!(err.to_string().contains("expecting 4 features"));
    }

    #[test]
    fn test_lazy_load_happens_once_under_contention() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            available: true,
        });
        let handle = Arc::new(ModelHandle::lazy(Box::new(source.clone())));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let handle = handle.clone();
                s.spawn(move || {
                    assert!(handle.get().is_some());
                });
            }
        });

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert!(handle.is_loaded());
    }

    #[test]
    fn test_missing_file_leaves_handle_unset() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            available: false,
        });
        let handle = ModelHandle::eager(Box::new(source.clone()), false);

        assert!(!handle.is_loaded());
        assert!(handle.get().is_none());
        // No on-demand retries
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poisoned_slot_is_recovered() {
        let handle = ModelHandle::lazy(Box::new(PanicOnceSource {
            loads: AtomicUsize::new(0),
        }));

        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handle.get()));
        assert!(crashed.is_err());
        assert!(handle.model.is_poisoned());

        // Still reported as unset, and the next request loads normally
        assert!(!handle.is_loaded());
        assert!(handle.get().is_some());
        assert!(handle.is_loaded());
    }

    #[test]
    fn test_on_demand_retries_after_failed_startup_load() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            available: false,
        });
        let handle = ModelHandle::eager(Box::new(source.clone()), true);

        assert!(handle.get().is_none());
        assert!(handle.get().is_none());
        assert_eq!(source.loads.load(Ordering::SeqCst), 3);
    }
}
