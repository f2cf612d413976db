//! Dependencies shared by the analysis and comparison engines.

use std::sync::Arc;

use crate::selector::ModelSelector;
use crate::storage::ReportStore;

/// Model selector and report store, composed into each engine.
#[derive(Clone)]
pub struct EngineCore {
    selector: ModelSelector,
    storage: Arc<dyn ReportStore>,
}

impl EngineCore {
    /// Create a new engine core.
    pub fn new(selector: ModelSelector, storage: Arc<dyn ReportStore>) -> Self {
        Self { selector, storage }
    }

    /// Get a reference to the model selector.
    #[inline]
    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    /// Get a reference to the report store.
    #[inline]
    pub fn storage(&self) -> &dyn ReportStore {
        self.storage.as_ref()
    }
}
