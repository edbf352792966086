//! Colour backend registry.
//!
//! Resolves backend names to running backend instances. How backends are
//! discovered or loaded is up to the implementation; the coordinator only
//! needs the list of enabled names and a way to create one.

use async_trait::async_trait;
use parking_lot::Mutex;
use revue_core::defaults;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::backend::SharedBackend;
use crate::builtin::BuiltinBackend;
use crate::error::{ColourError, ColourResult};

/// Initialisation payload handed to a backend when it is created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendInit {
    pub viewport: String,
    pub window: Option<String>,
    /// Backend-specific settings, passed through untouched.
    pub config: serde_json::Value,
}

impl BackendInit {
    pub fn new(viewport: impl Into<String>) -> Self {
        Self {
            viewport: viewport.into(),
            ..Self::default()
        }
    }

    pub fn with_window(mut self, window: impl Into<String>) -> Self {
        self.window = Some(window.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// Source of colour backend instances.
#[async_trait]
pub trait BackendRegistry: Send + Sync {
    /// Names of the backends that are enabled and may be instantiated.
    async fn available(&self) -> Vec<String>;

    async fn instantiate(&self, name: &str, init: BackendInit) -> ColourResult<SharedBackend>;
}

type Factory = Arc<dyn Fn(&BackendInit) -> ColourResult<SharedBackend> + Send + Sync>;

/// Registry backed by an in-process table of factory functions.
#[derive(Default)]
pub struct StaticBackendRegistry {
    factories: Mutex<BTreeMap<String, Factory>>,
    attempts: Mutex<Vec<String>>,
}

impl std::fmt::Debug for StaticBackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticBackendRegistry")
            .field("backends", &self.factories.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StaticBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding only the builtin backend.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(defaults::BUILTIN_BACKEND, |_| {
            Ok(Arc::new(BuiltinBackend::new()) as SharedBackend)
        });
        registry
    }

    /// Add or replace the factory for `name`.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BackendInit) -> ColourResult<SharedBackend> + Send + Sync + 'static,
    {
        self.factories.lock().insert(name.into(), Arc::new(factory));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.factories.lock().remove(name).is_some()
    }

    /// Every name passed to `instantiate`, in call order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl BackendRegistry for StaticBackendRegistry {
    async fn available(&self) -> Vec<String> {
        self.factories.lock().keys().cloned().collect()
    }

    async fn instantiate(&self, name: &str, init: BackendInit) -> ColourResult<SharedBackend> {
        self.attempts.lock().push(name.to_string());
        let factory = self
            .factories
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ColourError::BackendNotFound(name.to_string()))?;
        debug!(backend = name, viewport = %init.viewport, "Instantiating colour backend");
        factory(&init)
    }
}
