use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::{CpuBackend, StubBackend};
use crate::config::DetectorSettings;

/// Constructor for a named backend.
pub type BackendFactory = fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>>;

/// Registry of detector backends by name.
///
/// Backends are built on demand so that an unused model is never loaded.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("cpu", |_| Ok(Box::new(CpuBackend::new())));
        registry.register("stub", |_| Ok(Box::new(StubBackend::new())));
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let backend = super::backends::TractBackend::new(
                &settings.model_path,
                settings.input_size,
            )?
            .with_iou_threshold(settings.iou_threshold);
            Ok(Box::new(backend))
        });
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register(&mut self, name: &str, factory: BackendFactory) {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), factory);
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the backend registered under `name`.
    pub fn build(
        &self,
        name: &str,
        settings: &DetectorSettings,
    ) -> Result<Box<dyn DetectorBackend>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "detector backend '{}' is not available in this build (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        factory(settings)
    }

    /// Build the default backend.
    pub fn build_default(&self, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no detector backends registered"))?;
        self.build(name, settings)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
