use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::FaceDetectorBackend;
use super::backends::{CenterBackend, NoneBackend};

/// Registry of local face detector backends, keyed by name.
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn FaceDetectorBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with the built-in backends; `none` is the default.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(NoneBackend);
        registry.register(CenterBackend::default());
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: FaceDetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove and return a backend by name, warmed up and ready to use.
    pub fn take(&mut self, name: &str) -> Result<Box<dyn FaceDetectorBackend>> {
        let mut backend = self.backends.remove(name).ok_or_else(|| {
            anyhow!(
                "unknown face detector '{}'; available: {}",
                name,
                self.list().join(", ")
            )
        })?;
        backend.warm_up()?;
        Ok(backend)
    }

    /// Remove and return the default backend.
    pub fn take_default(&mut self) -> Result<Box<dyn FaceDetectorBackend>> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| anyhow!("no face detector registered"))?;
        self.take(&name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
