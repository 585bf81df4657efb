//! RuntimeOptions - process-wide option flags
//!
//! String key/value options (seeded from config or persisted options) shared
//! via `Arc` between the CLI, the orchestrator and the demo-mode gate.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Key of the outbound suppression flag
pub const DEMO_MODE: &str = "demo_mode";

/// Runtime option store
#[derive(Debug, Default)]
pub struct RuntimeOptions {
    values: RwLock<HashMap<String, String>>,
}

impl RuntimeOptions {
    /// Create empty option store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed demo mode
    pub fn with_demo_mode(demo_mode: bool) -> Self {
        let options = Self::new();
        options.set_demo_mode(demo_mode);
        options
    }

    /// Raw option value
    pub fn get_value(&self, name: &str) -> Option<String> {
        self.values.read().get(name).cloned()
    }

    /// Boolean option; only `"1"` counts as true
    pub fn get_boolean(&self, name: &str) -> bool {
        self.values.read().get(name).is_some_and(|v| v == "1")
    }

    /// Set option value
    pub fn set_value(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(name.into(), value.into());
    }

    /// Whether outbound publishing is suppressed
    pub fn demo_mode(&self) -> bool {
        self.get_boolean(DEMO_MODE)
    }

    pub fn set_demo_mode(&self, enabled: bool) {
        self.set_value(DEMO_MODE, if enabled { "1" } else { "0" });
    }
}
