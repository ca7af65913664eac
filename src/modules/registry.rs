// ABOUTME: Module registry for centralized vendor module lookup
// ABOUTME: Registers built-in modules by feature flag and supports caller-provided vendors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

use super::AuthModule;
use crate::errors::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of available vendor modules
pub struct ModuleRegistry {
    modules: HashMap<&'static str, Arc<dyn AuthModule>>,
}

impl ModuleRegistry {
    /// Registry with all feature-enabled built-in modules registered
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();

        #[cfg(feature = "module-outreach")]
        registry.register(Arc::new(super::outreach::OutreachModule::from_env()));

        #[cfg(feature = "module-rollworks")]
        registry.register(Arc::new(super::rollworks::RollworksModule::from_env()));

        #[cfg(feature = "module-synthetic")]
        registry.register(Arc::new(super::synthetic::SyntheticModule::new()));

        let roster = registry.module_names().join(", ");
        info!(
            "Module registry initialized with {} module(s): [{roster}]",
            registry.modules.len()
        );

        registry
    }

    /// Registry with no modules registered
    #[must_use]
    pub fn empty() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Register a vendor module, replacing any previous module of the same name
    pub fn register(&mut self, module: Arc<dyn AuthModule>) {
        self.modules.insert(module.name(), module);
    }

    /// Look up a module by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn AuthModule>> {
        self.modules.get(name).cloned()
    }

    /// Look up a module by name, failing if it is not registered
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnsupportedModule`] for unknown names.
    pub fn require(&self, name: &str) -> AppResult<Arc<dyn AuthModule>> {
        self.get(name)
            .ok_or_else(|| AppError::UnsupportedModule(name.to_owned()))
    }

    /// Registered module names, sorted for stable output
    #[must_use]
    pub fn module_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.modules.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
