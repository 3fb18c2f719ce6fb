//! # Component Registry
//!
//! The validated, immutable set of components the controller reconciles.
//! Construction checks names and dependencies and caches the reconciliation
//! order; nothing about the graph is recomputed per pass.

use std::collections::HashSet;

use crate::component::{Component, ConfigurationError};
use crate::controller::dependency::resolve_order;

/// Registered components plus their cached reconciliation order
#[derive(Debug)]
pub struct ComponentRegistry {
    components: Vec<Component>,
    order: Vec<usize>,
}

impl ComponentRegistry {
    /// Validate and register components
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for duplicate names, unknown
    /// dependencies or dependency cycles.
    pub fn new(components: Vec<Component>) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::with_capacity(components.len());
        for component in &components {
            if !seen.insert(component.name()) {
                return Err(ConfigurationError::DuplicateName {
                    name: component.name().to_string(),
                });
            }
        }
        let order = resolve_order(&components)?;
        Ok(Self { components, order })
    }

    /// Components in reconciliation order
    pub fn ordered(&self) -> impl Iterator<Item = &Component> {
        self.order.iter().map(|&i| &self.components[i])
    }

    /// Component names in reconciliation order
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.ordered().map(Component::name).collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name() == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
