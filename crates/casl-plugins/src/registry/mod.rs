//! In-memory store of plugin units for one run.
//!
//! The [`PluginRegistry`] owns every [`PluginUnit`] keyed by id, stamps each
//! with a monotonic insertion index at registration, and exposes the
//! activation and priority mutations the host applies before scheduling.
//! It is not synchronised; mutation happens before the run starts.

use std::collections::BTreeMap;

use crate::error::PluginError;
use crate::unit::{PluginMetadata, PluginUnit};

/// Row returned by [`PluginRegistry::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry<'a> {
    /// Plugin id.
    pub id: &'a str,
    /// Plugin metadata.
    pub metadata: &'a PluginMetadata,
    /// Whether the plugin is active.
    pub active: bool,
    /// Current priority.
    pub priority: i32,
}

/// Registry of plugin units.
///
/// # Example
///
/// ```
/// use casl_plugins::{FnHook, HookError, PhaseContext, PluginMetadata, PluginRegistry, PluginUnit};
///
/// let mut registry = PluginRegistry::new();
/// let meta = PluginMetadata::new("headers").expect("valid id");
/// let hook = FnHook::new(|_: &PhaseContext| Ok::<(), HookError>(()));
/// registry.add(PluginUnit::in_process(meta, hook)).expect("unique id");
/// assert!(registry.disable("headers"));
/// assert!(registry.list(false, None).is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    units: BTreeMap<String, PluginUnit>,
    next_index: u64,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a unit, stamping its insertion index.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicateId`] if the id is already present.
    pub fn add(&mut self, mut unit: PluginUnit) -> Result<(), PluginError> {
        let id = unit.id().to_owned();
        if self.units.contains_key(&id) {
            return Err(PluginError::DuplicateId { id });
        }
        unit.set_insertion_index(self.next_index);
        self.next_index += 1;
        self.units.insert(id, unit);
        Ok(())
    }

    /// Removes a unit, returning `true` if it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        self.units.remove(id).is_some()
    }

    /// Activates a unit, returning `false` if the id is unknown.
    pub fn enable(&mut self, id: &str) -> bool {
        self.update(id, |unit| unit.set_active(true))
    }

    /// Deactivates a unit, returning `false` if the id is unknown.
    pub fn disable(&mut self, id: &str) -> bool {
        self.update(id, |unit| unit.set_active(false))
    }

    /// Changes a unit's priority, returning `false` if the id is unknown.
    pub fn set_priority(&mut self, id: &str, priority: i32) -> bool {
        self.update(id, |unit| unit.set_priority(priority))
    }

    /// Looks up a unit by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PluginUnit> {
        self.units.get(id)
    }

    /// Whether a unit with the id is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    /// Lists units sorted by `(priority, id)`.
    ///
    /// Inactive units are omitted unless `include_inactive` is set. With a
    /// tag filter only units carrying that tag (case-insensitive) are listed.
    #[must_use]
    pub fn list(&self, include_inactive: bool, tag_filter: Option<&str>) -> Vec<RegistryEntry<'_>> {
        let tag = tag_filter.map(|tag| tag.trim().to_lowercase());
        let mut entries: Vec<RegistryEntry<'_>> = self
            .units
            .values()
            .filter(|unit| include_inactive || unit.is_active())
            .filter(|unit| {
                tag.as_ref()
                    .is_none_or(|tag| unit.metadata().tags().contains(tag))
            })
            .map(|unit| RegistryEntry {
                id: unit.id(),
                metadata: unit.metadata(),
                active: unit.is_active(),
                priority: unit.priority(),
            })
            .collect();
        entries.sort_by(|left, right| (left.priority, left.id).cmp(&(right.priority, right.id)));
        entries
    }

    /// Active units in id order.
    #[must_use]
    pub fn active_units(&self) -> Vec<&PluginUnit> {
        self.units.values().filter(|unit| unit.is_active()).collect()
    }

    /// Iterates over all units in id order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginUnit> {
        self.units.values()
    }

    /// Number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` when no units are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn update(&mut self, id: &str, change: impl FnOnce(&mut PluginUnit)) -> bool {
        match self.units.get_mut(id) {
            Some(unit) => {
                change(unit);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests;
