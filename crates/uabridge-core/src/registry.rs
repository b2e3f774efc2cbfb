// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Label registry.
//!
//! A [`LabelRegistry`] correlates the opaque subscription ids handed out by
//! the device bus with the stable labels used as node identities. There is
//! one registry per [`DeviceClass`]; both live in [`Registries`], which the
//! lifecycle controller rebuilds on every provisioning cycle.
//!
//! Entries are a single ordered collection of `(label, subscription)`
//! records, indexed by unit number. A slot whose subscription failed keeps
//! its label but has no id, so it can never be the target of a notification.
//!
//! # Example
//!
//! ```
//! use uabridge_core::registry::{LabelRegistry, Resolution};
//! use uabridge_core::types::{DeviceClass, SubscriptionId};
//!
//! let mut registry = LabelRegistry::create(DeviceClass::Temperature, 2);
//! registry.bind(1, SubscriptionId::new(42)).unwrap();
//!
//! match registry.resolve(SubscriptionId::new(42)) {
//!     Resolution::Resolved(label) => assert_eq!(label.as_str(), "temperature 1"),
//!     Resolution::Unresolved => unreachable!(),
//! }
//! assert!(registry.resolve(SubscriptionId::new(7)).is_unresolved());
//! ```

use std::collections::HashSet;

use crate::error::RegistryError;
use crate::types::{DeviceClass, Label, SubscriptionId};

// =============================================================================
// RegistryEntry
// =============================================================================

/// A single registry slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    label: Label,
    subscription: Option<SubscriptionId>,
}

impl RegistryEntry {
    /// Returns the entry label.
    #[inline]
    pub fn label(&self) -> &Label {
        &self.label
    }

    /// Returns the bound subscription id, if any.
    #[inline]
    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    /// Returns `true` if a subscription id has been bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.subscription.is_some()
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Outcome of resolving a subscription id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The id is bound to this label.
    Resolved(&'a Label),
    /// No entry carries the id.
    Unresolved,
}

impl<'a> Resolution<'a> {
    /// Returns the label if resolved.
    #[inline]
    pub fn label(&self) -> Option<&'a Label> {
        match self {
            Self::Resolved(label) => Some(label),
            Self::Unresolved => None,
        }
    }

    /// Returns `true` if the id was not found.
    #[inline]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

// =============================================================================
// LabelRegistry
// =============================================================================

/// Maps subscription ids to labels for one device class.
#[derive(Debug, Clone)]
pub struct LabelRegistry {
    class: DeviceClass,
    entries: Vec<RegistryEntry>,
}

impl LabelRegistry {
    /// Creates a registry of `count` entries with generated labels and no
    /// subscription ids.
    pub fn create(class: DeviceClass, count: usize) -> Self {
        let entries = (0..count)
            .map(|index| RegistryEntry {
                label: Label::generate(class, index),
                subscription: None,
            })
            .collect();

        Self { class, entries }
    }

    /// Returns the device class of this registry.
    #[inline]
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the label of entry `index`.
    pub fn label(&self, index: usize) -> Option<&Label> {
        self.entries.get(index).map(|e| &e.label)
    }

    /// Returns the subscription id bound to entry `index`.
    pub fn subscription(&self, index: usize) -> Option<SubscriptionId> {
        self.entries.get(index).and_then(|e| e.subscription)
    }

    /// Returns all entries in index order.
    #[inline]
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Returns the number of entries with a bound subscription.
    pub fn bound_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_bound()).count()
    }

    /// Records the subscription id assigned to entry `index`.
    ///
    /// Each entry is bound at most once, and an id may only appear once in
    /// the registry.
    pub fn bind(&mut self, index: usize, id: SubscriptionId) -> Result<(), RegistryError> {
        let size = self.entries.len();

        if let Some(holder) = self.entries.iter().find(|e| e.subscription == Some(id)) {
            return Err(RegistryError::DuplicateSubscription {
                id,
                label: holder.label.clone(),
            });
        }

        let entry = self
            .entries
            .get_mut(index)
            .ok_or(RegistryError::IndexOutOfRange { index, size })?;

        if let Some(existing) = entry.subscription {
            return Err(RegistryError::AlreadyBound {
                label: entry.label.clone(),
                existing,
            });
        }

        entry.subscription = Some(id);
        Ok(())
    }

    /// Resolves a subscription id to its label.
    pub fn resolve(&self, id: SubscriptionId) -> Resolution<'_> {
        self.entries
            .iter()
            .find(|e| e.subscription == Some(id))
            .map_or(Resolution::Unresolved, |e| Resolution::Resolved(&e.label))
    }

    /// Releases all entries. Calling this on an empty registry is a no-op.
    pub fn destroy(&mut self) {
        self.entries = Vec::new();
    }
}

// =============================================================================
// Registries
// =============================================================================

/// The registries of one provisioning cycle.
///
/// A class whose count query failed has no registry at all. Ids bound in
/// earlier cycles are kept as retired: the bus never cancels a
/// subscription, so they keep arriving after a restart.
#[derive(Debug, Clone, Default)]
pub struct Registries {
    temperature: Option<LabelRegistry>,
    ports: Option<LabelRegistry>,
    retired: HashSet<(DeviceClass, SubscriptionId)>,
}

impl Registries {
    /// Creates an empty set of registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry for a class.
    pub fn get(&self, class: DeviceClass) -> Option<&LabelRegistry> {
        match class {
            DeviceClass::Temperature => self.temperature.as_ref(),
            DeviceClass::Port => self.ports.as_ref(),
        }
    }

    /// Installs the registry for its class, replacing any previous one.
    pub fn insert(&mut self, registry: LabelRegistry) {
        match registry.class() {
            DeviceClass::Temperature => self.temperature = Some(registry),
            DeviceClass::Port => self.ports = Some(registry),
        }
    }

    /// Resolves a subscription id against the registry of `class`.
    pub fn resolve(&self, class: DeviceClass, id: SubscriptionId) -> Resolution<'_> {
        self.get(class)
            .map_or(Resolution::Unresolved, |registry| registry.resolve(id))
    }

    /// Returns the size of the registry for `class`, or `None` if absent.
    pub fn size(&self, class: DeviceClass) -> Option<usize> {
        self.get(class).map(LabelRegistry::len)
    }

    /// Releases every registry.
    pub fn clear(&mut self) {
        for registry in [self.temperature.as_mut(), self.ports.as_mut()]
            .into_iter()
            .flatten()
        {
            registry.destroy();
        }
        self.temperature = None;
        self.ports = None;
    }

    /// Returns `true` if no registry is installed.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.ports.is_none()
    }

    /// Releases every registry and remembers its bound ids as retired.
    pub fn retire(&mut self) {
        for registry in [self.temperature.as_ref(), self.ports.as_ref()]
            .into_iter()
            .flatten()
        {
            let class = registry.class();
            self.retired.extend(
                registry
                    .entries()
                    .iter()
                    .filter_map(RegistryEntry::subscription)
                    .map(|id| (class, id)),
            );
        }
        self.clear();
    }

    /// Takes over the retired ids of `previous`, except those bound again
    /// in this cycle.
    pub fn inherit_retired(&mut self, previous: Registries) {
        let live: HashSet<_> = [self.temperature.as_ref(), self.ports.as_ref()]
            .into_iter()
            .flatten()
            .flat_map(|registry| {
                let class = registry.class();
                registry
                    .entries()
                    .iter()
                    .filter_map(RegistryEntry::subscription)
                    .map(move |id| (class, id))
            })
            .collect();
        self.retired
            .extend(previous.retired.into_iter().filter(|key| !live.contains(key)));
    }

    /// Returns `true` if `id` was bound for `class` in an earlier cycle.
    pub fn is_retired(&self, class: DeviceClass, id: SubscriptionId) -> bool {
        self.retired.contains(&(class, id))
    }

    /// Returns the number of retired ids.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_generates_labels() {
        let registry = LabelRegistry::create(DeviceClass::Port, 3);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.label(0).unwrap().as_str(), "port 0");
        assert_eq!(registry.label(2).unwrap().as_str(), "port 2");
        assert!(registry.entries().iter().all(|e| !e.is_bound()));
        assert!(registry.entries().iter().all(|e| !e.label().is_empty()));
    }

    #[test]
    fn test_labels_are_distinct() {
        let registry = LabelRegistry::create(DeviceClass::Temperature, 64);
        let labels: HashSet<_> = registry.entries().iter().map(|e| e.label().clone()).collect();
        assert_eq!(labels.len(), 64);
    }

    #[test]
    fn test_bind_and_resolve_every_entry() {
        let mut registry = LabelRegistry::create(DeviceClass::Temperature, 5);
        for i in 0..5 {
            registry.bind(i, SubscriptionId::new(100 + i as u32)).unwrap();
        }
        for i in 0..5 {
            let resolved = registry.resolve(SubscriptionId::new(100 + i as u32));
            assert_eq!(resolved.label(), registry.label(i));
        }
        assert_eq!(registry.bound_count(), 5);
    }

    #[test]
    fn test_unbound_id_is_unresolved() {
        let mut registry = LabelRegistry::create(DeviceClass::Temperature, 2);
        registry.bind(0, SubscriptionId::new(1)).unwrap();
        assert!(registry.resolve(SubscriptionId::new(2)).is_unresolved());
        // Unbound slots never match id 0.
        assert!(registry.resolve(SubscriptionId::new(0)).is_unresolved());
    }

    #[test]
    fn test_bind_out_of_range() {
        let mut registry = LabelRegistry::create(DeviceClass::Port, 1);
        assert_eq!(
            registry.bind(3, SubscriptionId::new(9)),
            Err(RegistryError::IndexOutOfRange { index: 3, size: 1 })
        );
    }

    #[test]
    fn test_bind_twice_rejected() {
        let mut registry = LabelRegistry::create(DeviceClass::Port, 2);
        registry.bind(0, SubscriptionId::new(9)).unwrap();
        assert!(matches!(
            registry.bind(0, SubscriptionId::new(10)),
            Err(RegistryError::AlreadyBound { .. })
        ));
        assert!(matches!(
            registry.bind(1, SubscriptionId::new(9)),
            Err(RegistryError::DuplicateSubscription { .. })
        ));
        assert_eq!(registry.subscription(1), None);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut registry = LabelRegistry::create(DeviceClass::Port, 4);
        registry.destroy();
        assert!(registry.is_empty());
        registry.destroy();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registries_routing() {
        let mut temps = LabelRegistry::create(DeviceClass::Temperature, 1);
        temps.bind(0, SubscriptionId::new(5)).unwrap();
        let mut ports = LabelRegistry::create(DeviceClass::Port, 1);
        ports.bind(0, SubscriptionId::new(5)).unwrap();

        let mut registries = Registries::new();
        registries.insert(temps);
        registries.insert(ports);

        assert_eq!(
            registries.resolve(DeviceClass::Temperature, SubscriptionId::new(5)).label().unwrap().as_str(),
            "temperature 0"
        );
        assert_eq!(
            registries.resolve(DeviceClass::Port, SubscriptionId::new(5)).label().unwrap().as_str(),
            "port 0"
        );

        registries.clear();
        assert!(registries.is_empty());
        assert!(registries.resolve(DeviceClass::Port, SubscriptionId::new(5)).is_unresolved());
    }

    #[test]
    fn test_missing_registry_is_unresolved() {
        let registries = Registries::new();
        assert_eq!(registries.size(DeviceClass::Temperature), None);
        assert!(registries.resolve(DeviceClass::Temperature, SubscriptionId::new(1)).is_unresolved());
    }

    #[test]
    fn test_retired_ids_survive_a_new_cycle() {
        let mut temps = LabelRegistry::create(DeviceClass::Temperature, 2);
        temps.bind(0, SubscriptionId::new(1)).unwrap();
        temps.bind(1, SubscriptionId::new(2)).unwrap();
        let mut previous = Registries::new();
        previous.insert(temps);

        previous.retire();
        assert!(previous.is_empty());
        assert!(previous.is_retired(DeviceClass::Temperature, SubscriptionId::new(1)));
        assert!(!previous.is_retired(DeviceClass::Port, SubscriptionId::new(1)));

        // The bus hands id 2 out again; it is live, not retired.
        let mut temps = LabelRegistry::create(DeviceClass::Temperature, 1);
        temps.bind(0, SubscriptionId::new(2)).unwrap();
        let mut current = Registries::new();
        current.insert(temps);
        current.inherit_retired(previous);

        assert_eq!(current.retired_count(), 1);
        assert!(current.is_retired(DeviceClass::Temperature, SubscriptionId::new(1)));
        assert!(!current.is_retired(DeviceClass::Temperature, SubscriptionId::new(2)));
        assert!(current.resolve(DeviceClass::Temperature, SubscriptionId::new(2)).label().is_some());
    }
}
