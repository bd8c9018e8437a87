//! Per-participant storage of the guards moved off instrumented routes.

use crate::guard::Guard;
use crate::route::RouteId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Activation and deactivation guards for one route configuration.
#[derive(Clone, Default)]
pub struct RouteGuards {
    pub activation: Vec<Arc<dyn Guard>>,
    pub deactivation: Vec<Arc<dyn Guard>>,
}

impl RouteGuards {
    pub fn is_empty(&self) -> bool {
        self.activation.is_empty() && self.deactivation.is_empty()
    }
}

/// Route identity to guard lists. Entries are added and merged, never removed.
#[derive(Default)]
pub struct GuardRegistry {
    entries: RwLock<HashMap<RouteId, RouteGuards>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append guards for `route`, keeping anything already registered.
    pub fn register(&self, route: RouteId, guards: RouteGuards) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(route).or_default();
        entry.activation.extend(guards.activation);
        entry.deactivation.extend(guards.deactivation);
        tracing::debug!(
            "registered guards for {}: {} activation, {} deactivation",
            route,
            entry.activation.len(),
            entry.deactivation.len()
        );
    }

    pub fn activation_guards(&self, route: RouteId) -> Vec<Arc<dyn Guard>> {
        self.read(route, |g| g.activation.clone())
    }

    pub fn deactivation_guards(&self, route: RouteId) -> Vec<Arc<dyn Guard>> {
        self.read(route, |g| g.deactivation.clone())
    }

    pub fn contains(&self, route: RouteId) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(&route)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<T: Default>(&self, route: RouteId, f: impl FnOnce(&RouteGuards) -> T) -> T {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&route).map(f).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{GuardResult, fixed};

    #[test]
    fn register_merges() {
        let registry = GuardRegistry::new();
        let id = RouteId::next();
        registry.register(
            id,
            RouteGuards {
                activation: vec![fixed(GuardResult::Allow)],
                deactivation: Vec::new(),
            },
        );
        registry.register(
            id,
            RouteGuards {
                activation: vec![fixed(GuardResult::Deny)],
                deactivation: vec![fixed(GuardResult::Allow)],
            },
        );
        assert_eq!(registry.activation_guards(id).len(), 2);
        assert_eq!(registry.deactivation_guards(id).len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_route_has_no_guards() {
        let registry = GuardRegistry::new();
        let id = RouteId::next();
        assert!(registry.activation_guards(id).is_empty());
        assert!(!registry.contains(id));
    }

    #[test]
    fn empty_registration_still_creates_entry() {
        let registry = GuardRegistry::new();
        let id = RouteId::next();
        registry.register(id, RouteGuards::default());
        assert!(registry.contains(id));
    }
}
