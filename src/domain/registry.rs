//! Name-keyed interning of event clusters.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::event::EventCluster;

/// Deduplicates clusters by name so every tree refers to one shared instance.
///
/// A name arriving again with different events is rejected.
#[derive(Debug, Clone, Default)]
pub struct ClusterRegistry {
    clusters: HashMap<String, Arc<EventCluster>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared instance for `cluster`, registering it if new.
    pub fn intern(&mut self, cluster: EventCluster) -> DomainResult<Arc<EventCluster>> {
        if let Some(existing) = self.clusters.get(cluster.name()) {
            if existing.same_content(&cluster) {
                return Ok(Arc::clone(existing));
            }
            return Err(DomainError::ClusterContentMismatch(cluster.name().to_string()));
        }
        trace!("intern: new cluster {}", cluster.name());
        let shared = Arc::new(cluster);
        self.clusters
            .insert(shared.name().to_string(), Arc::clone(&shared));
        Ok(shared)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EventCluster>> {
        self.clusters.get(name)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{EventKind, Extent, SomaticEvent};

    fn snv(pos: u64) -> SomaticEvent {
        SomaticEvent::new(EventKind::Snv, Extent::point("7", pos).unwrap())
    }

    #[test]
    fn test_same_name_and_content_share_instance() {
        let mut registry = ClusterRegistry::new();
        let first = registry.intern(EventCluster::new("A", vec![snv(1)])).unwrap();
        let second = registry.intern(EventCluster::new("A", vec![snv(1)])).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_name_different_content_is_rejected() {
        let mut registry = ClusterRegistry::new();
        registry.intern(EventCluster::new("A", vec![snv(1)])).unwrap();
        let err = registry
            .intern(EventCluster::new("A", vec![snv(2)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::ClusterContentMismatch(name) if name == "A"));
    }
}
