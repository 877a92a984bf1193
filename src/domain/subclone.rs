//! Subclone payload and the subclone tree built on the generic arena.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::event::EventCluster;

/// Stable identifier of a subclone, preserved by save/load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A subclone: the cluster of events it gained plus its cellular fraction.
///
/// The founder (root) population usually carries no cluster.
#[derive(Debug, Clone)]
pub struct Subclone {
    id: NodeId,
    cluster: Option<Arc<EventCluster>>,
    fraction: f64,
}

impl Subclone {
    pub fn new(id: NodeId, cluster: Option<Arc<EventCluster>>, fraction: f64) -> Self {
        Self {
            id,
            cluster,
            fraction,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn cluster(&self) -> Option<&Arc<EventCluster>> {
        self.cluster.as_ref()
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster.as_deref().map(EventCluster::name)
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub(crate) fn set_fraction(&mut self, fraction: f64) {
        self.fraction = fraction;
    }
}

impl fmt::Display for Subclone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cluster_name() {
            Some(name) => write!(f, "{} {} ({})", self.id, name, self.fraction),
            None => write!(f, "{} ({})", self.id, self.fraction),
        }
    }
}

pub(crate) fn check_fraction(id: NodeId, fraction: f64) -> DomainResult<()> {
    if fraction.is_finite() && (0.0..=1.0).contains(&fraction) {
        Ok(())
    } else {
        Err(DomainError::InvalidFraction { node: id, fraction })
    }
}

/// Tree of subclones with node id allocation.
///
/// `add_root`/`add_subclone` enforce that a fraction lies in [0,1] and does
/// not exceed the parent's. Merge grafts bypass the parent check; use
/// `validate` to flag such nodes afterwards.
#[derive(Debug, Default)]
pub struct SubcloneTree {
    arena: TreeArena<Subclone>,
    next_id: u64,
    /// Set once `u64::MAX` has been handed out
    ids_exhausted: bool,
}

impl SubcloneTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already populated arena, continuing ids after the largest one.
    pub fn from_arena(arena: TreeArena<Subclone>) -> Self {
        let largest = arena.iter().map(|(_, node)| node.data.id.0).max();
        let (next_id, ids_exhausted) = match largest {
            None => (0, false),
            Some(id) => match id.checked_add(1) {
                Some(next) => (next, false),
                None => (id, true),
            },
        };
        Self {
            arena,
            next_id,
            ids_exhausted,
        }
    }

    pub fn arena(&self) -> &TreeArena<Subclone> {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut TreeArena<Subclone> {
        &mut self.arena
    }

    pub fn root(&self) -> Option<Index> {
        self.arena.root()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn subclone(&self, idx: Index) -> Option<&Subclone> {
        self.arena.data(idx)
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.arena.children(idx)
    }

    pub fn parent(&self, idx: Index) -> Option<Index> {
        self.arena.parent(idx)
    }

    fn peek_id(&self) -> DomainResult<NodeId> {
        if self.ids_exhausted {
            return Err(DomainError::NodeIdOutOfRange(NodeId(self.next_id)));
        }
        Ok(NodeId(self.next_id))
    }

    fn commit_id(&mut self) {
        match self.next_id.checked_add(1) {
            Some(next) => self.next_id = next,
            None => self.ids_exhausted = true,
        }
    }


    #[instrument(level = "debug", skip(self, cluster))]
    pub fn add_root(
        &mut self,
        cluster: Option<Arc<EventCluster>>,
        fraction: f64,
    ) -> DomainResult<Index> {
        let id = self.peek_id()?;
        check_fraction(id, fraction)?;
        let idx = self.arena.insert_root(Subclone::new(id, cluster, fraction))?;
        self.commit_id();
        Ok(idx)
    }

    /// Appends a subclone under `parent`, rejecting a fraction above the parent's.
    #[instrument(level = "debug", skip(self, cluster))]
    pub fn add_subclone(
        &mut self,
        parent: Index,
        cluster: Option<Arc<EventCluster>>,
        fraction: f64,
    ) -> DomainResult<Index> {
        let parent_fraction = self
            .subclone(parent)
            .ok_or_else(|| DomainError::NodeNotFound(format!("{:?}", parent)))?
            .fraction;
        let id = self.peek_id()?;
        check_fraction(id, fraction)?;
        if fraction > parent_fraction {
            return Err(DomainError::FractionExceedsParent {
                node: id,
                fraction,
                parent_fraction,
            });
        }
        let idx = self
            .arena
            .insert_child(parent, Subclone::new(id, cluster, fraction))?;
        self.commit_id();
        Ok(idx)
    }

    /// Inserts a node without the parent-fraction check; `None` creates the root.
    pub(crate) fn graft(
        &mut self,
        parent: Option<Index>,
        cluster: Option<Arc<EventCluster>>,
        fraction: f64,
    ) -> DomainResult<Index> {
        let id = self.peek_id()?;
        let subclone = Subclone::new(id, cluster, fraction);
        let idx = match parent {
            Some(parent) => self.arena.insert_child(parent, subclone)?,
            None => self.arena.insert_root(subclone)?,
        };
        self.commit_id();
        debug!("graft: {} under {:?}", id, parent);
        Ok(idx)
    }

    /// Removes `idx` and its descendants from the tree.
    pub fn remove_subtree(&mut self, idx: Index) -> DomainResult<Vec<Subclone>> {
        self.arena.remove_subtree(idx)
    }

    pub fn find_by_id(&self, id: NodeId) -> Option<Index> {
        self.arena
            .iter()
            .find(|(_, node)| node.data.id == id)
            .map(|(idx, _)| idx)
    }

    /// All nodes carrying a cluster with the given name, in pre-order.
    pub fn find_by_cluster(&self, name: &str) -> Vec<Index> {
        self.arena
            .iter()
            .filter(|(_, node)| node.data.cluster_name() == Some(name))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Distinct clusters referenced by the tree, keyed by name.
    pub fn clusters(&self) -> BTreeMap<String, Arc<EventCluster>> {
        self.arena
            .iter()
            .filter_map(|(_, node)| node.data.cluster.clone())
            .map(|cluster| (cluster.name().to_string(), cluster))
            .collect()
    }

    /// Checks every node against the fraction invariants.
    ///
    /// Returns the first violation in pre-order.
    pub fn validate(&self) -> DomainResult<()> {
        for (idx, node) in self.arena.iter() {
            let subclone = &node.data;
            check_fraction(subclone.id, subclone.fraction)?;
            if let Some(parent) = self.arena.parent(idx).and_then(|p| self.subclone(p)) {
                if subclone.fraction > parent.fraction {
                    return Err(DomainError::FractionExceedsParent {
                        node: subclone.id,
                        fraction: subclone.fraction,
                        parent_fraction: parent.fraction,
                    });
                }
            }
        }
        Ok(())
    }
}
