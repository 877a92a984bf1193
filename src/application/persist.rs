//! Save/load of subclone trees as a flat, pre-ordered record sequence.
//!
//! Each record carries the node id, the parent id (or the `"root"` sentinel),
//! the cellular fraction and the full cluster (name plus ordered events).
//! Because records are written in pre-order a parent always precedes its
//! children, so loading is a single pass without forward references.
//!
//! On disk the sequence is a TOML document with one `[[node]]` table per
//! record.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use generational_arena::Index;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::subclone::check_fraction;
use crate::domain::{
    traverse, traverse_mut, ClusterRegistry, DomainError, DomainResult, EventCluster, EventKind,
    Extent, NodeId, SomaticEvent, Subclone, SubcloneTree, TreeArena, TreeVisitor, TreeVisitorMut,
    VisitFlow,
};
use crate::infrastructure::{FileSystem, ReferenceGenome};

// ============================================================
// RECORD FORMAT
// ============================================================

/// Largest node id a document can hold; TOML integers are signed 64-bit.
pub const MAX_NODE_ID: u64 = i64::MAX as u64;

fn check_node_id(id: NodeId) -> DomainResult<()> {
    if id.0 > MAX_NODE_ID {
        return Err(DomainError::NodeIdOutOfRange(id));
    }
    Ok(())
}

/// Marker written in place of a parent id for the root record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootMarker {
    Root,
}

/// Parent reference of a record: a previously written node id or `"root"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParentRef {
    Node(u64),
    Root(RootMarker),
}

impl ParentRef {
    pub fn root() -> Self {
        ParentRef::Root(RootMarker::Root)
    }

    pub fn is_root(&self) -> bool {
        matches!(self, ParentRef::Root(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl From<&SomaticEvent> for EventRecord {
    fn from(event: &SomaticEvent) -> Self {
        let extent = event.extent();
        Self {
            kind: event.kind(),
            chrom: extent.chrom().to_string(),
            start: extent.start(),
            end: extent.end(),
        }
    }
}

impl EventRecord {
    fn to_event(&self) -> DomainResult<SomaticEvent> {
        let extent = Extent::new(self.chrom.clone(), self.start, self.end)?;
        Ok(SomaticEvent::new(self.kind, extent))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

impl From<&EventCluster> for ClusterRecord {
    fn from(cluster: &EventCluster) -> Self {
        Self {
            name: cluster.name().to_string(),
            events: cluster.events().iter().map(EventRecord::from).collect(),
        }
    }
}

/// One persisted subclone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub parent: ParentRef,
    pub fraction: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterRecord>,
}

/// Top-level TOML document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeRecord>,
}

// ============================================================
// SAVE
// ============================================================

#[derive(Default)]
struct SaveVisitor {
    records: Vec<NodeRecord>,
    seen: HashSet<NodeId>,
    error: Option<DomainError>,
}

impl TreeVisitor<Subclone> for SaveVisitor {
    fn enter(&mut self, tree: &TreeArena<Subclone>, node: Index) -> VisitFlow {
        let Some(subclone) = tree.data(node) else {
            return VisitFlow::SkipSubtree;
        };
        if let Err(err) = check_node_id(subclone.id()) {
            self.error = Some(err);
            return VisitFlow::Abort;
        }
        if !self.seen.insert(subclone.id()) {
            self.error = Some(DomainError::DuplicateNodeId(subclone.id()));
            return VisitFlow::Abort;
        }
        let parent = tree
            .parent(node)
            .and_then(|p| tree.data(p))
            .map(|p| ParentRef::Node(p.id().0))
            .unwrap_or_else(ParentRef::root);
        self.records.push(NodeRecord {
            id: subclone.id().0,
            parent,
            fraction: subclone.fraction(),
            cluster: subclone.cluster().map(|c| ClusterRecord::from(c.as_ref())),
        });
        VisitFlow::Continue
    }
}

/// Serializes `tree` into records in pre-order.
#[instrument(level = "debug", skip(tree), fields(nodes = tree.len()))]
pub fn save(tree: &SubcloneTree) -> DomainResult<Vec<NodeRecord>> {
    let mut visitor = SaveVisitor::default();
    if traverse(tree.arena(), &mut visitor).is_aborted() {
        if let Some(err) = visitor.error {
            return Err(err);
        }
    }
    Ok(visitor.records)
}

/// Renders `tree` as a TOML tree document.
pub fn save_to_string(tree: &SubcloneTree) -> ApplicationResult<String> {
    let document = TreeDocument { nodes: save(tree)? };
    Ok(toml::to_string(&document)?)
}

// ============================================================
// LOAD
// ============================================================

/// A record checked and resolved in the first pass.
struct Staged {
    id: NodeId,
    cluster: Option<Arc<EventCluster>>,
    fraction: f64,
}

impl Staged {
    fn subclone(&self) -> Subclone {
        Subclone::new(self.id, self.cluster.clone(), self.fraction)
    }
}

/// Attaches staged records below the node being entered, in record order.
struct LoadVisitor<'s> {
    staged: &'s [Staged],
    children: HashMap<NodeId, Vec<usize>>,
    error: Option<DomainError>,
}

impl TreeVisitorMut<Subclone> for LoadVisitor<'_> {
    fn enter(&mut self, tree: &mut TreeArena<Subclone>, node: Index) -> VisitFlow {
        let Some(id) = tree.data(node).map(Subclone::id) else {
            return VisitFlow::SkipSubtree;
        };
        for position in self.children.remove(&id).unwrap_or_default() {
            let record = &self.staged[position];
            if let Err(err) = tree.insert_child(node, record.subclone()) {
                self.error = Some(err);
                return VisitFlow::Abort;
            }
            trace!("load: attached {} under {}", record.id, id);
        }
        VisitFlow::Continue
    }
}

/// Rebuilds subclone trees from record sequences.
///
/// Clusters are interned into the shared registry so that a name seen in
/// several documents resolves to one instance. Loading is atomic: on any
/// error neither a tree nor new registry entries are produced.
pub struct TreeLoader<'a> {
    registry: &'a mut ClusterRegistry,
    genome: Option<&'a dyn ReferenceGenome>,
    validate_fractions: bool,
}

impl<'a> TreeLoader<'a> {
    pub fn new(registry: &'a mut ClusterRegistry) -> Self {
        Self {
            registry,
            genome: None,
            validate_fractions: false,
        }
    }

    /// Checks every event extent against `genome`.
    pub fn with_genome(mut self, genome: &'a dyn ReferenceGenome) -> Self {
        self.genome = Some(genome);
        self
    }

    /// Rejects loaded trees in which a child's fraction exceeds its parent's.
    pub fn validate_fractions(mut self, enabled: bool) -> Self {
        self.validate_fractions = enabled;
        self
    }

    #[instrument(level = "debug", skip(self, records), fields(records = records.len()))]
    pub fn load(&mut self, records: &[NodeRecord]) -> DomainResult<SubcloneTree> {
        let mut registry = self.registry.clone();
        let (staged, root, children) = self.stage(records, &mut registry)?;
        let Some(root) = root else {
            debug!("load: empty record sequence");
            return Ok(SubcloneTree::new());
        };

        let mut arena = TreeArena::new();
        arena.insert_root(staged[root].subclone())?;
        let mut visitor = LoadVisitor {
            staged: &staged,
            children,
            error: None,
        };
        if traverse_mut(&mut arena, &mut visitor).is_aborted() {
            if let Some(err) = visitor.error {
                return Err(err);
            }
        }

        let tree = SubcloneTree::from_arena(arena);
        if self.validate_fractions {
            tree.validate()?;
        }
        *self.registry = registry;
        debug!("load: {} nodes", tree.len());
        Ok(tree)
    }

    /// First pass: validates records and resolves clusters.
    ///
    /// Returns the staged records, the position of the root record and the
    /// child positions per parent id.
    #[allow(clippy::type_complexity)]
    fn stage(
        &self,
        records: &[NodeRecord],
        registry: &mut ClusterRegistry,
    ) -> DomainResult<(Vec<Staged>, Option<usize>, HashMap<NodeId, Vec<usize>>)> {
        let mut staged = Vec::with_capacity(records.len());
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut root = None;
        let mut children: HashMap<NodeId, Vec<usize>> = HashMap::new();

        for (position, record) in records.iter().enumerate() {
            let id = NodeId(record.id);
            check_node_id(id)?;
            check_fraction(id, record.fraction)?;
            match record.parent {
                ParentRef::Root(_) => {
                    if root.is_some() {
                        return Err(DomainError::MultipleRoots(id));
                    }
                    root = Some(position);
                }
                ParentRef::Node(parent) => {
                    let parent = NodeId(parent);
                    if !seen.contains(&parent) {
                        return Err(DomainError::ParentNotFound { node: id, parent });
                    }
                    children.entry(parent).or_default().push(position);
                }
            }
            if !seen.insert(id) {
                return Err(DomainError::DuplicateNodeId(id));
            }

            let cluster = match &record.cluster {
                Some(cluster) => Some(self.resolve_cluster(cluster, registry)?),
                None => None,
            };
            staged.push(Staged {
                id,
                cluster,
                fraction: record.fraction,
            });
        }

        if !records.is_empty() && root.is_none() {
            return Err(DomainError::MissingRoot);
        }
        Ok((staged, root, children))
    }

    fn resolve_cluster(
        &self,
        record: &ClusterRecord,
        registry: &mut ClusterRegistry,
    ) -> DomainResult<Arc<EventCluster>> {
        let mut events = Vec::with_capacity(record.events.len());
        for event in &record.events {
            let event = event.to_event()?;
            if let Some(genome) = self.genome {
                genome.check_extent(event.extent())?;
            }
            events.push(event);
        }
        registry.intern(EventCluster::new(record.name.clone(), events))
    }

    /// Parses a TOML tree document and loads it.
    pub fn load_from_str(&mut self, text: &str) -> ApplicationResult<SubcloneTree> {
        let document: TreeDocument = toml::from_str(text)?;
        Ok(self.load(&document.nodes)?)
    }
}

/// Loads records with a fresh registry and no extent validation.
pub fn load(records: &[NodeRecord]) -> DomainResult<SubcloneTree> {
    let mut registry = ClusterRegistry::new();
    TreeLoader::new(&mut registry).load(records)
}

// ============================================================
// FILE STORE
// ============================================================

/// Reads and writes tree documents through a [`FileSystem`].
pub struct TreeStore {
    fs: Arc<dyn FileSystem>,
}

impl TreeStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Writes `tree` to `path`, creating parent directories as needed.
    pub fn save_to_path(&self, tree: &SubcloneTree, path: &Path) -> ApplicationResult<()> {
        debug!("save_to_path: {}", path.display());
        let text = save_to_string(tree)?;
        self.fs
            .ensure_parent(path)
            .with_path_context("create parent directory", path)?;
        self.fs
            .write(path, &text)
            .with_path_context("write tree document", path)
    }

    pub fn load_from_path(
        &self,
        loader: &mut TreeLoader<'_>,
        path: &Path,
    ) -> ApplicationResult<SubcloneTree> {
        debug!("load_from_path: {}", path.display());
        let text = self
            .fs
            .read_to_string(path)
            .with_path_context("read tree document", path)?;
        loader.load_from_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, parent: ParentRef, fraction: f64) -> NodeRecord {
        NodeRecord {
            id,
            parent,
            fraction,
            cluster: None,
        }
    }

    #[test]
    fn test_parent_ref_roundtrips_through_toml() {
        let document = TreeDocument {
            nodes: vec![
                record(0, ParentRef::root(), 1.0),
                record(1, ParentRef::Node(0), 0.5),
            ],
        };
        let text = toml::to_string(&document).unwrap();
        assert!(text.contains("parent = \"root\""));
        let parsed: TreeDocument = toml::from_str(&text).unwrap();
        assert_eq!(parsed, document);
    }

    #[test]
    fn test_self_parent_is_rejected() {
        let records = vec![record(0, ParentRef::root(), 1.0), record(1, ParentRef::Node(1), 0.5)];
        assert!(matches!(
            load(&records),
            Err(DomainError::ParentNotFound { .. })
        ));
    }

    #[test]
    fn test_ids_beyond_toml_range_are_rejected_on_load() {
        let records = vec![record(u64::MAX, ParentRef::root(), 1.0)];
        let err = load(&records).unwrap_err();
        assert!(matches!(err, DomainError::NodeIdOutOfRange(NodeId(u64::MAX))));
        assert!(err.is_structural());

        let largest = vec![record(MAX_NODE_ID, ParentRef::root(), 1.0)];
        let tree = load(&largest).unwrap();
        assert!(tree.find_by_id(NodeId(MAX_NODE_ID)).is_some());
    }

    #[test]
    fn test_ids_beyond_toml_range_are_rejected_on_save() {
        let mut arena = TreeArena::new();
        arena
            .insert_root(Subclone::new(NodeId(1 << 63), None, 1.0))
            .unwrap();
        let tree = SubcloneTree::from_arena(arena);

        assert!(matches!(
            save(&tree),
            Err(DomainError::NodeIdOutOfRange(NodeId(id))) if id == 1 << 63
        ));
        assert!(save_to_string(&tree).is_err());
    }
}
