//! Merging a secondary subclone tree into a primary one.
//!
//! The secondary tree is walked in pre-order while a stack of merge points in
//! the primary tree follows the walk (one entry per entered secondary node).
//! A secondary node whose cluster names exactly one primary node is unified
//! with it when that node lies on the lineage of the current merge point
//! (below it, at it, or above it). Unmatched nodes are grafted under the
//! merge point. Everything else is a conflict: the secondary subtree is
//! grafted as a separate branch and the conflict is reported, never resolved.
//!
//! Merge is directional. Primary nodes keep their ids and positions, grafted
//! nodes receive fresh primary ids, and unified fractions become the maximum
//! of both inputs.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use generational_arena::Index;
use tracing::{debug, instrument, warn};

use crate::domain::{
    traverse, traverse_from, DomainError, DomainResult, EventCluster, NodeId, Subclone,
    SubcloneTree, TreeArena, TreeVisitor, VisitFlow,
};

/// Default tolerance in bases when comparing event boundaries of two clusters.
pub const DEFAULT_BOUNDARY_RESOLUTION: u64 = 20_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeOptions {
    /// Non-root secondary subclones below this fraction are not placed;
    /// their children merge against the current merge point instead.
    pub min_fraction: f64,
    /// Tolerance used when checking that two same-named clusters agree.
    pub boundary_resolution: u64,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            min_fraction: 0.0,
            boundary_resolution: DEFAULT_BOUNDARY_RESOLUTION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// The cluster name occurs on several primary nodes.
    AmbiguousMatch,
    /// Same name, but the event sets disagree beyond the boundary resolution.
    ContentMismatch,
    /// The matching primary node was already unified or grafted in this merge.
    AlreadyUnified,
    /// The match sits on a different lineage than the current merge point.
    InconsistentAncestry,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConflictKind::AmbiguousMatch => "cluster matches several primary nodes",
            ConflictKind::ContentMismatch => "cluster events differ between trees",
            ConflictKind::AlreadyUnified => "primary node already merged",
            ConflictKind::InconsistentAncestry => "match lies outside the merged lineage",
        };
        f.write_str(text)
    }
}

/// An ambiguous placement, left unresolved and grafted separately.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConflict {
    pub kind: ConflictKind,
    pub cluster: String,
    /// Id of the conflicting node in the secondary tree
    pub secondary: NodeId,
    /// Primary node the secondary subtree was grafted under
    pub merge_point: NodeId,
    /// Primary nodes carrying the same cluster name
    pub matches: Vec<NodeId>,
    /// Primary id of the grafted copy of the secondary node
    pub graft: NodeId,
}

/// Audit trail of a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// (secondary id, primary id) of unified nodes
    pub unified: Vec<(NodeId, NodeId)>,
    /// (secondary id, new primary id) of grafted nodes, conflicts included
    pub grafted: Vec<(NodeId, NodeId)>,
    /// Secondary ids passed over for falling below the minimum fraction
    pub skipped: Vec<NodeId>,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Turns the first conflict into an error for callers that cannot audit.
    pub fn into_result(self) -> DomainResult<Self> {
        match self.conflicts.first() {
            None => Ok(self),
            Some(conflict) => Err(DomainError::MergeConflict {
                cluster: conflict.cluster.clone(),
                secondary: conflict.secondary,
                reason: conflict.kind.to_string(),
            }),
        }
    }
}

/// Merges `secondary` into `primary` in place.
///
/// Conflicts do not fail the merge; they are returned in the report together
/// with the grafts made for them.
#[instrument(level = "debug", skip_all, fields(primary = primary.len(), secondary = secondary.len()))]
pub fn merge_into(
    primary: &mut SubcloneTree,
    secondary: &SubcloneTree,
    options: &MergeOptions,
) -> DomainResult<MergeReport> {
    let index = cluster_index(primary.arena());
    let mut visitor = MergeVisitor {
        primary,
        options,
        anchors: Vec::new(),
        claimed: HashSet::new(),
        index,
        report: MergeReport::default(),
        error: None,
    };
    if traverse(secondary.arena(), &mut visitor).is_aborted() {
        if let Some(err) = visitor.error {
            return Err(err);
        }
    }
    let report = visitor.report;
    debug!(
        "merge: unified={} grafted={} skipped={} conflicts={}",
        report.unified.len(),
        report.grafted.len(),
        report.skipped.len(),
        report.conflicts.len()
    );
    Ok(report)
}

fn cluster_index(tree: &TreeArena<Subclone>) -> HashMap<String, Vec<Index>> {
    let mut index: HashMap<String, Vec<Index>> = HashMap::new();
    for (idx, node) in tree.iter() {
        if let Some(name) = node.data.cluster_name() {
            index.entry(name.to_string()).or_default().push(idx);
        }
    }
    index
}

struct MergeVisitor<'p> {
    primary: &'p mut SubcloneTree,
    options: &'p MergeOptions,
    /// Primary merge point per entered secondary node
    anchors: Vec<Index>,
    /// Primary nodes already unified or created by this merge
    claimed: HashSet<Index>,
    index: HashMap<String, Vec<Index>>,
    report: MergeReport,
    error: Option<DomainError>,
}

impl TreeVisitor<Subclone> for MergeVisitor<'_> {
    fn enter(&mut self, tree: &TreeArena<Subclone>, node: Index) -> VisitFlow {
        let Some(subclone) = tree.data(node) else {
            return VisitFlow::SkipSubtree;
        };
        let outcome = match self.anchors.last().copied() {
            None => self.enter_root(tree, node, subclone),
            Some(anchor) if subclone.fraction() < self.options.min_fraction => {
                debug!("merge: skip {} below min fraction", subclone.id());
                self.report.skipped.push(subclone.id());
                Ok((anchor, VisitFlow::Continue))
            }
            Some(anchor) => self.place(tree, node, subclone, anchor),
        };
        match outcome {
            Ok((anchor, flow)) => {
                self.anchors.push(anchor);
                flow
            }
            Err(err) => {
                self.error = Some(err);
                VisitFlow::Abort
            }
        }
    }

    fn exit(&mut self, _tree: &TreeArena<Subclone>, _node: Index) {
        self.anchors.pop();
    }
}

impl MergeVisitor<'_> {
    fn enter_root(
        &mut self,
        tree: &TreeArena<Subclone>,
        node: Index,
        subclone: &Subclone,
    ) -> DomainResult<(Index, VisitFlow)> {
        let Some(primary_root) = self.primary.root() else {
            debug!("merge: primary empty, grafting whole secondary tree");
            let graft = self.graft_subtree(tree, node, None)?;
            return Ok((graft, VisitFlow::SkipSubtree));
        };
        if subclone.cluster().is_none() {
            self.unify(primary_root, subclone)?;
            return Ok((primary_root, VisitFlow::Continue));
        }
        self.place(tree, node, subclone, primary_root)
    }

    /// Finds where `subclone` belongs relative to the merge point `anchor`.
    fn place(
        &mut self,
        tree: &TreeArena<Subclone>,
        node: Index,
        subclone: &Subclone,
        anchor: Index,
    ) -> DomainResult<(Index, VisitFlow)> {
        let Some(cluster) = subclone.cluster() else {
            let idx = self.graft_single(anchor, subclone)?;
            return Ok((idx, VisitFlow::Continue));
        };
        let matches = self.index.get(cluster.name()).cloned().unwrap_or_default();
        let kind = match matches.as_slice() {
            [] => {
                let idx = self.graft_single(anchor, subclone)?;
                return Ok((idx, VisitFlow::Continue));
            }
            [candidate] => match self.check_candidate(*candidate, cluster, anchor) {
                None => {
                    self.unify(*candidate, subclone)?;
                    return Ok((*candidate, VisitFlow::Continue));
                }
                Some(kind) => kind,
            },
            _ => ConflictKind::AmbiguousMatch,
        };

        let graft = self.graft_subtree(tree, node, Some(anchor))?;
        let conflict = MergeConflict {
            kind,
            cluster: cluster.name().to_string(),
            secondary: subclone.id(),
            merge_point: self.id_of(anchor)?,
            matches: matches
                .iter()
                .map(|&idx| self.id_of(idx))
                .collect::<DomainResult<_>>()?,
            graft: self.id_of(graft)?,
        };
        warn!(
            "merge conflict on {} (secondary {}): {}",
            conflict.cluster, conflict.secondary, conflict.kind
        );
        self.report.conflicts.push(conflict);
        Ok((graft, VisitFlow::SkipSubtree))
    }

    /// Returns the reason `candidate` cannot be unified, None if it can.
    fn check_candidate(
        &self,
        candidate: Index,
        cluster: &Arc<EventCluster>,
        anchor: Index,
    ) -> Option<ConflictKind> {
        let existing = self
            .primary
            .subclone(candidate)
            .and_then(Subclone::cluster)?;
        if !Arc::ptr_eq(existing, cluster)
            && !existing.is_equivalent(cluster, self.options.boundary_resolution)
        {
            return Some(ConflictKind::ContentMismatch);
        }
        if self.claimed.contains(&candidate) {
            return Some(ConflictKind::AlreadyUnified);
        }
        let arena = self.primary.arena();
        if !arena.is_ancestor_or_self(anchor, candidate)
            && !arena.is_ancestor_or_self(candidate, anchor)
        {
            return Some(ConflictKind::InconsistentAncestry);
        }
        None
    }

    fn unify(&mut self, target: Index, subclone: &Subclone) -> DomainResult<()> {
        let existing = self
            .primary
            .arena_mut()
            .data_mut(target)
            .ok_or_else(|| DomainError::NodeNotFound(format!("{:?}", target)))?;
        let merged = existing.fraction().max(subclone.fraction());
        existing.set_fraction(merged);
        let target_id = existing.id();
        self.claimed.insert(target);
        self.report.unified.push((subclone.id(), target_id));
        debug!("merge: unified {} into {} ({})", subclone.id(), target_id, merged);
        Ok(())
    }

    fn graft_single(&mut self, anchor: Index, subclone: &Subclone) -> DomainResult<Index> {
        let idx = self
            .primary
            .graft(Some(anchor), subclone.cluster().cloned(), subclone.fraction())?;
        self.record_graft(subclone.id(), idx)?;
        Ok(idx)
    }

    /// Copies the secondary subtree at `node` below `parent`; returns the copy's root.
    fn graft_subtree(
        &mut self,
        tree: &TreeArena<Subclone>,
        node: Index,
        parent: Option<Index>,
    ) -> DomainResult<Index> {
        let mut grafter = GraftVisitor {
            primary: &mut *self.primary,
            targets: vec![parent],
            grafted: Vec::new(),
            error: None,
        };
        if traverse_from(tree, Some(node), &mut grafter).is_aborted() {
            if let Some(err) = grafter.error {
                return Err(err);
            }
        }
        let grafted = grafter.grafted;
        let root = grafted
            .first()
            .map(|&(_, idx)| idx)
            .ok_or_else(|| DomainError::NodeNotFound(format!("{:?}", node)))?;
        for (secondary_id, idx) in grafted {
            self.record_graft(secondary_id, idx)?;
        }
        Ok(root)
    }

    fn record_graft(&mut self, secondary_id: NodeId, idx: Index) -> DomainResult<()> {
        if let Some(name) = self.primary.subclone(idx).and_then(Subclone::cluster_name) {
            self.index.entry(name.to_string()).or_default().push(idx);
        }
        self.claimed.insert(idx);
        let primary_id = self.id_of(idx)?;
        self.report.grafted.push((secondary_id, primary_id));
        Ok(())
    }

    fn id_of(&self, idx: Index) -> DomainResult<NodeId> {
        self.primary
            .subclone(idx)
            .map(Subclone::id)
            .ok_or_else(|| DomainError::NodeNotFound(format!("{:?}", idx)))
    }
}

/// Copies a secondary subtree node by node, keeping its shape.
struct GraftVisitor<'p> {
    primary: &'p mut SubcloneTree,
    /// Primary parent for the next copied node; `None` creates the root
    targets: Vec<Option<Index>>,
    grafted: Vec<(NodeId, Index)>,
    error: Option<DomainError>,
}

impl TreeVisitor<Subclone> for GraftVisitor<'_> {
    fn enter(&mut self, tree: &TreeArena<Subclone>, node: Index) -> VisitFlow {
        let Some(subclone) = tree.data(node) else {
            return VisitFlow::SkipSubtree;
        };
        let parent = self.targets.last().copied().flatten();
        match self
            .primary
            .graft(parent, subclone.cluster().cloned(), subclone.fraction())
        {
            Ok(idx) => {
                self.grafted.push((subclone.id(), idx));
                self.targets.push(Some(idx));
                VisitFlow::Continue
            }
            Err(err) => {
                self.error = Some(err);
                VisitFlow::Abort
            }
        }
    }

    fn exit(&mut self, _tree: &TreeArena<Subclone>, _node: Index) {
        self.targets.pop();
    }
}
