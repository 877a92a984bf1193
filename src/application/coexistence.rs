//! Coexistence table: which event clusters were seen on a common lineage.
//!
//! Pairs are unordered and stored canonically (lexicographically smaller name
//! first). Each traversal pass over a tree is one "case"; a pair may be
//! observed at most once per case, and every case must agree on the verdict.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use generational_arena::Index;
use itertools::Itertools;
use tracing::{debug, instrument, trace, warn};

use crate::domain::{
    traverse, DomainError, DomainResult, Subclone, SubcloneTree, TreeArena, TreeVisitor,
    VisitFlow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Both clusters lie on one root-to-leaf path
    Coexisting,
    /// Both clusters occur in a tree, on different branches
    Exclusive,
}

impl From<bool> for Verdict {
    fn from(coexisting: bool) -> Self {
        if coexisting {
            Verdict::Coexisting
        } else {
            Verdict::Exclusive
        }
    }
}

#[derive(Debug, Clone)]
struct PairEntry {
    verdict: Verdict,
    count: u32,
    last_case: u64,
    contradicted: bool,
}

fn canonical(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoexistenceTable {
    registered: BTreeSet<String>,
    pairs: BTreeMap<(String, String), PairEntry>,
    case: u64,
}

impl CoexistenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clusters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for name in names {
            table.register(name);
        }
        table
    }

    /// Table registering every cluster that occurs in `trees`.
    pub fn from_trees<'a>(trees: impl IntoIterator<Item = &'a SubcloneTree>) -> Self {
        let mut table = Self::new();
        for tree in trees {
            table.register_tree(tree);
        }
        table
    }

    /// Registers `name`; registering twice is a no-op.
    pub fn register(&mut self, name: impl Into<String>) {
        self.registered.insert(name.into());
    }

    pub fn register_tree(&mut self, tree: &SubcloneTree) {
        for name in tree.clusters().into_keys() {
            self.register(name);
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.contains(name)
    }

    /// Starts a new observation pass; each pair may be observed once per pass.
    pub fn new_case(&mut self) -> u64 {
        self.case += 1;
        trace!("coexistence: case {}", self.case);
        self.case
    }

    /// Number of passes started with [`new_case`](Self::new_case).
    pub fn case_count(&self) -> u64 {
        self.case
    }

    fn ensure_registered(&self, name: &str) -> DomainResult<()> {
        if self.is_registered(name) {
            Ok(())
        } else {
            Err(DomainError::ClusterNotFound(name.to_string()))
        }
    }

    /// Records a verdict for the unordered pair `{a, b}` in the current case.
    ///
    /// A verdict differing from an earlier case flags the pair as
    /// contradicted and is not counted.
    pub fn observe(&mut self, a: &str, b: &str, verdict: impl Into<Verdict>) -> DomainResult<()> {
        self.ensure_registered(a)?;
        self.ensure_registered(b)?;
        let verdict = verdict.into();
        let key = canonical(a, b);
        let case = self.case;

        let Some(entry) = self.pairs.get_mut(&key) else {
            trace!("coexistence: {:?} {:?}", key, verdict);
            self.pairs.insert(
                key,
                PairEntry {
                    verdict,
                    count: 1,
                    last_case: case,
                    contradicted: false,
                },
            );
            return Ok(());
        };
        if entry.last_case == case {
            return Err(DomainError::ClusterPairAlreadyObserved(key.0, key.1));
        }
        entry.last_case = case;
        if entry.verdict != verdict {
            entry.contradicted = true;
            warn!("coexistence: contradicting verdict for {:?}", key);
            return Err(DomainError::ContradictoryObservation(key.0, key.1));
        }
        entry.count += 1;
        Ok(())
    }

    /// Recorded verdict for `{a, b}`, None if the pair was never observed.
    pub fn query(&self, a: &str, b: &str) -> DomainResult<Option<Verdict>> {
        self.ensure_registered(a)?;
        self.ensure_registered(b)?;
        Ok(self.pairs.get(&canonical(a, b)).map(|entry| entry.verdict))
    }

    /// Number of cases that agreed on the recorded verdict.
    pub fn count(&self, a: &str, b: &str) -> DomainResult<u32> {
        self.ensure_registered(a)?;
        self.ensure_registered(b)?;
        Ok(self
            .pairs
            .get(&canonical(a, b))
            .map_or(0, |entry| entry.count))
    }

    pub fn is_contradicted(&self, a: &str, b: &str) -> DomainResult<bool> {
        self.ensure_registered(a)?;
        self.ensure_registered(b)?;
        Ok(self
            .pairs
            .get(&canonical(a, b))
            .is_some_and(|entry| entry.contradicted))
    }

    /// All pairs that received conflicting verdicts, in name order.
    pub fn contradictions(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .filter(|(_, entry)| entry.contradicted)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Outcome of one population pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub coexisting: usize,
    pub exclusive: usize,
    pub contradictions: Vec<(String, String)>,
}

/// Populates a [`CoexistenceTable`] from one tree.
///
/// The clusters on the path from the root to the current node are kept on a
/// stack with one entry per depth. Entering a node pairs its cluster with
/// every distinct cluster on that stack; `finish` then marks the remaining
/// pairs of clusters seen in this tree as exclusive.
pub struct CoexistenceVisitor<'t> {
    table: &'t mut CoexistenceTable,
    lineage: Vec<Option<String>>,
    seen: BTreeSet<String>,
    coexisting: HashSet<(String, String)>,
    summary: PassSummary,
    error: Option<DomainError>,
}

impl<'t> CoexistenceVisitor<'t> {
    pub fn new(table: &'t mut CoexistenceTable) -> Self {
        Self {
            table,
            lineage: Vec::new(),
            seen: BTreeSet::new(),
            coexisting: HashSet::new(),
            summary: PassSummary::default(),
            error: None,
        }
    }

    /// Records `verdict`, tolerating contradictions (they stay flagged in the table).
    fn record(&mut self, a: &str, b: &str, verdict: Verdict) -> DomainResult<()> {
        match self.table.observe(a, b, verdict) {
            Ok(()) => {
                match verdict {
                    Verdict::Coexisting => self.summary.coexisting += 1,
                    Verdict::Exclusive => self.summary.exclusive += 1,
                }
                Ok(())
            }
            Err(DomainError::ContradictoryObservation(x, y)) => {
                self.summary.contradictions.push((x, y));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Records exclusive verdicts for seen clusters that never shared a lineage.
    pub fn finish(mut self) -> DomainResult<PassSummary> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let seen: Vec<String> = self.seen.iter().cloned().collect();
        for (a, b) in seen.iter().tuple_combinations() {
            if !self.coexisting.contains(&canonical(a, b)) {
                self.record(a, b, Verdict::Exclusive)?;
            }
        }
        Ok(self.summary)
    }
}

impl TreeVisitor<Subclone> for CoexistenceVisitor<'_> {
    fn enter(&mut self, tree: &TreeArena<Subclone>, node: Index) -> VisitFlow {
        let name = tree
            .data(node)
            .and_then(Subclone::cluster_name)
            .map(str::to_string);
        if let Some(name) = &name {
            self.seen.insert(name.clone());
            let ancestors: BTreeSet<String> = self.lineage.iter().flatten().cloned().collect();
            for ancestor in ancestors.iter().filter(|a| *a != name) {
                if !self.coexisting.insert(canonical(ancestor, name)) {
                    continue;
                }
                if let Err(err) = self.record(ancestor, name, Verdict::Coexisting) {
                    self.error = Some(err);
                    return VisitFlow::Abort;
                }
            }
        }
        self.lineage.push(name);
        VisitFlow::Continue
    }

    fn exit(&mut self, _tree: &TreeArena<Subclone>, _node: Index) {
        self.lineage.pop();
    }
}

/// Runs one case over `tree`, registering its clusters first.
#[instrument(level = "debug", skip_all, fields(nodes = tree.len()))]
pub fn populate(table: &mut CoexistenceTable, tree: &SubcloneTree) -> DomainResult<PassSummary> {
    table.register_tree(tree);
    table.new_case();
    let mut visitor = CoexistenceVisitor::new(table);
    traverse(tree.arena(), &mut visitor);
    let summary = visitor.finish()?;
    debug!(
        "coexistence pass: coexisting={} exclusive={} contradictions={}",
        summary.coexisting,
        summary.exclusive,
        summary.contradictions.len()
    );
    Ok(summary)
}
