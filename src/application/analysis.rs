//! Fraction checks and aggregates over subclone trees.

use std::collections::BTreeMap;

use generational_arena::Index;
use tracing::debug;

use crate::domain::subclone::check_fraction;
use crate::domain::{
    traverse, traverse_post_order, DomainError, NodeId, Subclone, SubcloneTree, TreeArena,
    TreeVisitor, VisitFlow,
};

/// Collects every fraction violation instead of stopping at the first.
#[derive(Debug, Default)]
pub struct FractionValidator {
    violations: Vec<DomainError>,
}

impl TreeVisitor<Subclone> for FractionValidator {
    fn enter(&mut self, tree: &TreeArena<Subclone>, node: Index) -> VisitFlow {
        let Some(subclone) = tree.data(node) else {
            return VisitFlow::SkipSubtree;
        };
        if let Err(err) = check_fraction(subclone.id(), subclone.fraction()) {
            self.violations.push(err);
        }
        if let Some(parent) = tree.parent(node).and_then(|p| tree.data(p)) {
            if subclone.fraction() > parent.fraction() {
                self.violations.push(DomainError::FractionExceedsParent {
                    node: subclone.id(),
                    fraction: subclone.fraction(),
                    parent_fraction: parent.fraction(),
                });
            }
        }
        VisitFlow::Continue
    }
}

/// All fraction violations of `tree` in pre-order.
pub fn fraction_violations(tree: &SubcloneTree) -> Vec<DomainError> {
    let mut validator = FractionValidator::default();
    traverse(tree.arena(), &mut validator);
    if !validator.violations.is_empty() {
        debug!("fraction_violations: {}", validator.violations.len());
    }
    validator.violations
}

/// Fraction of each subclone plus the fractions of all its descendants.
pub fn subtree_fractions(tree: &SubcloneTree) -> BTreeMap<NodeId, f64> {
    let mut sums: BTreeMap<NodeId, f64> = BTreeMap::new();
    traverse_post_order(tree.arena(), |arena, idx| {
        let Some(subclone) = arena.data(idx) else {
            return;
        };
        let below: f64 = arena
            .children(idx)
            .iter()
            .filter_map(|&child| arena.data(child))
            .filter_map(|child| sums.get(&child.id()))
            .sum();
        sums.insert(subclone.id(), subclone.fraction() + below);
    });
    sums
}
