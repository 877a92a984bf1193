//! Text renderings of subclone trees, each produced by a visitor.

use std::fmt::Write;

use generational_arena::Index;
use termtree::Tree;

use crate::domain::{traverse, Subclone, SubcloneTree, TreeArena, TreeVisitor, VisitFlow};

/// Builds a `termtree::Tree` mirroring the subclone tree.
#[derive(Default)]
struct TermTreeVisitor {
    open: Vec<Tree<String>>,
    done: Option<Tree<String>>,
}

impl TreeVisitor<Subclone> for TermTreeVisitor {
    fn enter(&mut self, tree: &TreeArena<Subclone>, node: Index) -> VisitFlow {
        let label = tree.data(node).map(ToString::to_string).unwrap_or_default();
        self.open.push(Tree::new(label));
        VisitFlow::Continue
    }

    fn exit(&mut self, _tree: &TreeArena<Subclone>, _node: Index) {
        let Some(finished) = self.open.pop() else {
            return;
        };
        match self.open.last_mut() {
            Some(parent) => {
                parent.push(finished);
            }
            None => self.done = Some(finished),
        }
    }
}

pub fn to_term_tree(tree: &SubcloneTree) -> Option<Tree<String>> {
    let mut visitor = TermTreeVisitor::default();
    traverse(tree.arena(), &mut visitor);
    visitor.done
}

/// Indented box-drawing rendering; empty string for an empty tree.
pub fn render_tree(tree: &SubcloneTree) -> String {
    to_term_tree(tree)
        .map(|t| t.to_string())
        .unwrap_or_default()
}

/// Nested fraction notation, e.g. `1(0.6(0.3),0.4)`.
struct FractionVisitor {
    out: String,
    /// Whether the node at each open depth already printed a child
    has_child: Vec<bool>,
}

impl TreeVisitor<Subclone> for FractionVisitor {
    fn enter(&mut self, tree: &TreeArena<Subclone>, node: Index) -> VisitFlow {
        if let Some(siblings) = self.has_child.last_mut() {
            self.out.push(if *siblings { ',' } else { '(' });
            *siblings = true;
        }
        if let Some(subclone) = tree.data(node) {
            let _ = write!(self.out, "{}", subclone.fraction());
        }
        self.has_child.push(false);
        VisitFlow::Continue
    }

    fn exit(&mut self, _tree: &TreeArena<Subclone>, _node: Index) {
        if self.has_child.pop() == Some(true) {
            self.out.push(')');
        }
    }
}

pub fn fraction_string(tree: &SubcloneTree) -> String {
    let mut visitor = FractionVisitor {
        out: String::new(),
        has_child: Vec::new(),
    };
    traverse(tree.arena(), &mut visitor);
    visitor.out
}

/// GraphViz rendering: node list, then edge list.
#[derive(Default)]
struct DotVisitor {
    nodes: String,
    edges: String,
}

impl TreeVisitor<Subclone> for DotVisitor {
    fn enter(&mut self, tree: &TreeArena<Subclone>, node: Index) -> VisitFlow {
        let Some(subclone) = tree.data(node) else {
            return VisitFlow::SkipSubtree;
        };
        let id = subclone.id();
        let percent = subclone.fraction() * 100.0;
        let _ = match subclone.cluster_name() {
            Some(name) => writeln!(
                self.nodes,
                "\t{} [label=\"{} {}: {:.1}%\"];",
                id, id, name, percent
            ),
            None => writeln!(self.nodes, "\t{} [label=\"{}: {:.1}%\"];", id, id, percent),
        };
        if let Some(parent) = tree.parent(node).and_then(|p| tree.data(p)) {
            let _ = writeln!(self.edges, "\t{}->{};", parent.id(), id);
        }
        VisitFlow::Continue
    }
}

pub fn to_dot(tree: &SubcloneTree) -> String {
    let mut visitor = DotVisitor::default();
    traverse(tree.arena(), &mut visitor);
    format!("digraph {{\n{}{}}}\n", visitor.nodes, visitor.edges)
}
