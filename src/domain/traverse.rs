//! Depth-first traversal engine.
//!
//! Every tree feature (printing, saving, loading, merging, coexistence) is a
//! visitor driven by the single walk in [`drive`]. The walk is pre-order on
//! `enter` and post-order on `exit`; children are visited in stored order.
//!
//! - `SkipSubtree` from `enter` suppresses the node's children, `exit` is
//!   still called for the node itself.
//! - `Abort` from `enter` stops the walk at once: no further `enter`/`exit`
//!   calls happen. Side effects performed so far are not rolled back.
//! - Walking an empty tree is a no-op that completes.
//!
//! The walk keeps an explicit stack, so deep trees do not recurse.

use generational_arena::Index;
use tracing::trace;

use crate::domain::arena::TreeArena;

/// Decision returned by a visitor when entering a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFlow {
    Continue,
    SkipSubtree,
    Abort,
}

/// How a traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    Completed,
    Aborted,
}

impl Traversal {
    pub fn is_aborted(self) -> bool {
        self == Traversal::Aborted
    }
}

/// Visitor over a shared tree.
pub trait TreeVisitor<T> {
    fn enter(&mut self, tree: &TreeArena<T>, node: Index) -> VisitFlow;

    fn exit(&mut self, _tree: &TreeArena<T>, _node: Index) {}
}

/// Visitor allowed to mutate the tree while it is walked.
///
/// Children appended to `node` during `enter` are visited in the same walk.
pub trait TreeVisitorMut<T> {
    fn enter(&mut self, tree: &mut TreeArena<T>, node: Index) -> VisitFlow;

    fn exit(&mut self, _tree: &mut TreeArena<T>, _node: Index) {}
}

/// Visitor assembled from two closures.
pub struct FnVisitor<E, X> {
    on_enter: E,
    on_exit: X,
}

/// Builds a visitor from an `enter` and an `exit` closure.
pub fn visitor_fn<T, E, X>(on_enter: E, on_exit: X) -> FnVisitor<E, X>
where
    E: FnMut(&TreeArena<T>, Index) -> VisitFlow,
    X: FnMut(&TreeArena<T>, Index),
{
    FnVisitor { on_enter, on_exit }
}

impl<T, E, X> TreeVisitor<T> for FnVisitor<E, X>
where
    E: FnMut(&TreeArena<T>, Index) -> VisitFlow,
    X: FnMut(&TreeArena<T>, Index),
{
    fn enter(&mut self, tree: &TreeArena<T>, node: Index) -> VisitFlow {
        (self.on_enter)(tree, node)
    }

    fn exit(&mut self, tree: &TreeArena<T>, node: Index) {
        (self.on_exit)(tree, node)
    }
}

/// Walks the whole tree from its root.
pub fn traverse<T, V: TreeVisitor<T>>(tree: &TreeArena<T>, visitor: &mut V) -> Traversal {
    traverse_from(tree, tree.root(), visitor)
}

/// Walks the subtree rooted at `start`.
pub fn traverse_from<T, V: TreeVisitor<T>>(
    tree: &TreeArena<T>,
    start: Option<Index>,
    visitor: &mut V,
) -> Traversal {
    let mut cursor = Shared { tree, visitor };
    drive(start, &mut cursor)
}

/// Walks the whole tree, handing the visitor mutable access.
pub fn traverse_mut<T, V: TreeVisitorMut<T>>(tree: &mut TreeArena<T>, visitor: &mut V) -> Traversal {
    let root = tree.root();
    let mut cursor = Exclusive { tree, visitor };
    drive(root, &mut cursor)
}

/// Calls `f` for every node in post-order (children before parents).
pub fn traverse_post_order<T, F>(tree: &TreeArena<T>, f: F) -> Traversal
where
    F: FnMut(&TreeArena<T>, Index),
{
    let mut visitor = visitor_fn(|_: &TreeArena<T>, _| VisitFlow::Continue, f);
    traverse(tree, &mut visitor)
}

/// Access the walk needs: visitor hooks plus positional child lookup.
trait Cursor {
    fn enter(&mut self, node: Index) -> VisitFlow;
    fn exit(&mut self, node: Index);
    fn child(&self, node: Index, position: usize) -> Option<Index>;
}

struct Shared<'a, T, V> {
    tree: &'a TreeArena<T>,
    visitor: &'a mut V,
}

impl<T, V: TreeVisitor<T>> Cursor for Shared<'_, T, V> {
    fn enter(&mut self, node: Index) -> VisitFlow {
        self.visitor.enter(self.tree, node)
    }

    fn exit(&mut self, node: Index) {
        self.visitor.exit(self.tree, node)
    }

    fn child(&self, node: Index, position: usize) -> Option<Index> {
        self.tree.children(node).get(position).copied()
    }
}

struct Exclusive<'a, T, V> {
    tree: &'a mut TreeArena<T>,
    visitor: &'a mut V,
}

impl<T, V: TreeVisitorMut<T>> Cursor for Exclusive<'_, T, V> {
    fn enter(&mut self, node: Index) -> VisitFlow {
        self.visitor.enter(self.tree, node)
    }

    fn exit(&mut self, node: Index) {
        self.visitor.exit(self.tree, node)
    }

    fn child(&self, node: Index, position: usize) -> Option<Index> {
        self.tree.children(node).get(position).copied()
    }
}

fn drive<C: Cursor>(start: Option<Index>, cursor: &mut C) -> Traversal {
    let Some(start) = start else {
        return Traversal::Completed;
    };

    // (node, position of the next child to visit)
    let mut stack: Vec<(Index, usize)> = Vec::new();
    match cursor.enter(start) {
        VisitFlow::Abort => return Traversal::Aborted,
        VisitFlow::SkipSubtree => {
            cursor.exit(start);
            return Traversal::Completed;
        }
        VisitFlow::Continue => stack.push((start, 0)),
    }

    while let Some(frame) = stack.last_mut() {
        let (node, position) = *frame;
        match cursor.child(node, position) {
            Some(child) => {
                frame.1 += 1;
                match cursor.enter(child) {
                    VisitFlow::Abort => {
                        trace!("traversal aborted at {:?}", child);
                        return Traversal::Aborted;
                    }
                    VisitFlow::SkipSubtree => cursor.exit(child),
                    VisitFlow::Continue => stack.push((child, 0)),
                }
            }
            None => {
                stack.pop();
                cursor.exit(node);
            }
        }
    }
    Traversal::Completed
}
