use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::error::{DomainError, DomainResult};

/// Tree node in the arena-based hierarchy structure.
///
/// The parent link is a plain index (back-pointer, no ownership). Children are
/// owned exclusively: removing a node removes its whole subtree.
#[derive(Debug)]
pub struct TreeNode<T> {
    /// Payload carried by this node
    pub data: T,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in stored order
    pub children: Vec<Index>,
}

/// Arena-based n-ary tree.
///
/// Uses generational arena for memory-safe node references and O(1) lookups.
/// Stale indices (of removed nodes) never resolve to a different node.
#[derive(Debug)]
pub struct TreeArena<T> {
    /// Arena storage for all tree nodes
    arena: Arena<TreeNode<T>>,
    /// Index of the root node, None for empty trees
    root: Option<Index>,
}

impl<T> Default for TreeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(idx: Index) -> DomainError {
    DomainError::NodeNotFound(format!("{:?}", idx))
}

impl<T> TreeArena<T> {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    #[instrument(level = "trace", skip(self, data))]
    pub fn insert_root(&mut self, data: T) -> DomainResult<Index> {
        if self.root.is_some() {
            return Err(DomainError::RootExists);
        }
        let idx = self.arena.insert(TreeNode {
            data,
            parent: None,
            children: Vec::new(),
        });
        self.root = Some(idx);
        Ok(idx)
    }

    /// Appends a new node as the last child of `parent`.
    #[instrument(level = "trace", skip(self, data))]
    pub fn insert_child(&mut self, parent: Index, data: T) -> DomainResult<Index> {
        if !self.arena.contains(parent) {
            return Err(missing(parent));
        }
        let idx = self.arena.insert(TreeNode {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.children.push(idx);
        }
        Ok(idx)
    }

    /// Detaches `idx` from its parent and drops it together with all descendants.
    ///
    /// Returns the payloads of the removed nodes in pre-order.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_subtree(&mut self, idx: Index) -> DomainResult<Vec<T>> {
        let parent = self.get_node(idx).ok_or_else(|| missing(idx))?.parent;
        match parent {
            Some(parent_idx) => {
                if let Some(parent_node) = self.arena.get_mut(parent_idx) {
                    parent_node.children.retain(|&c| c != idx);
                }
            }
            None => self.root = None,
        }

        let mut removed = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.arena.remove(current) {
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
                removed.push(node.data);
            }
        }
        Ok(removed)
    }

    pub fn get_node(&self, idx: Index) -> Option<&TreeNode<T>> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut TreeNode<T>> {
        self.arena.get_mut(idx)
    }

    pub fn data(&self, idx: Index) -> Option<&T> {
        self.arena.get(idx).map(|node| &node.data)
    }

    pub fn data_mut(&mut self, idx: Index) -> Option<&mut T> {
        self.arena.get_mut(idx).map(|node| &mut node.data)
    }

    pub fn parent(&self, idx: Index) -> Option<Index> {
        self.arena.get(idx).and_then(|node| node.parent)
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.arena
            .get(idx)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, idx: Index) -> bool {
        self.arena.contains(idx)
    }

    pub fn is_leaf(&self, idx: Index) -> bool {
        self.children(idx).is_empty()
    }

    pub fn is_root(&self, idx: Index) -> bool {
        self.arena.contains(idx) && self.parent(idx).is_none()
    }

    /// Walks from `idx` (exclusive) up to the root.
    pub fn ancestors(&self, idx: Index) -> Ancestors<'_, T> {
        Ancestors {
            arena: self,
            next: self.parent(idx),
        }
    }

    /// Whether `ancestor` lies on the path from the root to `node` (inclusive).
    pub fn is_ancestor_or_self(&self, ancestor: Index, node: Index) -> bool {
        ancestor == node || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Number of edges between the root and `idx`.
    pub fn level(&self, idx: Index) -> usize {
        self.ancestors(idx).count()
    }

    pub fn iter(&self) -> TreeIterator<'_, T> {
        TreeIterator::new(self)
    }

    pub fn iter_postorder(&self) -> PostOrderIterator<'_, T> {
        PostOrderIterator::new(self)
    }

    /// Number of levels; walks with an explicit stack so deep chains are fine.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        let mut stack: Vec<(Index, usize)> = self.root.into_iter().map(|r| (r, 1)).collect();
        let mut deepest = 0;
        while let Some((idx, level)) = stack.pop() {
            deepest = deepest.max(level);
            stack.extend(self.children(idx).iter().map(|&child| (child, level + 1)));
        }
        deepest
    }

    /// Collects all leaf nodes (nodes with no children) in pre-order.
    ///
    /// Empty trees return an empty vector.
    #[instrument(level = "debug", skip(self))]
    pub fn leaf_nodes(&self) -> Vec<Index> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(idx, _)| idx)
            .collect()
    }
}

pub struct Ancestors<'a, T> {
    arena: &'a TreeArena<T>,
    next: Option<Index>,
}

impl<T> Iterator for Ancestors<'_, T> {
    type Item = Index;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.arena.parent(current);
        Some(current)
    }
}

pub struct TreeIterator<'a, T> {
    arena: &'a TreeArena<T>,
    stack: Vec<Index>,
}

impl<'a, T> TreeIterator<'a, T> {
    fn new(arena: &'a TreeArena<T>) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push(root);
        }
        Self { arena, stack }
    }
}

impl<'a, T> Iterator for TreeIterator<'a, T> {
    type Item = (Index, &'a TreeNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a, T> {
    arena: &'a TreeArena<T>,
    stack: Vec<(Index, bool)>,
}

impl<'a, T> PostOrderIterator<'a, T> {
    fn new(arena: &'a TreeArena<T>) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push((root, false));
        }
        Self { arena, stack }
    }
}

impl<'a, T> Iterator for PostOrderIterator<'a, T> {
    type Item = (Index, &'a TreeNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
