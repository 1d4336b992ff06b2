//! Flat arena of hierarchy nodes.
//!
//! Nodes are stored in pre-order: the root is node 0 and every child index is
//! greater than its parent's, so a reverse sweep visits children before
//! parents.

use core::ops::Range;

use crate::aabb::Aabb;
use crate::error::{HierarchyError, Result};

/// Leaf or internal payload of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Contiguous range `offset..offset + count` of the permutation array.
    Leaf {
        /// First permutation slot.
        offset: usize,
        /// Number of primitives.
        count: usize,
    },
    /// Exactly two children.
    Internal {
        /// Left and right child node indices.
        children: [usize; 2],
    },
}

/// A node: its box and its payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    /// Box bounding every primitive in this subtree.
    pub aabb: Aabb,
    /// Leaf range or child pair.
    pub kind: NodeKind,
}

impl Node {
    /// Returns `true` for leaves.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// Index-addressed node storage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeStore {
    nodes: Vec<Node>,
}

impl NodeStore {
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the store holds no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in pre-order.
    #[inline]
    pub fn as_slice(&self) -> &[Node] {
        &self.nodes
    }

    /// Node `i`.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown node.
    pub fn node(&self, i: usize) -> Result<&Node> {
        self.nodes.get(i).ok_or(HierarchyError::IndexOutOfRange {
            index: i,
            len: self.nodes.len(),
        })
    }

    /// Box of node `i`.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown node.
    pub fn aabb(&self, i: usize) -> Result<&Aabb> {
        self.node(i).map(|n| &n.aabb)
    }

    /// Whether node `i` is a leaf.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown node.
    pub fn is_leaf(&self, i: usize) -> Result<bool> {
        self.node(i).map(Node::is_leaf)
    }

    /// Child pair of node `i`, `None` for leaves.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown node.
    pub fn children(&self, i: usize) -> Result<Option<[usize; 2]>> {
        self.node(i).map(|n| match n.kind {
            NodeKind::Internal { children } => Some(children),
            NodeKind::Leaf { .. } => None,
        })
    }

    /// Permutation range of leaf `i`, `None` for internal nodes.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown node.
    pub fn primitive_range(&self, i: usize) -> Result<Option<Range<usize>>> {
        self.node(i).map(|n| match n.kind {
            NodeKind::Leaf { offset, count } => Some(offset..offset + count),
            NodeKind::Internal { .. } => None,
        })
    }

    /// Number of levels; zero when empty.
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((i, level)) = stack.pop() {
            deepest = deepest.max(level);
            if let NodeKind::Internal { children } = self.nodes[i].kind {
                stack.push((children[0], level + 1));
                stack.push((children[1], level + 1));
            }
        }
        deepest
    }

    /// Sum of node volumes, the looseness measure.
    pub(crate) fn total_volume(&self) -> f64 {
        self.nodes.iter().map(|n| n.aabb.volume()).sum()
    }

    #[inline]
    pub(crate) fn get(&self, i: usize) -> &Node {
        &self.nodes[i]
    }

    #[inline]
    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }
}
