//! Top-down hierarchy construction.
//!
//! Each node splits its primitives at the median centroid along the longest
//! axis of its box, so depth stays logarithmic regardless of clustering.
//! Centroid ties are broken by primitive index, which makes the partition a
//! total order and the output arena a pure function of the input.
//!
//! The arena is preallocated: the node count of a subtree depends only on its
//! primitive count, so each subtree owns a disjoint slice of the arena and a
//! disjoint slice of the permutation. Large subtrees are built with
//! `rayon::join`; the result is identical to a sequential build.

use glam::DVec3;

use crate::aabb::Aabb;
use crate::node_store::{Node, NodeKind, NodeStore};

const PLACEHOLDER: Node = Node {
    aabb: Aabb {
        min: DVec3::ZERO,
        max: DVec3::ZERO,
    },
    kind: NodeKind::Leaf {
        offset: 0,
        count: 0,
    },
};

/// Read-only inputs shared by every subtree.
struct BuildContext<'a> {
    bounds: &'a [Aabb],
    centroids: &'a [DVec3],
    leaf_capacity: usize,
    parallel_threshold: usize,
}

/// Number of leaves produced for `count` primitives.
fn leaf_count(count: usize, leaf_capacity: usize) -> usize {
    if count <= leaf_capacity {
        1
    } else {
        let mid = count / 2;
        leaf_count(mid, leaf_capacity) + leaf_count(count - mid, leaf_capacity)
    }
}

/// Number of nodes produced for `count` primitives.
pub(crate) fn node_count(count: usize, leaf_capacity: usize) -> usize {
    if count == 0 {
        0
    } else {
        2 * leaf_count(count, leaf_capacity.max(1)) - 1
    }
}

/// Builds the node arena and the leaf permutation.
///
/// `bounds` and `centroids` are indexed by primitive. A `leaf_capacity` of
/// zero is treated as one.
pub(crate) fn build(
    bounds: &[Aabb],
    centroids: &[DVec3],
    leaf_capacity: usize,
    parallel_threshold: usize,
) -> (NodeStore, Vec<usize>) {
    debug_assert_eq!(bounds.len(), centroids.len(), "one centroid per primitive");
    let leaf_capacity = leaf_capacity.max(1);
    let mut permutation: Vec<usize> = (0..bounds.len()).collect();
    let mut nodes = vec![PLACEHOLDER; node_count(bounds.len(), leaf_capacity)];
    if !permutation.is_empty() {
        let ctx = BuildContext {
            bounds,
            centroids,
            leaf_capacity,
            parallel_threshold: parallel_threshold.max(2),
        };
        build_subtree(&ctx, &mut permutation, 0, &mut nodes, 0);
    }
    (NodeStore::from_nodes(nodes), permutation)
}

/// Builds the subtree over `permutation` (which starts at permutation slot
/// `offset`) into `nodes` (which starts at arena index `base`).
fn build_subtree(
    ctx: &BuildContext<'_>,
    permutation: &mut [usize],
    offset: usize,
    nodes: &mut [Node],
    base: usize,
) {
    let aabb = permutation
        .iter()
        .fold(Aabb::empty(), |acc, &p| acc.union(&ctx.bounds[p]));

    if permutation.len() <= ctx.leaf_capacity {
        permutation.sort_unstable();
        nodes[0] = Node {
            aabb,
            kind: NodeKind::Leaf {
                offset,
                count: permutation.len(),
            },
        };
        return;
    }

    let axis = aabb.longest_axis();
    let mid = permutation.len() / 2;
    let centroids = ctx.centroids;
    let _ = permutation.select_nth_unstable_by(mid, |&a, &b| {
        centroids[a][axis]
            .total_cmp(&centroids[b][axis])
            .then(a.cmp(&b))
    });

    let left_nodes = node_count(mid, ctx.leaf_capacity);
    let (root, rest) = nodes.split_at_mut(1);
    let (left_slice, right_slice) = rest.split_at_mut(left_nodes);
    let children = [base + 1, base + 1 + left_nodes];
    root[0] = Node {
        aabb,
        kind: NodeKind::Internal { children },
    };

    let parallel = permutation.len() >= ctx.parallel_threshold;
    let (left, right) = permutation.split_at_mut(mid);
    if parallel {
        let _ = rayon::join(
            || build_subtree(ctx, left, offset, left_slice, children[0]),
            || build_subtree(ctx, right, offset + mid, right_slice, children[1]),
        );
    } else {
        build_subtree(ctx, left, offset, left_slice, children[0]);
        build_subtree(ctx, right, offset + mid, right_slice, children[1]);
    }
}
