//! Query implementations for [`TetrahedralAabbHierarchy`].
//!
//! Every query is a pruning descent over the node arena with an explicit
//! stack. Box tests decide which subtrees to enter; exact tetrahedron tests
//! are applied only at the leaves. Queries borrow the hierarchy immutably and
//! may run concurrently with each other.

use glam::DVec3;
use rayon::prelude::*;

use crate::aabb::Aabb;
use crate::error::{HierarchyError, Result};
use crate::geometry::{point_in_tetrahedron, point_tetrahedron_distance_squared, tetrahedra_intersect};
use crate::hierarchy::TetrahedralAabbHierarchy;
use crate::node_store::{Node, NodeKind};

/// Nearest tetrahedron to a query point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Nearest {
    /// Tetrahedron index.
    pub primitive: usize,
    /// Euclidean distance from the point to the solid tetrahedron.
    pub distance: f64,
}

/// Lazy sequence of primitive pairs whose boxes overlap.
///
/// Produced by [`TetrahedralAabbHierarchy::candidate_pairs`]. Pairs are
/// `(i, j)` with `i` indexing the first hierarchy and `j` the second. The
/// sequence is finite and a new one can be requested at any time.
#[derive(Debug)]
pub struct CandidatePairs<'a> {
    a: &'a TetrahedralAabbHierarchy,
    b: &'a TetrahedralAabbHierarchy,
    stack: Vec<(usize, usize)>,
    pending: Vec<(usize, usize)>,
}

impl<'a> CandidatePairs<'a> {
    fn new(a: &'a TetrahedralAabbHierarchy, b: &'a TetrahedralAabbHierarchy) -> Self {
        let stack = if a.nodes.is_empty() || b.nodes.is_empty() {
            Vec::new()
        } else {
            vec![(0, 0)]
        };
        Self {
            a,
            b,
            stack,
            pending: Vec::new(),
        }
    }

    fn push_leaf_pairs(&mut self, leaf_a: &[usize], leaf_b: &[usize]) {
        for &pa in leaf_a {
            let box_a = &self.a.primitive_bounds[pa];
            for &pb in leaf_b {
                if box_a.intersects(&self.b.primitive_bounds[pb]) {
                    self.pending.push((pa, pb));
                }
            }
        }
        // Popped from the back; keep emission in leaf order.
        self.pending.reverse();
    }
}

impl Iterator for CandidatePairs<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.pending.pop() {
                return Some(pair);
            }
            let (i, j) = self.stack.pop()?;
            let node_a = self.a.nodes.get(i);
            let node_b = self.b.nodes.get(j);
            if !node_a.aabb.intersects(&node_b.aabb) {
                continue;
            }
            match (node_a.kind, node_b.kind) {
                (
                    NodeKind::Leaf { offset: oa, count: ca },
                    NodeKind::Leaf { offset: ob, count: cb },
                ) => {
                    let (a, b) = (self.a, self.b);
                    self.push_leaf_pairs(&a.permutation[oa..oa + ca], &b.permutation[ob..ob + cb]);
                }
                (NodeKind::Leaf { .. }, NodeKind::Internal { children }) => {
                    self.stack.push((i, children[1]));
                    self.stack.push((i, children[0]));
                }
                (NodeKind::Internal { children }, NodeKind::Leaf { .. }) => {
                    self.stack.push((children[1], j));
                    self.stack.push((children[0], j));
                }
                (NodeKind::Internal { children: ca }, NodeKind::Internal { children: cb }) => {
                    // Descend the larger box first to shrink it toward the other.
                    if node_a.aabb.volume() >= node_b.aabb.volume() {
                        self.stack.push((ca[1], j));
                        self.stack.push((ca[0], j));
                    } else {
                        self.stack.push((i, cb[1]));
                        self.stack.push((i, cb[0]));
                    }
                }
            }
        }
    }
}

impl TetrahedralAabbHierarchy {
    /// Depth-first descent. `enter` decides whether a node's box is worth
    /// visiting; `visit` receives leaf primitives and returns `true` to stop.
    fn traverse<E, V>(&self, mut enter: E, mut visit: V)
    where
        E: FnMut(&Aabb) -> bool,
        V: FnMut(usize) -> bool,
    {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            let node: &Node = self.nodes.get(i);
            if !enter(&node.aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { offset, count } => {
                    for &primitive in &self.permutation[offset..offset + count] {
                        if visit(primitive) {
                            return;
                        }
                    }
                }
                NodeKind::Internal { children } => {
                    stack.push(children[1]);
                    stack.push(children[0]);
                }
            }
        }
    }

    /// Box-level overlap candidates between this hierarchy and `other`.
    ///
    /// Yields every `(i, j)` whose primitive boxes intersect (inclusive on
    /// faces). The hierarchy makes no claim of exact intersection; narrow with
    /// [`TetrahedralAabbHierarchy::overlapping_primitives`] or
    /// [`TetrahedralAabbHierarchy::candidate_pairs_with`].
    ///
    /// # Examples
    /// ```
    /// use tetra_aabb::prelude::*;
    ///
    /// let bvh = TetrahedralAabbHierarchy::with_default_config(&TetMesh::cube_grid([1, 1, 1], 1.0)?)?;
    /// let pairs: Vec<_> = bvh.candidate_pairs(&bvh).collect();
    /// assert!(pairs.contains(&(3, 3)));
    /// # Ok::<(), HierarchyError>(())
    /// ```
    pub fn candidate_pairs<'a>(&'a self, other: &'a Self) -> CandidatePairs<'a> {
        CandidatePairs::new(self, other)
    }

    /// Candidate pairs accepted by `filter`, typically an exact test.
    pub fn candidate_pairs_with<'a, F>(
        &'a self,
        other: &'a Self,
        mut filter: F,
    ) -> impl Iterator<Item = (usize, usize)> + 'a
    where
        F: FnMut(usize, usize) -> bool + 'a,
    {
        self.candidate_pairs(other).filter(move |&(i, j)| filter(i, j))
    }

    /// Pairs of tetrahedra that truly intersect, sorted ascending.
    ///
    /// Candidates are narrowed with the exact separating-axis test; touching
    /// tetrahedra count as intersecting.
    pub fn overlapping_primitives(&self, other: &Self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = self
            .candidate_pairs_with(other, |i, j| {
                tetrahedra_intersect(&self.tet_vertices(i), &other.tet_vertices(j))
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Intersecting pairs `i < j` within this mesh that share no vertex,
    /// sorted ascending. Mesh neighbours always touch and are skipped.
    pub fn self_overlapping_primitives(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = self
            .candidate_pairs_with(self, |i, j| {
                i < j
                    && !self.tetrahedra[i]
                        .iter()
                        .any(|v| self.tetrahedra[j].contains(v))
                    && tetrahedra_intersect(&self.tet_vertices(i), &self.tet_vertices(j))
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Appends every primitive whose box intersects `query`.
    ///
    /// Results are appended in traversal order (not cleared first). A box
    /// with a NaN corner finds nothing; infinite corners are allowed.
    pub fn primitives_in_box(&self, query: &Aabb, results: &mut Vec<usize>) {
        if query.min.is_nan() || query.max.is_nan() {
            return;
        }
        self.traverse(
            |aabb| aabb.intersects(query),
            |primitive| {
                if self.primitive_bounds[primitive].intersects(query) {
                    results.push(primitive);
                }
                false
            },
        );
    }

    /// Appends every primitive whose box intersects the sphere.
    ///
    /// A negative or non-finite radius, or a non-finite center, finds nothing.
    pub fn primitives_in_sphere(&self, center: DVec3, radius: f64, results: &mut Vec<usize>) {
        if radius < 0.0 || !radius.is_finite() || !center.is_finite() {
            return;
        }
        self.traverse(
            |aabb| aabb.intersects_sphere(center, radius),
            |primitive| {
                if self.primitive_bounds[primitive].intersects_sphere(center, radius) {
                    results.push(primitive);
                }
                false
            },
        );
    }

    /// First tetrahedron containing `p` (boundary inclusive).
    ///
    /// Leaves are visited depth-first, left before right, and members of a
    /// leaf in ascending index order, so a point on a shared face resolves to
    /// the same tetrahedron on every run.
    ///
    /// # Errors
    /// [`HierarchyError::NotFound`] when no tetrahedron contains `p`,
    /// [`HierarchyError::EmptyHierarchy`] when there are no tetrahedra and
    /// [`HierarchyError::InvalidGeometry`] for a non-finite point.
    pub fn locate_point(&self, p: DVec3) -> Result<usize> {
        self.check_query_point(p)?;
        let mut found = None;
        self.traverse(
            |aabb| aabb.contains_point(p),
            |primitive| {
                if self.contains_point(primitive, p) {
                    found = Some(primitive);
                    return true;
                }
                false
            },
        );
        found.ok_or(HierarchyError::NotFound)
    }

    /// Appends every tetrahedron containing `p`.
    ///
    /// A non-finite `p` finds nothing. Use
    /// [`TetrahedralAabbHierarchy::locate_point`] to have it reported as
    /// [`HierarchyError::InvalidGeometry`].
    pub fn locate_point_all(&self, p: DVec3, results: &mut Vec<usize>) {
        if !p.is_finite() {
            return;
        }
        self.traverse(
            |aabb| aabb.contains_point(p),
            |primitive| {
                if self.contains_point(primitive, p) {
                    results.push(primitive);
                }
                false
            },
        );
    }

    /// [`TetrahedralAabbHierarchy::locate_point`] for a batch; `None` where
    /// no tetrahedron contains the point.
    ///
    /// Batches of at least `parallel_threshold` points run on the rayon pool.
    pub fn locate_points(&self, points: &[DVec3]) -> Vec<Option<usize>> {
        if points.len() >= self.config.parallel_threshold {
            points.par_iter().map(|&p| self.locate_point(p).ok()).collect()
        } else {
            points.iter().map(|&p| self.locate_point(p).ok()).collect()
        }
    }

    /// Nearest tetrahedron to `p` and its distance (zero inside).
    ///
    /// Branch and bound: the child whose box is nearer is visited first and
    /// subtrees whose box lies farther than the best distance so far are
    /// skipped. Equal distances resolve to the lowest primitive index.
    ///
    /// # Errors
    /// [`HierarchyError::EmptyHierarchy`] when there are no tetrahedra and
    /// [`HierarchyError::InvalidGeometry`] for a non-finite point.
    pub fn nearest_primitive(&self, p: DVec3) -> Result<Nearest> {
        self.check_query_point(p)?;
        let mut best_d2 = f64::INFINITY;
        let mut best = usize::MAX;
        let mut stack = vec![(self.nodes.get(0).aabb.distance_squared(p), 0usize)];

        while let Some((lower_bound, i)) = stack.pop() {
            if lower_bound > best_d2 {
                continue;
            }
            match self.nodes.get(i).kind {
                NodeKind::Leaf { offset, count } => {
                    for &primitive in &self.permutation[offset..offset + count] {
                        if self.primitive_bounds[primitive].distance_squared(p) > best_d2 {
                            continue;
                        }
                        let d2 = point_tetrahedron_distance_squared(p, &self.tet_vertices(primitive));
                        if d2 < best_d2 || (d2 == best_d2 && primitive < best) {
                            best_d2 = d2;
                            best = primitive;
                        }
                    }
                }
                NodeKind::Internal { children: [left, right] } => {
                    let dl = self.nodes.get(left).aabb.distance_squared(p);
                    let dr = self.nodes.get(right).aabb.distance_squared(p);
                    // Nearer child on top of the stack.
                    if dl <= dr {
                        stack.push((dr, right));
                        stack.push((dl, left));
                    } else {
                        stack.push((dl, left));
                        stack.push((dr, right));
                    }
                }
            }
        }

        Ok(Nearest {
            primitive: best,
            distance: best_d2.sqrt(),
        })
    }

    /// [`TetrahedralAabbHierarchy::nearest_primitive`] for a batch.
    ///
    /// # Errors
    /// The first error any point produces.
    pub fn nearest_primitives(&self, points: &[DVec3]) -> Result<Vec<Nearest>> {
        if points.len() >= self.config.parallel_threshold {
            points.par_iter().map(|&p| self.nearest_primitive(p)).collect()
        } else {
            points.iter().map(|&p| self.nearest_primitive(p)).collect()
        }
    }

    #[inline]
    fn contains_point(&self, primitive: usize, p: DVec3) -> bool {
        self.primitive_bounds[primitive].contains_point(p)
            && point_in_tetrahedron(p, &self.tet_vertices(primitive))
    }

    fn check_query_point(&self, p: DVec3) -> Result<()> {
        if self.is_empty() {
            return Err(HierarchyError::EmptyHierarchy);
        }
        if !p.is_finite() {
            return Err(HierarchyError::InvalidGeometry(format!(
                "query point {p} is not finite"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierarchyConfig;
    use crate::mesh::TetMesh;

    fn unit_tet_mesh() -> TetMesh {
        TetMesh::new(vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z], vec![[0, 1, 2, 3]]).unwrap()
    }

    fn two_disjoint_tets() -> TetMesh {
        let mut positions = vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        positions.extend([DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z].map(|v| v + DVec3::splat(5.0)));
        TetMesh::new(positions, vec![[0, 1, 2, 3], [4, 5, 6, 7]]).unwrap()
    }

    fn grid_bvh(leaf_capacity: usize) -> TetrahedralAabbHierarchy {
        TetrahedralAabbHierarchy::new(
            &TetMesh::cube_grid([4, 3, 2], 1.0).unwrap(),
            HierarchyConfig::default().with_leaf_capacity(leaf_capacity),
        )
        .unwrap()
    }

    #[test]
    fn test_locate_point_unit_tetrahedron() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&unit_tet_mesh()).unwrap();
        assert_eq!(bvh.locate_point(DVec3::splat(0.1)), Ok(0));
        assert_eq!(bvh.locate_point(DVec3::splat(2.0)), Err(HierarchyError::NotFound));
        // Inside the box, outside the tetrahedron.
        assert_eq!(bvh.locate_point(DVec3::splat(0.9)), Err(HierarchyError::NotFound));
    }

    #[test]
    fn test_locate_point_non_finite() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&unit_tet_mesh()).unwrap();
        assert!(matches!(
            bvh.locate_point(DVec3::new(f64::NAN, 0.0, 0.0)),
            Err(HierarchyError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_locate_point_in_grid() {
        let bvh = grid_bvh(2);
        for t in 0..bvh.num_primitives() {
            let tet = bvh.primitive_vertices(t).unwrap();
            let centroid = (tet[0] + tet[1] + tet[2] + tet[3]) * 0.25;
            assert_eq!(bvh.locate_point(centroid), Ok(t), "centroid of {t}");
        }
    }

    #[test]
    fn test_locate_point_all_on_shared_vertex() {
        let bvh = grid_bvh(4);
        let mut results = Vec::new();
        // Grid vertex shared by the six tetrahedra of each adjacent cube on the diagonal.
        bvh.locate_point_all(DVec3::new(1.0, 1.0, 1.0), &mut results);
        assert!(results.len() >= 6);
        let first = bvh.locate_point(DVec3::new(1.0, 1.0, 1.0)).unwrap();
        assert!(results.contains(&first));
    }

    #[test]
    fn test_locate_points_batch() {
        let bvh = TetrahedralAabbHierarchy::new(
            &unit_tet_mesh(),
            HierarchyConfig::default().with_parallel_threshold(1),
        )
        .unwrap();
        let found = bvh.locate_points(&[DVec3::splat(0.1), DVec3::splat(3.0)]);
        assert_eq!(found, vec![Some(0), None]);
    }

    #[test]
    fn test_nearest_primitive() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&two_disjoint_tets()).unwrap();
        let near = bvh.nearest_primitive(DVec3::new(-1.0, 0.0, 0.0)).unwrap();
        assert_eq!(near.primitive, 0);
        assert!((near.distance - 1.0).abs() < 1e-12);
        let near = bvh.nearest_primitive(DVec3::splat(7.0)).unwrap();
        assert_eq!(near.primitive, 1);
    }

    #[test]
    fn test_nearest_ties_pick_lowest_index() {
        let bvh = grid_bvh(1);
        // Grid corner: touched by several tetrahedra at distance zero.
        let near = bvh.nearest_primitive(DVec3::ZERO).unwrap();
        assert_eq!(near.distance, 0.0);
        let mut containing = Vec::new();
        bvh.locate_point_all(DVec3::ZERO, &mut containing);
        assert_eq!(Some(&near.primitive), containing.iter().min());
    }

    #[test]
    fn test_nearest_primitives_batch() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&two_disjoint_tets()).unwrap();
        let nearest = bvh
            .nearest_primitives(&[DVec3::splat(-1.0), DVec3::splat(9.0)])
            .unwrap();
        assert_eq!(nearest.iter().map(|n| n.primitive).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_empty_hierarchy_queries() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&TetMesh::new(Vec::new(), Vec::new()).unwrap())
            .unwrap();
        assert_eq!(bvh.nearest_primitive(DVec3::ZERO), Err(HierarchyError::EmptyHierarchy));
        assert_eq!(bvh.locate_point(DVec3::ZERO), Err(HierarchyError::EmptyHierarchy));
        assert_eq!(bvh.candidate_pairs(&bvh).count(), 0);
        assert!(bvh.nearest_primitives(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_disjoint_tetrahedra_do_not_overlap() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&unit_tet_mesh()).unwrap();
        let far = TetMesh::new(
            [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z].map(|v| v + DVec3::splat(3.0)).to_vec(),
            vec![[0, 1, 2, 3]],
        )
        .unwrap();
        let other = TetrahedralAabbHierarchy::with_default_config(&far).unwrap();
        assert_eq!(bvh.candidate_pairs(&other).count(), 0);
        assert!(bvh.overlapping_primitives(&other).is_empty());
    }

    #[test]
    fn test_self_overlap_contains_diagonal() {
        let bvh = grid_bvh(3);
        let pairs: Vec<_> = bvh.candidate_pairs(&bvh).collect();
        for i in 0..bvh.num_primitives() {
            assert!(pairs.contains(&(i, i)), "missing ({i}, {i})");
        }
    }

    #[test]
    fn test_candidate_pairs_restartable() {
        let bvh = grid_bvh(2);
        let first: Vec<_> = bvh.candidate_pairs(&bvh).collect();
        let second: Vec<_> = bvh.candidate_pairs(&bvh).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_conforming_grid_has_no_self_intersections() {
        let bvh = grid_bvh(2);
        assert!(bvh.self_overlapping_primitives().is_empty());
    }

    #[test]
    fn test_primitives_in_box_and_sphere() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&two_disjoint_tets()).unwrap();
        let mut results = Vec::new();
        bvh.primitives_in_box(&Aabb::new(DVec3::splat(0.5), DVec3::splat(0.6)), &mut results);
        assert_eq!(results, vec![0]);

        results.clear();
        bvh.primitives_in_sphere(DVec3::splat(3.0), 10.0, &mut results);
        results.sort_unstable();
        assert_eq!(results, vec![0, 1]);

        results.clear();
        bvh.primitives_in_sphere(DVec3::splat(3.0), -1.0, &mut results);
        assert!(results.is_empty());
    }

    #[test]
    fn test_non_finite_range_queries_find_nothing() {
        let bvh = grid_bvh(2);
        let nan = DVec3::new(f64::NAN, 0.5, 0.5);
        let mut results = Vec::new();

        bvh.locate_point_all(nan, &mut results);
        bvh.locate_point_all(DVec3::splat(f64::INFINITY), &mut results);
        assert!(results.is_empty());

        // A NaN center has zero box distance, so it must not match everything.
        bvh.primitives_in_sphere(nan, 1.0, &mut results);
        bvh.primitives_in_sphere(DVec3::splat(f64::NEG_INFINITY), 1.0, &mut results);
        assert!(results.is_empty());

        bvh.primitives_in_box(&Aabb::new(nan, DVec3::splat(10.0)), &mut results);
        assert!(results.is_empty());

        let everything = Aabb::new(DVec3::splat(f64::NEG_INFINITY), DVec3::splat(f64::INFINITY));
        bvh.primitives_in_box(&everything, &mut results);
        assert_eq!(results.len(), bvh.num_primitives());
    }
}
