//! The hierarchy type: construction and accessors.
//!
//! Queries live in [`crate::queries`] and refit in [`crate::refit`]; all three
//! operate on the same arena through `impl` blocks on
//! [`TetrahedralAabbHierarchy`].

use glam::DVec3;
use rayon::prelude::*;
use tracing::debug;

use crate::aabb::Aabb;
use crate::bounds::{tetrahedron_bounds, tetrahedron_centroid};
use crate::builder;
use crate::config::HierarchyConfig;
use crate::error::{HierarchyError, Result};
use crate::mesh::{TetMesh, validate_connectivity, validate_positions};
use crate::node_store::NodeStore;

/// Bounding volume hierarchy over the tetrahedra of a mesh.
///
/// Owns its node arena, the leaf permutation, the mesh connectivity and a
/// copy of the vertex positions it was last built or refit with. Queries take
/// `&self` and can run concurrently; refit takes `&mut self`.
///
/// # Examples
/// ```
/// use glam::DVec3;
/// use tetra_aabb::prelude::*;
///
/// let mesh = TetMesh::new(
///     vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z],
///     vec![[0, 1, 2, 3]],
/// )?;
/// let bvh = TetrahedralAabbHierarchy::with_default_config(&mesh)?;
///
/// assert_eq!(bvh.locate_point(DVec3::splat(0.1))?, 0);
/// assert_eq!(bvh.locate_point(DVec3::splat(2.0)), Err(HierarchyError::NotFound));
/// # Ok::<(), HierarchyError>(())
/// ```
#[derive(Clone, Debug)]
pub struct TetrahedralAabbHierarchy {
    pub(crate) config: HierarchyConfig,
    pub(crate) tetrahedra: Vec<[usize; 4]>,
    pub(crate) positions: Vec<DVec3>,
    pub(crate) primitive_bounds: Vec<Aabb>,
    pub(crate) nodes: NodeStore,
    pub(crate) permutation: Vec<usize>,
    pub(crate) refit_count: usize,
}

impl TetrahedralAabbHierarchy {
    /// Builds a hierarchy over `mesh`.
    ///
    /// # Errors
    /// Returns [`HierarchyError::InvalidConfig`] for a rejected configuration
    /// and [`HierarchyError::InvalidGeometry`] for non-finite positions.
    pub fn new(mesh: &TetMesh, config: HierarchyConfig) -> Result<Self> {
        config.validate()?;
        validate_positions(mesh.positions())?;
        Ok(Self::build_unchecked(
            config,
            mesh.positions().to_vec(),
            mesh.tetrahedra().to_vec(),
        ))
    }

    /// Builds a hierarchy with [`HierarchyConfig::default`].
    ///
    /// # Errors
    /// See [`TetrahedralAabbHierarchy::new`].
    pub fn with_default_config(mesh: &TetMesh) -> Result<Self> {
        Self::new(mesh, HierarchyConfig::default())
    }

    /// Builds a hierarchy from raw position and connectivity buffers.
    ///
    /// # Errors
    /// Returns [`HierarchyError::InvalidGeometry`] for non-finite positions or
    /// malformed tetrahedra, and [`HierarchyError::InvalidConfig`] for a
    /// rejected configuration.
    pub fn from_parts(
        positions: &[DVec3],
        tetrahedra: &[[usize; 4]],
        config: HierarchyConfig,
    ) -> Result<Self> {
        config.validate()?;
        validate_positions(positions)?;
        validate_connectivity(tetrahedra, positions.len())?;
        Ok(Self::build_unchecked(
            config,
            positions.to_vec(),
            tetrahedra.to_vec(),
        ))
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(primitives = tetrahedra.len(), vertices = positions.len())
    )]
    pub(crate) fn build_unchecked(
        config: HierarchyConfig,
        positions: Vec<DVec3>,
        tetrahedra: Vec<[usize; 4]>,
    ) -> Self {
        let primitive_bounds =
            compute_primitive_bounds(&tetrahedra, &positions, config.parallel_threshold);
        let centroids: Vec<DVec3> = tetrahedra
            .iter()
            .map(|tet| tetrahedron_centroid(&tet.map(|v| positions[v])))
            .collect();
        let (nodes, permutation) = builder::build(
            &primitive_bounds,
            &centroids,
            config.leaf_capacity,
            config.parallel_threshold,
        );
        debug!(
            nodes = nodes.len(),
            depth = nodes.depth(),
            leaf_capacity = config.leaf_capacity,
            "built tetrahedral AABB hierarchy"
        );
        Self {
            config,
            tetrahedra,
            positions,
            primitive_bounds,
            nodes,
            permutation,
            refit_count: 0,
        }
    }

    /// Configuration the hierarchy was built with.
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Node arena; node 0 is the root.
    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    /// Leaf permutation: slot `k` of a leaf range holds primitive
    /// `permutation()[k]`.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Number of tetrahedra.
    pub fn num_primitives(&self) -> usize {
        self.tetrahedra.len()
    }

    /// Returns `true` when the hierarchy holds no tetrahedra.
    pub fn is_empty(&self) -> bool {
        self.tetrahedra.is_empty()
    }

    /// Root box, `None` when empty.
    pub fn bounds(&self) -> Option<Aabb> {
        self.nodes.as_slice().first().map(|n| n.aabb)
    }

    /// Current vertex positions.
    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    /// Tetrahedron connectivity.
    pub fn tetrahedra(&self) -> &[[usize; 4]] {
        &self.tetrahedra
    }

    /// Refits applied since the last build.
    pub fn refit_count(&self) -> usize {
        self.refit_count
    }

    /// Vertex indices of tetrahedron `i`.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown primitive.
    pub fn primitive(&self, i: usize) -> Result<[usize; 4]> {
        self.tetrahedra
            .get(i)
            .copied()
            .ok_or_else(|| self.primitive_out_of_range(i))
    }

    /// Current vertex positions of tetrahedron `i`.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown primitive.
    pub fn primitive_vertices(&self, i: usize) -> Result<[DVec3; 4]> {
        self.primitive(i).map(|tet| tet.map(|v| self.positions[v]))
    }

    /// Current box of tetrahedron `i`.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown primitive.
    pub fn primitive_bounds(&self, i: usize) -> Result<&Aabb> {
        self.primitive_bounds
            .get(i)
            .ok_or_else(|| self.primitive_out_of_range(i))
    }

    #[inline]
    fn primitive_out_of_range(&self, index: usize) -> HierarchyError {
        HierarchyError::IndexOutOfRange {
            index,
            len: self.tetrahedra.len(),
        }
    }

    /// Vertex positions of primitive `i`; `i` must be in range.
    #[inline]
    pub(crate) fn tet_vertices(&self, i: usize) -> [DVec3; 4] {
        self.tetrahedra[i].map(|v| self.positions[v])
    }
}

/// Boxes of every tetrahedron, computed in parallel for large meshes.
pub(crate) fn compute_primitive_bounds(
    tetrahedra: &[[usize; 4]],
    positions: &[DVec3],
    parallel_threshold: usize,
) -> Vec<Aabb> {
    let bounds_of = |tet: &[usize; 4]| tetrahedron_bounds(&tet.map(|v| positions[v]));
    if tetrahedra.len() >= parallel_threshold {
        tetrahedra.par_iter().map(bounds_of).collect()
    } else {
        tetrahedra.iter().map(bounds_of).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_mesh() -> TetMesh {
        TetMesh::new(vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z], vec![[0, 1, 2, 3]])
            .unwrap()
    }

    #[test]
    fn test_single_tetrahedron_root_leaf() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&unit_mesh()).unwrap();
        assert_eq!(bvh.nodes().len(), 1);
        assert_eq!(bvh.nodes().is_leaf(0), Ok(true));
        let root = bvh.bounds().unwrap();
        assert_eq!(root.min, DVec3::ZERO);
        assert_eq!(root.max, DVec3::ONE);
    }

    #[test]
    fn test_from_parts_validates() {
        let positions = [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::new(0.0, 0.0, f64::INFINITY)];
        let err = TetrahedralAabbHierarchy::from_parts(
            &positions,
            &[[0, 1, 2, 3]],
            HierarchyConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HierarchyError::InvalidGeometry(_)));

        let err = TetrahedralAabbHierarchy::from_parts(
            &positions[..3],
            &[[0, 1, 2, 3]],
            HierarchyConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HierarchyError::InvalidGeometry(_)));
    }

    #[test]
    fn test_rejects_bad_config() {
        let err = TetrahedralAabbHierarchy::new(
            &unit_mesh(),
            HierarchyConfig::default().with_leaf_capacity(0),
        )
        .unwrap_err();
        assert!(matches!(err, HierarchyError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = TetMesh::new(Vec::new(), Vec::new()).unwrap();
        let bvh = TetrahedralAabbHierarchy::with_default_config(&mesh).unwrap();
        assert!(bvh.is_empty());
        assert!(bvh.nodes().is_empty());
        assert_eq!(bvh.bounds(), None);
    }

    #[test]
    fn test_primitive_accessors() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&unit_mesh()).unwrap();
        assert_eq!(bvh.primitive(0), Ok([0, 1, 2, 3]));
        assert_eq!(bvh.primitive_vertices(0).unwrap()[1], DVec3::X);
        assert_eq!(
            bvh.primitive_bounds(1),
            Err(HierarchyError::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_hierarchy_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TetrahedralAabbHierarchy>();
    }
}
