//! Refit: updating boxes after the mesh deforms.
//!
//! Refit keeps the topology and permutation of the last build and only
//! recomputes boxes bottom-up. Over many deformations the tree can drift far
//! from what a fresh build would produce; looseness sampling reports when a
//! rebuild would pay off.

use glam::DVec3;
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::aabb::Aabb;
use crate::bounds::{swept_tetrahedron_bounds, tetrahedron_centroid};
use crate::builder;
use crate::error::{HierarchyError, Result};
use crate::hierarchy::{TetrahedralAabbHierarchy, compute_primitive_bounds};
use crate::mesh::validate_positions;
use crate::node_store::NodeKind;

/// Outcome of a refit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefitReport {
    /// Refits applied since the last build, this one included.
    pub refit_count: usize,
    /// Looseness sampled on this refit, if sampling was due.
    pub looseness: Option<f64>,
    /// Whether the sampled looseness exceeded the configured threshold.
    pub rebuild_advised: bool,
}

impl TetrahedralAabbHierarchy {
    /// Updates every box for new vertex positions.
    ///
    /// `positions` must hold one finite position per vertex of the mesh the
    /// hierarchy was built over. Refitting twice with the same positions gives
    /// the same boxes.
    ///
    /// # Errors
    /// Returns [`HierarchyError::InvalidGeometry`] on a length mismatch or a
    /// non-finite coordinate; the hierarchy is left untouched.
    ///
    /// # Examples
    /// ```
    /// use glam::DVec3;
    /// use tetra_aabb::prelude::*;
    ///
    /// let mesh = TetMesh::cube_grid([2, 2, 2], 1.0)?;
    /// let mut bvh = TetrahedralAabbHierarchy::with_default_config(&mesh)?;
    /// let moved: Vec<DVec3> = mesh.positions().iter().map(|p| *p + DVec3::X * 10.0).collect();
    ///
    /// let report = bvh.refit(&moved)?;
    /// assert_eq!(report.refit_count, 1);
    /// assert_eq!(bvh.bounds().unwrap().min.x, 10.0);
    /// # Ok::<(), HierarchyError>(())
    /// ```
    #[tracing::instrument(level = "debug", skip_all, fields(vertices = positions.len()))]
    pub fn refit(&mut self, positions: &[DVec3]) -> Result<RefitReport> {
        self.check_refit_positions(positions)?;
        self.positions.copy_from_slice(positions);
        self.primitive_bounds =
            compute_primitive_bounds(&self.tetrahedra, &self.positions, self.config.parallel_threshold);
        self.refit_nodes();
        Ok(self.finish_refit(true))
    }

    /// Refits to boxes that enclose each tetrahedron over the whole motion
    /// from `start` to `end`. Stored positions become `end`.
    ///
    /// Used for continuous collision checks where contacts can occur anywhere
    /// along a time step.
    ///
    /// The refit is counted, but looseness is never sampled here: swept boxes
    /// are larger than static ones by the motion itself, so the reported
    /// `looseness` is `None` and no rebuild is advised.
    ///
    /// # Errors
    /// As [`TetrahedralAabbHierarchy::refit`], for either configuration.
    #[tracing::instrument(level = "debug", skip_all, fields(vertices = end.len()))]
    pub fn refit_swept(&mut self, start: &[DVec3], end: &[DVec3]) -> Result<RefitReport> {
        self.check_refit_positions(start)?;
        self.check_refit_positions(end)?;
        let swept = |tet: &[usize; 4]| {
            swept_tetrahedron_bounds(&tet.map(|v| start[v]), &tet.map(|v| end[v]))
        };
        self.primitive_bounds = if self.tetrahedra.len() >= self.config.parallel_threshold {
            self.tetrahedra.par_iter().map(swept).collect()
        } else {
            self.tetrahedra.iter().map(swept).collect()
        };
        self.positions.copy_from_slice(end);
        self.refit_nodes();
        Ok(self.finish_refit(false))
    }

    /// Ratio of the summed node volume of this tree to that of a fresh build
    /// over the current positions.
    ///
    /// 1.0 right after a build. Returns 1.0 when both sums are zero and
    /// infinity when only the fresh sum is. The fresh build uses static boxes,
    /// so after [`TetrahedralAabbHierarchy::refit_swept`] the ratio also
    /// counts the swept motion.
    pub fn looseness(&self) -> f64 {
        let current = self.nodes.total_volume();
        let fresh_bounds = compute_primitive_bounds(
            &self.tetrahedra,
            &self.positions,
            self.config.parallel_threshold,
        );
        let centroids: Vec<DVec3> = self
            .tetrahedra
            .iter()
            .map(|tet| tetrahedron_centroid(&self.tet_vertices_of(tet)))
            .collect();
        let (fresh, _) = builder::build(
            &fresh_bounds,
            &centroids,
            self.config.leaf_capacity,
            self.config.parallel_threshold,
        );
        let fresh = fresh.total_volume();
        if fresh == 0.0 {
            if current == 0.0 { 1.0 } else { f64::INFINITY }
        } else {
            current / fresh
        }
    }

    /// Rebuilds from the current positions with the same configuration and
    /// resets the refit counter.
    ///
    /// Boxes are static boxes of the current positions. After a swept refit
    /// that means the `end` configuration; the swept boxes are dropped.
    ///
    /// # Errors
    /// Returns [`HierarchyError::InvalidConfig`] if the stored configuration
    /// no longer validates.
    pub fn rebuild(&mut self) -> Result<()> {
        self.config.validate()?;
        debug!(refit_count = self.refit_count, "rebuilding after refits");
        let positions = core::mem::take(&mut self.positions);
        let tetrahedra = core::mem::take(&mut self.tetrahedra);
        *self = Self::build_unchecked(self.config, positions, tetrahedra);
        Ok(())
    }

    fn check_refit_positions(&self, positions: &[DVec3]) -> Result<()> {
        if positions.len() != self.positions.len() {
            return Err(HierarchyError::InvalidGeometry(format!(
                "refit got {} positions, mesh has {} vertices",
                positions.len(),
                self.positions.len()
            )));
        }
        validate_positions(positions)
    }

    /// Leaf boxes from member boxes, then internal boxes from children.
    /// Children follow parents in the arena, so one reverse sweep suffices.
    fn refit_nodes(&mut self) {
        let permutation = &self.permutation;
        let primitive_bounds = &self.primitive_bounds;
        let nodes = self.nodes.nodes_mut();
        for i in (0..nodes.len()).rev() {
            nodes[i].aabb = match nodes[i].kind {
                NodeKind::Leaf { offset, count } => permutation[offset..offset + count]
                    .iter()
                    .fold(Aabb::empty(), |acc, &p| acc.union(&primitive_bounds[p])),
                NodeKind::Internal { children: [left, right] } => {
                    nodes[left].aabb.union(&nodes[right].aabb)
                }
            };
        }
    }

    fn finish_refit(&mut self, sample: bool) -> RefitReport {
        self.refit_count += 1;
        let interval = self.config.looseness_sample_interval;
        let due = sample && interval > 0 && self.refit_count.is_multiple_of(interval);
        let looseness = due.then(|| self.looseness());
        let rebuild_advised = looseness.is_some_and(|l| l > self.config.loosening_threshold);
        if rebuild_advised {
            warn!(
                refit_count = self.refit_count,
                looseness = looseness.unwrap_or_default(),
                threshold = self.config.loosening_threshold,
                "hierarchy has loosened, rebuild advised"
            );
        } else if let Some(looseness) = looseness {
            debug!(refit_count = self.refit_count, looseness, "sampled looseness");
        }
        trace!(refit_count = self.refit_count, "refit complete");
        RefitReport {
            refit_count: self.refit_count,
            looseness,
            rebuild_advised,
        }
    }

    #[inline]
    fn tet_vertices_of(&self, tet: &[usize; 4]) -> [DVec3; 4] {
        tet.map(|v| self.positions[v])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierarchyConfig;
    use crate::mesh::TetMesh;

    /// Eight unit tetrahedra spaced along x, one per leaf.
    fn row_of_tets(slots: [usize; 8]) -> Vec<DVec3> {
        let corners = [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        slots
            .iter()
            .flat_map(|&s| corners.map(|c| c + DVec3::X * (2.0 * s as f64)))
            .collect()
    }

    fn row_mesh() -> TetMesh {
        let tets = (0..8).map(|k| [4 * k, 4 * k + 1, 4 * k + 2, 4 * k + 3]).collect();
        TetMesh::new(row_of_tets([0, 1, 2, 3, 4, 5, 6, 7]), tets).unwrap()
    }

    #[test]
    fn test_refit_translation_moves_every_box() {
        let mesh = TetMesh::cube_grid([3, 2, 2], 1.0).unwrap();
        let mut bvh = TetrahedralAabbHierarchy::new(&mesh, HierarchyConfig::default().with_leaf_capacity(2))
            .unwrap();
        let before = bvh.nodes().clone();
        let offset = DVec3::new(1.5, -2.0, 0.25);
        let moved: Vec<DVec3> = mesh.positions().iter().map(|&p| p + offset).collect();
        bvh.refit(&moved).unwrap();

        for (old, new) in before.as_slice().iter().zip(bvh.nodes().as_slice()) {
            assert_eq!(old.kind, new.kind);
            let expected = old.aabb.translated(offset);
            assert!((expected.min - new.aabb.min).abs().max_element() < 1e-12);
            assert!((expected.max - new.aabb.max).abs().max_element() < 1e-12);
        }
    }

    #[test]
    fn test_refit_is_idempotent() {
        let mesh = TetMesh::cube_grid([2, 2, 2], 1.0).unwrap();
        let mut bvh = TetrahedralAabbHierarchy::with_default_config(&mesh).unwrap();
        let moved: Vec<DVec3> = mesh.positions().iter().map(|&p| p * 1.5).collect();
        bvh.refit(&moved).unwrap();
        let once = bvh.nodes().clone();
        bvh.refit(&moved).unwrap();
        assert_eq!(&once, bvh.nodes());
        assert_eq!(bvh.refit_count(), 2);
    }

    #[test]
    fn test_failed_refit_leaves_state_unchanged() {
        let mesh = TetMesh::cube_grid([2, 1, 1], 1.0).unwrap();
        let mut bvh = TetrahedralAabbHierarchy::with_default_config(&mesh).unwrap();
        let nodes = bvh.nodes().clone();

        let short = &mesh.positions()[1..];
        assert!(matches!(bvh.refit(short), Err(HierarchyError::InvalidGeometry(_))));

        let mut bad = mesh.positions().to_vec();
        bad[0].y = f64::NAN;
        assert!(matches!(bvh.refit(&bad), Err(HierarchyError::InvalidGeometry(_))));

        assert_eq!(&nodes, bvh.nodes());
        assert_eq!(bvh.positions(), mesh.positions());
        assert_eq!(bvh.refit_count(), 0);
    }

    #[test]
    fn test_refit_swept_encloses_both_configurations() {
        let mesh = TetMesh::cube_grid([1, 1, 1], 1.0).unwrap();
        let mut bvh = TetrahedralAabbHierarchy::with_default_config(&mesh).unwrap();
        let end: Vec<DVec3> = mesh.positions().iter().map(|&p| p + DVec3::Z * 3.0).collect();
        bvh.refit_swept(mesh.positions(), &end).unwrap();

        let root = bvh.bounds().unwrap();
        assert_eq!(root.min, DVec3::ZERO);
        assert_eq!(root.max, DVec3::new(1.0, 1.0, 4.0));
        assert_eq!(bvh.positions(), end.as_slice());
        // Locating uses the end configuration.
        assert!(bvh.locate_point(DVec3::new(0.5, 0.5, 3.5)).is_ok());
        assert!(bvh.locate_point(DVec3::new(0.5, 0.5, 0.5)).is_err());
    }

    #[test]
    fn test_swept_refit_skips_looseness_sampling() {
        let mesh = TetMesh::cube_grid([2, 2, 2], 1.0).unwrap();
        let config = HierarchyConfig::default()
            .with_looseness_sample_interval(1)
            .with_loosening_threshold(1.1);
        let mut bvh = TetrahedralAabbHierarchy::new(&mesh, config).unwrap();
        let shifted: Vec<DVec3> = mesh.positions().iter().map(|&p| p + DVec3::X * 0.5).collect();

        let report = bvh.refit_swept(mesh.positions(), &shifted).unwrap();
        assert_eq!(report.refit_count, 1);
        assert_eq!(report.looseness, None);
        assert!(!report.rebuild_advised);

        // A rigid shift with static boxes is as tight as a fresh build.
        let report = bvh.refit(&shifted).unwrap();
        assert_eq!(report.refit_count, 2);
        assert!(report.looseness.is_some_and(|l| (l - 1.0).abs() < 1e-12));
        assert!(!report.rebuild_advised);
    }

    #[test]
    fn test_rebuild_after_swept_refit_uses_end_positions() {
        let mesh = TetMesh::cube_grid([1, 1, 1], 1.0).unwrap();
        let mut bvh = TetrahedralAabbHierarchy::with_default_config(&mesh).unwrap();
        let end: Vec<DVec3> = mesh.positions().iter().map(|&p| p + DVec3::Y * 2.0).collect();
        bvh.refit_swept(mesh.positions(), &end).unwrap();
        bvh.rebuild().unwrap();

        let root = bvh.bounds().unwrap();
        assert_eq!(root.min, DVec3::new(0.0, 2.0, 0.0));
        assert_eq!(root.max, DVec3::new(1.0, 3.0, 1.0));
    }

    #[test]
    fn test_looseness_after_build_is_one() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&TetMesh::cube_grid([3, 3, 1], 1.0).unwrap())
            .unwrap();
        assert_eq!(bvh.looseness(), 1.0);
    }

    #[test]
    fn test_looseness_of_empty_hierarchy() {
        let bvh = TetrahedralAabbHierarchy::with_default_config(&TetMesh::new(Vec::new(), Vec::new()).unwrap())
            .unwrap();
        assert_eq!(bvh.looseness(), 1.0);
    }

    #[test]
    fn test_scrambled_refit_advises_rebuild() {
        let config = HierarchyConfig::default()
            .with_leaf_capacity(1)
            .with_loosening_threshold(1.5)
            .with_looseness_sample_interval(1);
        let mut bvh = TetrahedralAabbHierarchy::new(&row_mesh(), config).unwrap();

        let report = bvh.refit(&row_of_tets([0, 1, 2, 3, 4, 5, 6, 7])).unwrap();
        assert_eq!(report.looseness, Some(1.0));
        assert!(!report.rebuild_advised);

        // Former siblings end up far apart: 81 / 49 in summed volume.
        let report = bvh.refit(&row_of_tets([0, 4, 1, 5, 2, 6, 3, 7])).unwrap();
        let looseness = report.looseness.unwrap();
        assert!((looseness - 81.0 / 49.0).abs() < 1e-9, "looseness {looseness}");
        assert!(report.rebuild_advised);

        bvh.rebuild().unwrap();
        assert_eq!(bvh.refit_count(), 0);
        assert_eq!(bvh.looseness(), 1.0);
    }

    #[test]
    fn test_sampling_interval() {
        let config = HierarchyConfig::default().with_looseness_sample_interval(3);
        let mesh = TetMesh::cube_grid([1, 1, 1], 1.0).unwrap();
        let mut bvh = TetrahedralAabbHierarchy::new(&mesh, config).unwrap();
        let sampled: Vec<bool> = (0..6)
            .map(|_| bvh.refit(mesh.positions()).unwrap().looseness.is_some())
            .collect();
        assert_eq!(sampled, vec![false, false, true, false, false, true]);
    }
}
