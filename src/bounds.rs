//! Per-primitive bounding boxes.
//!
//! Inputs are trusted to be finite; validation happens when a mesh or a new
//! position buffer enters the hierarchy.

use glam::DVec3;

use crate::aabb::Aabb;

/// Tight box around a tetrahedron's four vertices.
#[inline]
pub fn tetrahedron_bounds(tet: &[DVec3; 4]) -> Aabb {
    Aabb::new(
        tet[0].min(tet[1]).min(tet[2]).min(tet[3]),
        tet[0].max(tet[1]).max(tet[2]).max(tet[3]),
    )
}

/// Box enclosing a tetrahedron at both ends of a time step.
///
/// Vertices move linearly between `start` and `end`, so the union of the two
/// end-configuration boxes bounds every intermediate configuration.
#[inline]
pub fn swept_tetrahedron_bounds(start: &[DVec3; 4], end: &[DVec3; 4]) -> Aabb {
    tetrahedron_bounds(start).union(&tetrahedron_bounds(end))
}

/// Vertex average of a tetrahedron.
#[inline]
pub fn tetrahedron_centroid(tet: &[DVec3; 4]) -> DVec3 {
    (tet[0] + tet[1] + tet[2] + tet[3]) * 0.25
}
