//! Find the tetrahedron that contains a point.
use glam::DVec3;
use tetra_aabb::prelude::*;

fn main() -> Result<(), HierarchyError> {
    let mesh = TetMesh::cube_grid([2, 2, 2], 1.0)?;
    let bvh = TetrahedralAabbHierarchy::with_default_config(&mesh)?;

    let p = DVec3::new(1.5, 0.25, 0.75);
    let t = bvh.locate_point(p)?;
    println!("Point {p} lies in tetrahedron {t}: {:?}", bvh.primitive(t)?);

    let mut all = Vec::new();
    bvh.locate_point_all(DVec3::ONE, &mut all);
    println!("Grid vertex (1, 1, 1) is shared by {} tetrahedra", all.len());

    match bvh.locate_point(DVec3::splat(5.0)) {
        Err(HierarchyError::NotFound) => println!("Point (5, 5, 5) is outside the mesh"),
        other => println!("Unexpected: {other:?}"),
    }
    Ok(())
}
