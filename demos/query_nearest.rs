//! Find the nearest tetrahedron to a point.
use glam::DVec3;
use tetra_aabb::prelude::*;

fn main() -> Result<(), HierarchyError> {
    let mesh = TetMesh::cube_grid([3, 1, 1], 1.0)?;
    let bvh = TetrahedralAabbHierarchy::with_default_config(&mesh)?;

    let nearest = bvh.nearest_primitive(DVec3::new(2.5, 3.0, 0.5))?;
    println!(
        "Nearest tetrahedron: {} at distance {:.3}",
        nearest.primitive, nearest.distance
    );

    let batch = [DVec3::splat(-1.0), DVec3::new(1.5, 0.5, 0.5), DVec3::new(4.0, 0.5, 0.5)];
    for (p, n) in batch.iter().zip(bvh.nearest_primitives(&batch)?) {
        println!("  {p} -> tetrahedron {} ({:.3})", n.primitive, n.distance);
    }
    Ok(())
}
