//! Find intersecting tetrahedra between two meshes.
use glam::DVec3;
use tetra_aabb::prelude::*;

fn main() -> Result<(), HierarchyError> {
    let a = TetMesh::cube_grid([2, 2, 2], 1.0)?;
    let moved: Vec<DVec3> = a
        .positions()
        .iter()
        .map(|&p| p + DVec3::new(1.6, 0.3, 0.3))
        .collect();
    let b = TetMesh::new(moved, a.tetrahedra().to_vec())?;

    let ha = TetrahedralAabbHierarchy::with_default_config(&a)?;
    let hb = TetrahedralAabbHierarchy::with_default_config(&b)?;

    let candidates = ha.candidate_pairs(&hb).count();
    let exact = ha.overlapping_primitives(&hb);
    println!("{candidates} box candidates, {} intersecting pairs", exact.len());
    for (i, j) in exact.iter().take(5) {
        println!("  a[{i}] x b[{j}]");
    }
    Ok(())
}
