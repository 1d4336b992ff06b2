//! Refit a hierarchy through a deforming simulation and rebuild when it loosens.
use glam::DVec3;
use tetra_aabb::prelude::*;

fn main() -> Result<(), HierarchyError> {
    let mesh = TetMesh::cube_grid([8, 8, 8], 0.125)?;
    let config = HierarchyConfig::default()
        .with_looseness_sample_interval(10)
        .with_loosening_threshold(1.2);
    let mut bvh = TetrahedralAabbHierarchy::new(&mesh, config)?;

    for step in 1..=100 {
        // Shear that grows with time.
        let t = step as f64 * 0.02;
        let positions: Vec<DVec3> = mesh
            .positions()
            .iter()
            .map(|&p| p + DVec3::new(t * p.z * 2.0, 0.0, 0.1 * (p.x * 6.0 + t).sin()))
            .collect();
        let report = bvh.refit(&positions)?;
        if let Some(looseness) = report.looseness {
            println!("step {step:3}: looseness {looseness:.3}");
        }
        if report.rebuild_advised {
            bvh.rebuild()?;
            println!("step {step:3}: rebuilt");
        }
    }

    let top = bvh.locate_point(DVec3::new(2.1, 0.5, 0.99));
    println!("Top layer point -> {top:?}");
    Ok(())
}
