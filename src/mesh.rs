//! Tetrahedral mesh snapshot handed to the hierarchy.

use glam::DVec3;

use crate::error::{HierarchyError, Result};

/// Vertex positions plus tetrahedron connectivity.
///
/// Constructed through [`TetMesh::new`], which rejects non-finite
/// coordinates, out-of-range vertex indices and tetrahedra that repeat a
/// vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct TetMesh {
    positions: Vec<DVec3>,
    tetrahedra: Vec<[usize; 4]>,
}

impl TetMesh {
    /// Creates a validated mesh.
    ///
    /// # Errors
    /// Returns [`HierarchyError::InvalidGeometry`] if any coordinate is not
    /// finite or any tetrahedron is malformed.
    pub fn new(positions: Vec<DVec3>, tetrahedra: Vec<[usize; 4]>) -> Result<Self> {
        validate_positions(&positions)?;
        validate_connectivity(&tetrahedra, positions.len())?;
        Ok(Self {
            positions,
            tetrahedra,
        })
    }

    /// Creates a mesh from flat `xyz` coordinates and flat 4-index tetrahedra.
    ///
    /// # Errors
    /// Returns [`HierarchyError::InvalidGeometry`] if either slice length is
    /// not a multiple of its stride, or on any error of [`TetMesh::new`].
    pub fn from_flat(coords: &[f64], indices: &[usize]) -> Result<Self> {
        if !coords.len().is_multiple_of(3) {
            return Err(HierarchyError::InvalidGeometry(format!(
                "coordinate count {} is not a multiple of 3",
                coords.len()
            )));
        }
        if !indices.len().is_multiple_of(4) {
            return Err(HierarchyError::InvalidGeometry(format!(
                "index count {} is not a multiple of 4",
                indices.len()
            )));
        }
        let positions = coords
            .chunks_exact(3)
            .map(|c| DVec3::new(c[0], c[1], c[2]))
            .collect();
        let tetrahedra = indices
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Self::new(positions, tetrahedra)
    }

    /// Regular grid of `cells[0] x cells[1] x cells[2]` cubes of side
    /// `cell_size`, each split into six tetrahedra around its main diagonal.
    ///
    /// The tetrahedra tile the grid without overlap.
    ///
    /// # Errors
    /// Returns [`HierarchyError::InvalidGeometry`] if `cell_size` is not
    /// finite or the grid extent overflows to a non-finite coordinate.
    pub fn cube_grid(cells: [usize; 3], cell_size: f64) -> Result<Self> {
        if !cell_size.is_finite() {
            return Err(HierarchyError::InvalidGeometry(format!(
                "cell size {cell_size} is not finite"
            )));
        }
        let [nx, ny, nz] = cells;
        let (vx, vy) = (nx + 1, ny + 1);
        let vertex = |i: usize, j: usize, k: usize| i + vx * (j + vy * k);

        let mut positions = Vec::with_capacity(vx * vy * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    positions.push(DVec3::new(i as f64, j as f64, k as f64) * cell_size);
                }
            }
        }
        validate_positions(&positions)?;

        // Monotone corner paths 000 -> 111, one per axis permutation.
        const PATHS: [[usize; 4]; 6] = [
            [0b000, 0b001, 0b011, 0b111],
            [0b000, 0b001, 0b101, 0b111],
            [0b000, 0b010, 0b011, 0b111],
            [0b000, 0b010, 0b110, 0b111],
            [0b000, 0b100, 0b101, 0b111],
            [0b000, 0b100, 0b110, 0b111],
        ];
        let mut tetrahedra = Vec::with_capacity(6 * nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let corner = |bits: usize| {
                        vertex(i + (bits & 1), j + ((bits >> 1) & 1), k + ((bits >> 2) & 1))
                    };
                    for path in PATHS {
                        tetrahedra.push(path.map(corner));
                    }
                }
            }
        }

        Ok(Self {
            positions,
            tetrahedra,
        })
    }

    /// Vertex positions.
    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    /// Tetrahedron connectivity.
    pub fn tetrahedra(&self) -> &[[usize; 4]] {
        &self.tetrahedra
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Number of tetrahedra.
    pub fn num_tetrahedra(&self) -> usize {
        self.tetrahedra.len()
    }

    /// Vertex positions of tetrahedron `i`.
    ///
    /// # Errors
    /// Returns [`HierarchyError::IndexOutOfRange`] for an unknown tetrahedron.
    pub fn tetrahedron(&self, i: usize) -> Result<[DVec3; 4]> {
        let tet = self.tetrahedra.get(i).ok_or(HierarchyError::IndexOutOfRange {
            index: i,
            len: self.tetrahedra.len(),
        })?;
        Ok(tet.map(|v| self.positions[v]))
    }
}

/// Rejects non-finite coordinates.
pub(crate) fn validate_positions(positions: &[DVec3]) -> Result<()> {
    match positions.iter().position(|p| !p.is_finite()) {
        Some(v) => Err(HierarchyError::InvalidGeometry(format!(
            "vertex {v} has a non-finite coordinate"
        ))),
        None => Ok(()),
    }
}

/// Rejects out-of-range and repeated vertex indices.
pub(crate) fn validate_connectivity(tetrahedra: &[[usize; 4]], num_vertices: usize) -> Result<()> {
    for (t, tet) in tetrahedra.iter().enumerate() {
        if let Some(&v) = tet.iter().find(|&&v| v >= num_vertices) {
            return Err(HierarchyError::InvalidGeometry(format!(
                "tetrahedron {t} references vertex {v}, mesh has {num_vertices} vertices"
            )));
        }
        for a in 0..4 {
            for b in a + 1..4 {
                if tet[a] == tet[b] {
                    return Err(HierarchyError::InvalidGeometry(format!(
                        "tetrahedron {t} repeats vertex {}",
                        tet[a]
                    )));
                }
            }
        }
    }
    Ok(())
}
