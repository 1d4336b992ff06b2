//! # tetra_aabb - Bounding Volume Hierarchy for Tetrahedral Meshes
//!
//! A Rust library providing an axis-aligned bounding box hierarchy over the
//! tetrahedra of a volumetric mesh, for the spatial queries a deformable-body
//! simulation runs every step.
//!
//! ## Features
//!
//! - **Median-Split Build**: Longest-axis median partitioning, parallel over subtrees with rayon
//! - **Overlap Queries**: Lazy candidate pairs between two hierarchies, narrowed by an exact tetrahedron test
//! - **Point Location**: Which tetrahedron contains a point, singly or in parallel batches
//! - **Nearest Primitive**: Branch-and-bound closest tetrahedron to a point
//! - **Refit**: Cheap bottom-up box updates after deformation, with looseness tracking
//!
//! ## Quick Start
//!
//! ```rust
//! use glam::DVec3;
//! use tetra_aabb::prelude::*;
//!
//! // Two cubes of six tetrahedra each
//! let mesh = TetMesh::cube_grid([2, 1, 1], 1.0)?;
//!
//! // Build the hierarchy (immutable for queries, mutable for refit)
//! let mut bvh = TetrahedralAabbHierarchy::with_default_config(&mesh)?;
//!
//! // Which tetrahedron holds this point?
//! let t = bvh.locate_point(DVec3::new(1.5, 0.2, 0.7))?;
//! assert!(bvh.primitive_vertices(t)?.iter().all(|v| v.x >= 1.0));
//!
//! // Closest tetrahedron to an outside point
//! let nearest = bvh.nearest_primitive(DVec3::new(-1.0, 0.5, 0.5))?;
//! assert!((nearest.distance - 1.0).abs() < 1e-12);
//!
//! // Deform and refit, then query again
//! let moved: Vec<DVec3> = mesh.positions().iter().map(|p| *p * 2.0).collect();
//! bvh.refit(&moved)?;
//! assert_eq!(bvh.bounds().unwrap().max, DVec3::new(4.0, 2.0, 2.0));
//! # Ok::<(), HierarchyError>(())
//! ```
//!
//! ## How It Works
//!
//! Nodes live in one flat arena in pre-order, so every child index is greater
//! than its parent's. Leaves reference a contiguous range of a permutation
//! array instead of storing primitive indices themselves. Refit therefore
//! needs a single reverse sweep over the arena, and queries descend with an
//! explicit stack rather than recursion.

pub mod aabb;
pub mod bounds;
mod builder;
pub mod config;
pub mod error;
pub mod geometry;
pub mod hierarchy;
pub mod mesh;
pub mod node_store;
pub mod prelude;
pub mod queries;
pub mod refit;


pub use aabb::Aabb;
pub use config::HierarchyConfig;
pub use error::{HierarchyError, Result};
pub use hierarchy::TetrahedralAabbHierarchy;
pub use mesh::TetMesh;
pub use node_store::{Node, NodeKind, NodeStore};
pub use queries::{CandidatePairs, Nearest};
pub use refit::RefitReport;
