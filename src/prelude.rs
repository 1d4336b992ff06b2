//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types from the crate.
//! Users can import everything they need with:
//!
//! ```
//! use tetra_aabb::prelude::*;
//! ```

pub use crate::{
    Aabb, HierarchyConfig, HierarchyError, Nearest, RefitReport, TetMesh,
    TetrahedralAabbHierarchy,
};
