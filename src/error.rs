//! Error types for hierarchy construction, refit and queries.

use thiserror::Error;

/// Errors reported by [`TetrahedralAabbHierarchy`](crate::TetrahedralAabbHierarchy).
///
/// `NotFound` and `EmptyHierarchy` are ordinary query outcomes rather than
/// failures: the hierarchy is unchanged and the query can be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HierarchyError {
    /// Mesh input is non-finite or structurally malformed.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A configuration value is outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The hierarchy holds no primitives.
    #[error("query on an empty hierarchy")]
    EmptyHierarchy,

    /// No tetrahedron contains the query point.
    #[error("no tetrahedron contains the query point")]
    NotFound,

    /// A node or primitive index passed to an accessor is out of range.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of addressable items.
        len: usize,
    },
}

/// Result type alias for hierarchy operations.
pub type Result<T> = core::result::Result<T, HierarchyError>;
