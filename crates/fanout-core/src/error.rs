//! Error types for fanout-core.

use std::time::Duration;

use thiserror::Error;

use crate::GlobalId;

/// Errors raised by the topology store, the feature store and the samplers
/// built on top of them.
#[derive(Error, Debug)]
pub enum Error {
    /// A node ID lies outside the declared range of a topology.
    #[error("Unknown node ID {id} for {context} (declared range 0..{num_nodes})")]
    UnknownNodeId {
        /// Edge type or node type the lookup was made against.
        context: String,
        /// Offending ID.
        id: GlobalId,
        /// Declared number of nodes.
        num_nodes: usize,
    },

    /// An ID has no row in a feature table or label table.
    #[error("Unknown entity {id} in {entity}")]
    UnknownEntity {
        /// Node or edge type of the table.
        entity: String,
        /// Offending ID.
        id: GlobalId,
    },

    /// Node type not registered in the graph or feature store.
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Edge type not registered in the graph or feature store.
    #[error("Unknown edge type: {0}")]
    UnknownEdgeType(String),

    /// A cold-partition fetch did not finish before the request deadline.
    #[error("Feature lookup for {entity} timed out after {timeout:?}")]
    FeatureLookupTimeout {
        /// Node or edge type being resolved.
        entity: String,
        /// Deadline that expired.
        timeout: Duration,
    },

    /// Malformed sampler or store configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed sampling request.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// CSR arrays that violate the row pointer invariants.
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Feature width disagreement between backings.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected width.
        expected: usize,
        /// Observed width.
        actual: usize,
    },

    /// The same GlobalID was registered twice in an `id2idx` mapping.
    #[error("Duplicate ID in id2idx mapping: {0}")]
    DuplicateId(GlobalId),

    /// The calling device belongs to no device group holding a hot replica.
    #[error("No hot replica for device {0}")]
    NoReplica(usize),

    /// A sampling worker panicked or was cancelled.
    #[error("Sampling worker failed: {0}")]
    Worker(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for fanout operations.
pub type Result<T> = std::result::Result<T, Error>;
