//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::subclone::NodeId;

/// Domain errors represent violated tree invariants and rejected data.
/// These are independent of I/O and configuration concerns.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    // Structural: malformed or dangling persisted input
    #[error("parent {parent} of node {node} not found before it")]
    ParentNotFound { node: NodeId, parent: NodeId },

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    #[error("second root record: {0}")]
    MultipleRoots(NodeId),

    #[error("record sequence has no root")]
    MissingRoot,

    #[error("node id {0} is out of the persistable range")]
    NodeIdOutOfRange(NodeId),

    #[error("invalid cellular fraction {fraction} on node {node}")]
    InvalidFraction { node: NodeId, fraction: f64 },

    #[error("cluster {0} already known with different events")]
    ClusterContentMismatch(String),

    #[error("invalid genomic extent {extent}: {reason}")]
    InvalidExtent { extent: String, reason: String },

    // Tree manipulation
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("tree already has a root")]
    RootExists,

    #[error("fraction {fraction} of node {node} exceeds parent fraction {parent_fraction}")]
    FractionExceedsParent {
        node: NodeId,
        fraction: f64,
        parent_fraction: f64,
    },

    // Merge
    #[error("merge conflict on cluster {cluster} (secondary node {secondary}): {reason}")]
    MergeConflict {
        cluster: String,
        secondary: NodeId,
        reason: String,
    },

    // Coexistence table
    #[error("cluster pair ({0}, {1}) already observed in this case")]
    ClusterPairAlreadyObserved(String, String),

    #[error("cluster pair ({0}, {1}) observed with a contradicting verdict")]
    ContradictoryObservation(String, String),

    #[error("cluster not registered: {0}")]
    ClusterNotFound(String),
}

impl DomainError {
    /// Whether this error describes malformed persisted input.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DomainError::ParentNotFound { .. }
                | DomainError::DuplicateNodeId(_)
                | DomainError::MultipleRoots(_)
                | DomainError::MissingRoot
                | DomainError::NodeIdOutOfRange(_)
                | DomainError::InvalidFraction { .. }
                | DomainError::ClusterContentMismatch(_)
                | DomainError::InvalidExtent { .. }
        )
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
