use crate::CellId;

/// Failures of the replicated-cell contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplicationError {
    /// A node without write permission tried to assign a value.
    #[error("cell {cell:?} is read-only on this node")]
    NotAuthority { cell: CellId },

    #[error("update for {got:?} applied to cell {expected:?}")]
    CellMismatch { expected: CellId, got: CellId },

    #[error("value does not match the type of cell {cell:?}")]
    TypeMismatch { cell: CellId },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct ParseCategoryError(pub String);
