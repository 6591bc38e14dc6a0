//! Error types for substrate operations

use std::fmt;

/// Result type for substrate operations
pub type Result<T> = std::result::Result<T, LatticeError>;

/// Errors returned by the substrate.
///
/// Lock-free read tearing is deliberately absent: it is reported through
/// [`crate::boundary::BoundaryStats::version_conflicts`], never as a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LatticeError {
    /// Out-of-range ids, bad base, wrong accessor on a boundary
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failure or sizes below the structural minima
    #[error("resource error: {0}")]
    Resource(String),

    /// Scaling past a cap, shard full, offset past a region's end
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Operation not valid in the current lifecycle state
    #[error("state error: {0}")]
    State(String),
}

impl LatticeError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a resource error
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Create a capacity error
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::CapacityExceeded(msg.into())
    }

    /// Capacity error for `offset + size > len`
    pub fn out_of_bounds(offset: usize, size: usize, len: usize) -> Self {
        Self::CapacityExceeded(format!("offset {offset} + size {size} > region size {len}"))
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Invalid argument built from any displayable value
    pub fn invalid(what: &str, value: impl fmt::Display) -> Self {
        Self::InvalidArgument(format!("{what}: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = LatticeError::out_of_bounds(1020, 8, 1024);
        assert_eq!(err.to_string(), "capacity exceeded: offset 1020 + size 8 > region size 1024");
        assert!(matches!(err, LatticeError::CapacityExceeded(_)));

        let err = LatticeError::invalid("base", 1);
        assert_eq!(err.to_string(), "invalid argument: base: 1");
    }
}
