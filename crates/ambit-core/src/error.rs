//! Control-plane error types.
//!
//! Only topology mutations report errors. Failures on the render path
//! (disconnected input, degenerate geometry, missing strategy) degrade to
//! silence or a neutral value and are never surfaced here.

use core::fmt;
use thiserror::Error;

/// Which side of a node a port index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// An input endpoint.
    Input,
    /// An output endpoint.
    Output,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Input => f.write_str("input"),
            PortKind::Output => f.write_str("output"),
        }
    }
}

/// Errors returned by graph mutations and node configuration.
///
/// A call that returns an error leaves the graph unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The destination node or parameter cannot be used (released, or its
    /// context has shut down), or a configuration value is not recognised.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A port index is beyond the node's port count.
    #[error("{port} index {index} out of range (node has {count})")]
    IndexOutOfRange {
        /// Whether the index named an input or an output.
        port: PortKind,
        /// The offending index.
        index: usize,
        /// Number of ports of that kind on the node.
        count: usize,
    },

    /// Source and destination belong to different render contexts.
    #[error("source and destination belong to different render contexts")]
    CrossContextMismatch,

    /// The requested mode exists but is not implemented by this engine.
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl GraphError {
    /// Create an invalid argument error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        GraphError::InvalidArgument(reason.into())
    }

    /// Create an out-of-range error for an input index.
    pub fn input_out_of_range(index: usize, count: usize) -> Self {
        GraphError::IndexOutOfRange {
            port: PortKind::Input,
            index,
            count,
        }
    }

    /// Create an out-of-range error for an output index.
    pub fn output_out_of_range(index: usize, count: usize) -> Self {
        GraphError::IndexOutOfRange {
            port: PortKind::Output,
            index,
            count,
        }
    }
}
