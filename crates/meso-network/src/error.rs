//! Network-subsystem error type.

use thiserror::Error;

use meso_core::{LinkId, NodeId};

/// Errors produced by `meso-network`.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no path from {from} to {to}")]
    NoPath { from: NodeId, to: NodeId },

    #[error("node {0} not found in network")]
    NodeNotFound(NodeId),

    #[error("invalid segment on link {link}: {reason}")]
    InvalidSegment { link: LinkId, reason: String },

    #[error("network parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
