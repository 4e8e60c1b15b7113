//! Base error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! variant where they need configuration or parse failures.

use thiserror::Error;

use crate::{LinkId, NodeId, SegmentId};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("link {0} not found")]
    LinkNotFound(LinkId),

    #[error("segment {0} not found")]
    SegmentNotFound(SegmentId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for `meso-core`.
pub type CoreResult<T> = Result<T, CoreError>;
