//! Closed error taxonomy for the allocator core.
//!
//! Every fallible operation returns exactly one of [`MemError`]'s variants.
//! Validation errors surface before any state change; execution errors
//! (notably [`MemError::NoMem`]) trigger a journal revert before surfacing.
//! [`MemError::InternalError`] is never expected in practice — it signals a
//! self-check violation and should be treated as a bug report.

use thiserror::Error;

/// Result type alias used throughout the allocator core.
pub type Result<T> = std::result::Result<T, MemError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemError {
    #[error("failed constructor option: {0}")]
    FailedOption(String),

    #[error("invalid memory type: {0}")]
    InvalidType(String),

    #[error("invalid node: {0}")]
    InvalidNode(String),

    #[error("invalid node mask: {0}")]
    InvalidNodeMask(String),

    #[error("invalid QoS class: {0}")]
    InvalidQosClass(String),

    #[error("request already exists: {0}")]
    AlreadyExists(String),

    #[error("unknown request: {0}")]
    UnknownRequest(String),

    #[error("no initial nodes satisfy the requested types for {0}")]
    NoInitialNodes(String),

    #[error("no normal-memory node available for {0}")]
    NoNormalMemory(String),

    #[error("out of memory: overcommit could not be resolved for {0}")]
    NoMem(String),

    #[error("no such zone: {0}")]
    NoZone(String),

    #[error("offer has expired")]
    ExpiredOffer,

    #[error("internal error: {0}")]
    InternalError(String),
}
