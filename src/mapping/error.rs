//! Error definitions for the mapping module

use crate::output::TransportError;
use crate::persistence::StorageError;
use num_enum::{TryFromPrimitive, TryFromPrimitiveError};
use thiserror::Error;

/// Errors returned by the mapping engine
///
/// Configuration calls fail synchronously with the variant that names the
/// offending argument. The event path never propagates transport failures to
/// its caller; they are counted and logged per attempt instead.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Malformed rule fields (oversized template, DLC above 8, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No rule lives in the requested slot
    #[error("Mapping {0} not found")]
    NotFound(u16),

    /// The table (or the per-device share of it) is full
    #[error("Mapping capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Serial or CAN send failed or timed out
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-volatile read or write failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted data is corrupt beyond per-record recovery
    #[error("Validation error: {0}")]
    Validation(String),
}

impl MappingError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MappingError::InvalidArgument(msg.into())
    }
}

// unknown persisted discriminant
impl<T: TryFromPrimitive> From<TryFromPrimitiveError<T>> for MappingError {
    fn from(e: TryFromPrimitiveError<T>) -> Self {
        MappingError::InvalidArgument(e.to_string())
    }
}
