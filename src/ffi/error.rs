//! Bridge Errors
//!
//! Every failure in the bridge surfaces as a [`BridgeError`]. Nothing is
//! recovered internally.

use thiserror::Error;

use crate::config::ConfigError;

/// Error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The library could not be located or loaded
    #[error("Library '{name}' not found: {reason}")]
    LibraryNotFound { name: String, reason: String },

    /// The requested function does not exist in the library
    #[error("Function \"{0}\" not found in library")]
    SymbolNotFound(String),

    /// The resolver rejected the symbol name itself
    #[error("Invalid symbol name: {0:?}")]
    InvalidSymbol(String),

    /// A type name that names no known return or native type
    #[error("Unknown type name '{0}'")]
    UnknownType(String),

    /// A buffer range exceeds the buffer bounds
    #[error("Range of {length} bytes at offset {start} exceeds buffer of {size} bytes")]
    Range {
        start: usize,
        length: usize,
        size: usize,
    },

    /// The call primitive rejected the arguments or return type
    #[error("{0}")]
    TypeMismatch(String),

    /// A native buffer could not be allocated
    #[error("Failed to allocate {size} byte buffer: {reason}")]
    Allocation { size: usize, reason: String },

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
