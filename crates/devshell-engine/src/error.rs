//! Loader error types.

use crate::rewrite::RewriteError;
use devshell_bytecode::ImageError;
use std::path::PathBuf;

/// Errors that can occur while loading types into a hosted session.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No registry, bootstrap resource or shared type supplies the name
    #[error("Type not found: {name}")]
    TypeNotFound {
        /// Binary name that was requested
        name: String,
    },

    /// The owning unit failed to compile upstream
    #[error("Unit '{unit}' has errors; cannot load '{name}'")]
    UnitInError {
        /// Top-level type name of the unit
        unit: String,
        /// Binary name that was requested
        name: String,
    },

    /// A type image could not be decoded or re-encoded
    #[error("Invalid image for '{name}': {source}")]
    Decode {
        /// Binary name of the type
        name: String,
        /// Underlying codec error
        #[source]
        source: ImageError,
    },

    /// The marker hierarchy metadata contradicts itself; the load is abandoned
    #[error("Inconsistent marker model: no declarer of '{signature}' is assignable from '{type_desc}'")]
    InconsistentMarkerModel {
        /// Type signature the call was made on
        type_desc: String,
        /// Method signature (`name` + descriptor)
        signature: String,
    },

    /// A type is its own supertype
    #[error("Class circularity while defining '{name}'")]
    ClassCircularity {
        /// Binary name of the type being defined
        name: String,
    },

    /// A bootstrap type's image was not found at its resource location
    #[error("Bootstrap resource missing for '{name}' at '{path}'")]
    BootstrapMissing {
        /// Binary name of the bootstrap type
        name: String,
        /// Resource path that was read
        path: PathBuf,
    },

    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<RewriteError> for BridgeError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::Image { name, source } => BridgeError::Decode { name, source },
            RewriteError::UnresolvableOwner {
                type_desc,
                signature,
            } => BridgeError::InconsistentMarkerModel {
                type_desc,
                signature,
            },
        }
    }
}

/// Result alias for loader operations
pub type BridgeResult<T> = Result<T, BridgeError>;
