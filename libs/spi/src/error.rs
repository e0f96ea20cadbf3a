//! Error types for plugin calls.

use fleet_id::InstanceId;
use thiserror::Error;

/// Errors returned by instance and flavor plugins.
#[derive(Debug, Error, Clone)]
pub enum PluginError {
    /// The plugin rejected its properties.
    #[error("invalid properties: {0}")]
    InvalidProperties(String),

    /// The instance does not exist.
    #[error("instance {0} does not exist")]
    InstanceNotFound(InstanceId),

    /// The backing system could not be reached or refused the call.
    #[error("plugin unavailable: {0}")]
    Unavailable(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::Serialization(err.to_string())
    }
}

/// Errors resolving a group's allocation method.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// Neither a size nor logical IDs were declared.
    #[error("Allocation must not be blank")]
    Blank,

    /// Both a size and logical IDs were declared.
    #[error("Only one Allocation method may be used")]
    Ambiguous,
}
