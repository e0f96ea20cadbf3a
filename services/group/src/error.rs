//! Error types for group operations.

use fleet_id::{GroupId, InstanceId};
use fleet_spi::{AllocationError, PluginError};
use thiserror::Error;

/// Result type for group operations.
pub type GroupResult<T> = Result<T, GroupError>;

/// Errors returned by the group registry.
#[derive(Debug, Error)]
pub enum GroupError {
    // -- validation --
    #[error("Group ID must not be blank")]
    BlankGroupId,

    #[error("Invalid group properties: {0}")]
    InvalidProperties(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("Failed to find Flavor plugin '{0}'")]
    FlavorPluginNotFound(String),

    #[error("Failed to find Instance plugin '{0}'")]
    InstancePluginNotFound(String),

    #[error("{plugin} plugin rejected the group: {source}")]
    Rejected {
        plugin: &'static str,
        #[source]
        source: PluginError,
    },

    // -- state --
    #[error("Already watching group '{0}'")]
    AlreadyWatching(GroupId),

    #[error("Group '{0}' is not being watched")]
    NotWatched(GroupId),

    #[error("Update already in progress for this group")]
    UpdateInProgress,

    #[error("Group '{0}' is not being updated")]
    NotUpdating(GroupId),

    #[error("Logical ID changes are not supported")]
    LogicalIdChange,

    #[error("Allocation method changes are not supported")]
    AllocationChange,

    #[error("Group settings changed while planning the update")]
    SettingsChanged,

    // -- operational --
    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("instance plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Failed to destroy {} instances of group '{group}'", .failed.len())]
    DestroyIncomplete {
        group: GroupId,
        failed: Vec<InstanceId>,
    },
}

impl GroupError {
    /// Returns true if the group spec itself was rejected.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GroupError::BlankGroupId
                | GroupError::InvalidProperties(_)
                | GroupError::Allocation(_)
                | GroupError::FlavorPluginNotFound(_)
                | GroupError::InstancePluginNotFound(_)
                | GroupError::Rejected { .. }
        )
    }

    /// Returns true if the call conflicts with the group's current state.
    pub fn is_state(&self) -> bool {
        matches!(
            self,
            GroupError::AlreadyWatching(_)
                | GroupError::NotWatched(_)
                | GroupError::UpdateInProgress
                | GroupError::NotUpdating(_)
                | GroupError::LogicalIdChange
                | GroupError::AllocationChange
                | GroupError::SettingsChanged
        )
    }
}

/// Errors that end a running update plan.
#[derive(Debug, Error, Clone)]
pub enum UpdateError {
    /// An instance with the new configuration reported unhealthy.
    #[error("Instance {0} is unhealthy")]
    Unhealthy(InstanceId),

    /// The update was stopped through `stop_update`.
    #[error("Update halted by user")]
    Halted,

    #[error("instance plugin error: {0}")]
    Plugin(#[from] PluginError),
}
