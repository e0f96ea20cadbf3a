//! Typed ID definitions.

use crate::define_id;

define_id!(
    /// Identity of a watched group, declared by the caller.
    GroupId
);

define_id!(
    /// Handle of a provisioned instance, assigned by the instance plugin.
    InstanceId
);

define_id!(
    /// Stable identity of a quorum member, such as an IP address.
    LogicalId
);
