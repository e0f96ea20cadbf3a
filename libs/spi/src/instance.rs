//! Instance plugin interface.
//!
//! The instance plugin abstracts the infrastructure that actually runs
//! machines (a cloud API, a hypervisor, a directory of files):
//! - Validating plugin-specific properties
//! - Provisioning and destroying instances
//! - Listing instances by tag

use async_trait::async_trait;
use fleet_id::InstanceId;

use crate::{InstanceDescription, InstanceSpec, PluginResult, Tags};

/// Instance provisioning interface.
#[async_trait]
pub trait InstancePlugin: Send + Sync {
    /// Check plugin-specific properties before a group is accepted.
    async fn validate(&self, properties: &serde_json::Value) -> PluginResult<()>;

    /// Provision one instance.
    async fn provision(&self, spec: InstanceSpec) -> PluginResult<InstanceId>;

    /// Destroy an instance by ID.
    async fn destroy(&self, id: &InstanceId) -> PluginResult<()>;

    /// List instances carrying every tag in `tags`.
    async fn describe_instances(&self, tags: &Tags) -> PluginResult<Vec<InstanceDescription>>;
}
