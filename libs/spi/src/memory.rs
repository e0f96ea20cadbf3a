//! In-process instance plugin.
//!
//! Keeps provisioned instances in a map instead of talking to real
//! infrastructure. Used for development and by the controller's tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use fleet_id::InstanceId;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    tags_match, InstanceDescription, InstancePlugin, InstanceSpec, PluginError, PluginResult, Tags,
};

/// In-memory instance plugin.
pub struct MemoryInstancePlugin {
    /// Prefix for generated instance IDs.
    prefix: String,

    /// Counter for generating instance IDs.
    next_id: AtomicU64,

    /// Live instances by ID.
    instances: RwLock<BTreeMap<InstanceId, InstanceSpec>>,

    /// Whether provisioning should "fail".
    fail_provision: AtomicBool,

    provisioned: AtomicU64,
    destroyed: AtomicU64,
}

impl MemoryInstancePlugin {
    /// Create an empty plugin.
    pub fn new() -> Self {
        Self::with_prefix("mem")
    }

    /// Create an empty plugin whose IDs start with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_id: AtomicU64::new(0),
            instances: RwLock::new(BTreeMap::new()),
            fail_provision: AtomicBool::new(false),
            provisioned: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
        }
    }

    /// Create a plugin that fails every provision call.
    pub fn failing() -> Self {
        let plugin = Self::new();
        plugin.set_fail_provision(true);
        plugin
    }

    /// Make provision calls fail (or succeed again).
    pub fn set_fail_provision(&self, fail: bool) {
        self.fail_provision.store(fail, Ordering::SeqCst);
    }

    /// Insert an instance directly, bypassing the provision counters.
    pub async fn seed(&self, spec: InstanceSpec) -> InstanceId {
        let id = self.next_instance_id();
        self.instances.write().await.insert(id.clone(), spec);
        id
    }

    /// Snapshot of all live instances.
    pub async fn instances(&self) -> BTreeMap<InstanceId, InstanceSpec> {
        self.instances.read().await.clone()
    }

    /// Number of successful provision calls.
    pub fn provision_count(&self) -> u64 {
        self.provisioned.load(Ordering::SeqCst)
    }

    /// Number of successful destroy calls.
    pub fn destroy_count(&self) -> u64 {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn next_instance_id(&self) -> InstanceId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        // Zero padding keeps lexicographic order equal to creation order.
        InstanceId::new(format!("{}-{:06}", self.prefix, n))
    }
}

impl Default for MemoryInstancePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstancePlugin for MemoryInstancePlugin {
    async fn validate(&self, properties: &serde_json::Value) -> PluginResult<()> {
        if properties.is_null() || properties.is_object() {
            Ok(())
        } else {
            Err(PluginError::InvalidProperties(
                "memory instance properties must be an object".to_string(),
            ))
        }
    }

    async fn provision(&self, spec: InstanceSpec) -> PluginResult<InstanceId> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(PluginError::Unavailable(
                "memory plugin configured to fail".to_string(),
            ));
        }

        let id = self.next_instance_id();
        info!(
            instance_id = %id,
            logical_id = ?spec.logical_id,
            "[MEMORY] Provisioning instance"
        );

        self.instances.write().await.insert(id.clone(), spec);
        self.provisioned.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn destroy(&self, id: &InstanceId) -> PluginResult<()> {
        let removed = self.instances.write().await.remove(id);
        if removed.is_none() {
            return Err(PluginError::InstanceNotFound(id.clone()));
        }

        info!(instance_id = %id, "[MEMORY] Destroyed instance");
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn describe_instances(&self, tags: &Tags) -> PluginResult<Vec<InstanceDescription>> {
        let instances = self.instances.read().await;
        let found: Vec<_> = instances
            .iter()
            .filter(|(_, spec)| tags_match(&spec.tags, tags))
            .map(|(id, spec)| InstanceDescription {
                id: id.clone(),
                logical_id: spec.logical_id.clone(),
                tags: spec.tags.clone(),
            })
            .collect();

        debug!(count = found.len(), "[MEMORY] Described instances");
        Ok(found)
    }
}
