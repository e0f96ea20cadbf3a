//! Shared fixtures for controller tests.
//!
//! - `TestFlavor`: a flavor with two node types (`minion` groups are sized,
//!   `leader` groups use logical IDs) and a pluggable health hook
//! - Spec builders producing the JSON layout the controller parses

use std::sync::Arc;

use async_trait::async_trait;
use fleet_id::{GroupId, LogicalId};
use fleet_spi::{
    AllocationMethod, FlavorPlugin, GroupSpec, Health, InstanceDescription, InstanceSpec,
    MemoryInstancePlugin, PluginError, PluginResult, StaticPlugins, Tags,
};
use serde::Deserialize;

/// Name both test plugins are registered under.
pub const PLUGIN_NAME: &str = "test";

/// Group ID used by the builders.
pub const GROUP_ID: &str = "testGroup";

const TYPE_MINION: &str = "minion";
const TYPE_LEADER: &str = "leader";

/// Health decision for one instance, given the group's current flavor
/// properties.
pub type HealthHook = Arc<dyn Fn(&serde_json::Value, &InstanceDescription) -> Health + Send + Sync>;

#[derive(Debug, Deserialize)]
struct FlavorSchema {
    #[serde(rename = "Type")]
    kind: String,

    #[serde(rename = "Init", default)]
    init: String,

    #[serde(rename = "Tags", default)]
    tags: Tags,
}

fn parse_schema(properties: &serde_json::Value) -> PluginResult<FlavorSchema> {
    Ok(serde_json::from_value(properties.clone())?)
}

/// Flavor used by controller tests.
#[derive(Clone, Default)]
pub struct TestFlavor {
    healthy: Option<HealthHook>,
}

impl TestFlavor {
    /// A flavor that reports every instance healthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// A flavor whose health answers come from `hook`.
    pub fn with_health<F>(hook: F) -> Self
    where
        F: Fn(&serde_json::Value, &InstanceDescription) -> Health + Send + Sync + 'static,
    {
        Self {
            healthy: Some(Arc::new(hook)),
        }
    }
}

#[async_trait]
impl FlavorPlugin for TestFlavor {
    async fn validate(
        &self,
        properties: &serde_json::Value,
        allocation: &AllocationMethod,
    ) -> PluginResult<()> {
        let schema = parse_schema(properties)?;
        match schema.kind.as_str() {
            TYPE_MINION if !allocation.logical_ids.is_empty() => Err(PluginError::InvalidProperties(
                "Minion Groups must be scaled with Size, not LogicalIDs".to_string(),
            )),
            TYPE_LEADER if allocation.size > 0 => Err(PluginError::InvalidProperties(
                "Leader Groups must be scaled with LogicalIDs, not Size".to_string(),
            )),
            TYPE_MINION | TYPE_LEADER => Ok(()),
            _ => Err(PluginError::InvalidProperties(
                "Unrecognized node type".to_string(),
            )),
        }
    }

    async fn prepare(
        &self,
        properties: &serde_json::Value,
        mut spec: InstanceSpec,
        _allocation: &AllocationMethod,
    ) -> PluginResult<InstanceSpec> {
        let schema = parse_schema(properties)?;
        spec.init = schema.init;
        spec.tags.extend(schema.tags);
        Ok(spec)
    }

    async fn healthy(
        &self,
        properties: &serde_json::Value,
        instance: &InstanceDescription,
    ) -> PluginResult<Health> {
        Ok(match &self.healthy {
            Some(hook) => hook(properties, instance),
            None => Health::Healthy,
        })
    }
}

/// Register `instances` and `flavor` under [`PLUGIN_NAME`].
pub fn plugins(instances: Arc<MemoryInstancePlugin>, flavor: TestFlavor) -> StaticPlugins {
    StaticPlugins::new()
        .with_instance(PLUGIN_NAME, instances)
        .with_flavor(PLUGIN_NAME, Arc::new(flavor))
}

/// Properties of an elastic group of `size` minions.
pub fn minion_properties(size: u32, instance_data: &str, flavor_init: &str) -> serde_json::Value {
    serde_json::json!({
        "Allocation": {"Size": size},
        "Instance": {
            "Plugin": PLUGIN_NAME,
            "Properties": {"OpaqueValue": instance_data}
        },
        "Flavor": {
            "Plugin": PLUGIN_NAME,
            "Properties": {"Type": TYPE_MINION, "Init": flavor_init}
        }
    })
}

/// Properties of a quorum of leaders.
pub fn leader_properties(logical_ids: &[LogicalId], instance_data: &str) -> serde_json::Value {
    serde_json::json!({
        "Allocation": {"LogicalIDs": logical_ids},
        "Instance": {
            "Plugin": PLUGIN_NAME,
            "Properties": {"OpaqueValue": instance_data}
        },
        "Flavor": {
            "Plugin": PLUGIN_NAME,
            "Properties": {"Type": TYPE_LEADER}
        }
    })
}

/// Elastic group spec with [`GROUP_ID`].
pub fn minions(size: u32, instance_data: &str, flavor_init: &str) -> GroupSpec {
    GroupSpec::new(GROUP_ID, minion_properties(size, instance_data, flavor_init))
}

/// Quorum group spec with [`GROUP_ID`].
pub fn leaders(logical_ids: &[LogicalId], instance_data: &str) -> GroupSpec {
    GroupSpec::new(GROUP_ID, leader_properties(logical_ids, instance_data))
}

/// The three logical IDs used by quorum tests.
pub fn leader_ids() -> Vec<LogicalId> {
    ["192.168.0.4", "192.168.0.5", "192.168.0.6"]
        .into_iter()
        .map(LogicalId::new)
        .collect()
}

/// The group ID used by the builders.
pub fn group_id() -> GroupId {
    GroupId::new(GROUP_ID)
}

/// Returns true if the flavor properties carry `marker` in their init
/// script. Handy inside health hooks.
pub fn init_contains(properties: &serde_json::Value, marker: &str) -> bool {
    properties
        .get("Init")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|init| init.contains(marker))
}
