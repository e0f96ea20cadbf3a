//! Parsed group configuration and the tags derived from it.
//!
//! A group's properties carry three sections: the allocation method, the
//! instance plugin section and the flavor plugin section. The config hash
//! covers only the instance and flavor sections, so resizing a group never
//! marks its members as out of date.

use std::sync::Arc;

use fleet_id::GroupId;
use fleet_reconcile::{classify_instances, SpecHash};
use fleet_spi::{
    AllocationMethod, FlavorPlugin, GroupSpec, InstanceDescription, InstancePlugin, PluginLookup,
    Tags,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GroupError, GroupResult};

/// Tag identifying the group an instance belongs to.
pub const GROUP_TAG: &str = "fleet.group";

/// Tag recording the config hash an instance was created with.
pub const CONFIG_TAG: &str = "fleet.config_sha";

/// Reference to a plugin plus the properties handed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    #[serde(rename = "Plugin")]
    pub plugin: String,

    #[serde(rename = "Properties", default)]
    pub properties: serde_json::Value,
}

/// The parsed `Properties` of a group spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProperties {
    #[serde(rename = "Allocation", default)]
    pub allocation: AllocationMethod,

    #[serde(rename = "Instance")]
    pub instance: PluginSpec,

    #[serde(rename = "Flavor")]
    pub flavor: PluginSpec,
}

impl GroupProperties {
    /// Parse the properties of a group spec.
    pub fn parse(spec: &GroupSpec) -> GroupResult<Self> {
        serde_json::from_value(spec.properties.clone())
            .map_err(|e| GroupError::InvalidProperties(e.to_string()))
    }

    /// Digest of the instance and flavor sections.
    pub fn instance_hash(&self) -> SpecHash {
        SpecHash::from_json(&serde_json::json!({
            "Instance": self.instance,
            "Flavor": self.flavor,
        }))
    }
}

/// A validated group configuration bound to its plugins.
///
/// Immutable; an update replaces the whole value.
pub struct GroupSettings {
    pub instance_plugin: Arc<dyn InstancePlugin>,
    pub flavor_plugin: Arc<dyn FlavorPlugin>,
    pub config: GroupProperties,
    hash: SpecHash,
}

impl GroupSettings {
    pub fn new(
        instance_plugin: Arc<dyn InstancePlugin>,
        flavor_plugin: Arc<dyn FlavorPlugin>,
        config: GroupProperties,
    ) -> Self {
        let hash = config.instance_hash();
        Self {
            instance_plugin,
            flavor_plugin,
            config,
            hash,
        }
    }

    /// The config hash new members are tagged with.
    pub fn instance_hash(&self) -> &SpecHash {
        &self.hash
    }

    pub fn allocation(&self) -> &AllocationMethod {
        &self.config.allocation
    }
}

impl std::fmt::Debug for GroupSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupSettings")
            .field("instance_plugin", &self.config.instance.plugin)
            .field("flavor_plugin", &self.config.flavor.plugin)
            .field("allocation", &self.config.allocation)
            .field("hash", &self.hash)
            .finish()
    }
}

/// Validate a group spec and resolve its plugins.
pub async fn validate(spec: &GroupSpec, plugins: &dyn PluginLookup) -> GroupResult<GroupSettings> {
    if spec.id.is_blank() {
        return Err(GroupError::BlankGroupId);
    }

    let config = GroupProperties::parse(spec)?;
    config.allocation.resolve()?;

    let flavor_plugin = plugins
        .flavor_plugin(&config.flavor.plugin)
        .ok_or_else(|| GroupError::FlavorPluginNotFound(config.flavor.plugin.clone()))?;
    flavor_plugin
        .validate(&config.flavor.properties, &config.allocation)
        .await
        .map_err(|source| GroupError::Rejected {
            plugin: "Flavor",
            source,
        })?;

    let instance_plugin = plugins
        .instance_plugin(&config.instance.plugin)
        .ok_or_else(|| GroupError::InstancePluginNotFound(config.instance.plugin.clone()))?;
    instance_plugin
        .validate(&config.instance.properties)
        .await
        .map_err(|source| GroupError::Rejected {
            plugin: "Instance",
            source,
        })?;

    debug!(group_id = %spec.id, "Group spec validated");
    Ok(GroupSettings::new(instance_plugin, flavor_plugin, config))
}

/// Tags every member of the group carries.
pub fn member_tags(id: &GroupId) -> Tags {
    Tags::from([(GROUP_TAG.to_string(), id.to_string())])
}

/// Tags a newly created member is given, before the flavor adds its own.
pub fn provision_tags(id: &GroupId, hash: &SpecHash) -> Tags {
    let mut tags = member_tags(id);
    tags.insert(CONFIG_TAG.to_string(), hash.to_string());
    tags
}

/// Split members into those created with `settings`' config and the rest.
pub fn desired_and_undesired(
    instances: Vec<InstanceDescription>,
    settings: &GroupSettings,
) -> (Vec<InstanceDescription>, Vec<InstanceDescription>) {
    classify_instances(instances, settings.instance_hash(), |inst| {
        inst.tags.get(CONFIG_TAG).map(String::as_str)
    })
}
