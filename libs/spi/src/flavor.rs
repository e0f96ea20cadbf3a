//! Flavor plugin interface and the vanilla flavor.
//!
//! A flavor carries the workload-specific knowledge that the instance
//! plugin doesn't have: what to run on boot, how to tag members, and how to
//! tell whether a member is serving.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{AllocationMethod, Health, InstanceDescription, InstanceSpec, PluginResult, Tags};

/// Workload flavor interface.
#[async_trait]
pub trait FlavorPlugin: Send + Sync {
    /// Check flavor properties against the group's allocation method.
    async fn validate(
        &self,
        properties: &serde_json::Value,
        allocation: &AllocationMethod,
    ) -> PluginResult<()>;

    /// Shape a provisioning request. May set the init script and add tags.
    async fn prepare(
        &self,
        properties: &serde_json::Value,
        spec: InstanceSpec,
        allocation: &AllocationMethod,
    ) -> PluginResult<InstanceSpec>;

    /// Report the health of a running instance.
    async fn healthy(
        &self,
        properties: &serde_json::Value,
        instance: &InstanceDescription,
    ) -> PluginResult<Health>;
}

#[derive(Debug, Default, Deserialize)]
struct VanillaProperties {
    #[serde(rename = "Init", default)]
    init: String,

    #[serde(rename = "Tags", default)]
    tags: Tags,
}

/// A flavor that injects a fixed init script and tags.
///
/// Properties: `{"Init": "<script>", "Tags": {"k": "v"}}`, both optional.
/// Every instance is reported healthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct VanillaFlavor;

impl VanillaFlavor {
    fn parse(properties: &serde_json::Value) -> PluginResult<VanillaProperties> {
        if properties.is_null() {
            return Ok(VanillaProperties::default());
        }
        Ok(serde_json::from_value(properties.clone())?)
    }
}

#[async_trait]
impl FlavorPlugin for VanillaFlavor {
    async fn validate(
        &self,
        properties: &serde_json::Value,
        _allocation: &AllocationMethod,
    ) -> PluginResult<()> {
        Self::parse(properties).map(|_| ())
    }

    async fn prepare(
        &self,
        properties: &serde_json::Value,
        mut spec: InstanceSpec,
        _allocation: &AllocationMethod,
    ) -> PluginResult<InstanceSpec> {
        let parsed = Self::parse(properties)?;
        spec.init = parsed.init;
        spec.tags.extend(parsed.tags);
        Ok(spec)
    }

    async fn healthy(
        &self,
        _properties: &serde_json::Value,
        instance: &InstanceDescription,
    ) -> PluginResult<Health> {
        debug!(instance_id = %instance.id, "[VANILLA] Reporting instance healthy");
        Ok(Health::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_id::InstanceId;

    #[tokio::test]
    async fn test_vanilla_prepare_injects_init_and_tags() {
        let properties = serde_json::json!({"Init": "echo hi", "Tags": {"role": "worker"}});
        let mut spec = InstanceSpec::default();
        spec.tags.insert("fleet.group".to_string(), "workers".to_string());

        let spec = VanillaFlavor
            .prepare(&properties, spec, &AllocationMethod::with_size(1))
            .await
            .unwrap();

        assert_eq!(spec.init, "echo hi");
        assert_eq!(spec.tags.get("role").map(String::as_str), Some("worker"));
        assert_eq!(spec.tags.get("fleet.group").map(String::as_str), Some("workers"));
    }

    #[tokio::test]
    async fn test_vanilla_validate_rejects_bad_properties() {
        let properties = serde_json::json!({"Init": 42});
        let result = VanillaFlavor
            .validate(&properties, &AllocationMethod::with_size(1))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_vanilla_always_healthy() {
        let instance = InstanceDescription {
            id: InstanceId::new("i-1"),
            logical_id: None,
            tags: Tags::new(),
        };
        let health = VanillaFlavor
            .healthy(&serde_json::Value::Null, &instance)
            .await
            .unwrap();
        assert_eq!(health, Health::Healthy);
    }
}
