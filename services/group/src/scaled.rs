//! Binding between one group and its instance and flavor plugins.
//!
//! `Scaled` is the only path through which supervisors and updates touch
//! infrastructure. Create, destroy and health are best-effort: failures are
//! logged and dropped, and the next reconciliation pass retries because the
//! member is still observed as missing or surplus. Only `list` reports
//! errors, since callers use it to decide whether to act at all.

use std::sync::Arc;

use fleet_id::{GroupId, InstanceId, LogicalId};
use fleet_spi::{Health, InstanceDescription, InstanceSpec, PluginResult, Tags};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::settings::{member_tags, provision_tags, GroupSettings};

/// Instance operations for one group.
pub struct Scaled {
    group_id: GroupId,

    /// Tags used to find the group's members.
    member_tags: Tags,

    /// Current settings; swapped wholesale by updates.
    settings: RwLock<Arc<GroupSettings>>,
}

impl Scaled {
    pub fn new(group_id: GroupId, settings: Arc<GroupSettings>) -> Self {
        Self {
            member_tags: member_tags(&group_id),
            group_id,
            settings: RwLock::new(settings),
        }
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn member_tags(&self) -> &Tags {
        &self.member_tags
    }

    /// Snapshot of the current settings.
    pub async fn settings(&self) -> Arc<GroupSettings> {
        Arc::clone(&*self.settings.read().await)
    }

    /// Replace the settings used for subsequent operations.
    pub async fn change_settings(&self, settings: Arc<GroupSettings>) {
        *self.settings.write().await = settings;
    }

    /// Provision one member with the current configuration.
    pub async fn create_one(&self, logical_id: Option<LogicalId>) {
        let settings = self.settings().await;

        let spec = InstanceSpec {
            properties: settings.config.instance.properties.clone(),
            tags: provision_tags(&self.group_id, settings.instance_hash()),
            init: String::new(),
            logical_id: logical_id.clone(),
        };

        let spec = match settings
            .flavor_plugin
            .prepare(&settings.config.flavor.properties, spec, settings.allocation())
            .await
        {
            Ok(spec) => spec,
            Err(e) => {
                warn!(
                    group_id = %self.group_id,
                    logical_id = ?logical_id,
                    error = %e,
                    "Flavor failed to prepare instance"
                );
                return;
            }
        };

        match settings.instance_plugin.provision(spec).await {
            Ok(id) => info!(
                group_id = %self.group_id,
                instance_id = %id,
                logical_id = ?logical_id,
                "Created instance"
            ),
            Err(e) => warn!(
                group_id = %self.group_id,
                logical_id = ?logical_id,
                error = %e,
                "Failed to provision instance"
            ),
        }
    }

    /// Destroy one member, logging any failure.
    pub async fn destroy(&self, id: &InstanceId) {
        if let Err(e) = self.try_destroy(id).await {
            warn!(
                group_id = %self.group_id,
                instance_id = %id,
                error = %e,
                "Failed to destroy instance"
            );
        }
    }

    /// Destroy one member, reporting failure to the caller.
    pub async fn try_destroy(&self, id: &InstanceId) -> PluginResult<()> {
        let settings = self.settings().await;
        settings.instance_plugin.destroy(id).await?;
        info!(group_id = %self.group_id, instance_id = %id, "Destroyed instance");
        Ok(())
    }

    /// Health of a member according to the current flavor.
    ///
    /// A flavor error counts as unknown health.
    pub async fn health(&self, instance: &InstanceDescription) -> Health {
        let settings = self.settings().await;
        match settings
            .flavor_plugin
            .healthy(&settings.config.flavor.properties, instance)
            .await
        {
            Ok(health) => health,
            Err(e) => {
                warn!(
                    group_id = %self.group_id,
                    instance_id = %instance.id,
                    error = %e,
                    "Failed to check instance health"
                );
                Health::Unknown
            }
        }
    }

    /// All members currently carrying the group's membership tags.
    pub async fn list(&self) -> PluginResult<Vec<InstanceDescription>> {
        let settings = self.settings().await;
        let instances = settings
            .instance_plugin
            .describe_instances(&self.member_tags)
            .await?;
        debug!(group_id = %self.group_id, count = instances.len(), "Listed group members");
        Ok(instances)
    }
}

impl std::fmt::Debug for Scaled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scaled")
            .field("group_id", &self.group_id)
            .field("member_tags", &self.member_tags)
            .finish_non_exhaustive()
    }
}
