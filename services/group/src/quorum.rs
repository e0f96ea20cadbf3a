//! Fixed-membership supervisor.
//!
//! Every logical ID in the allocation must be backed by exactly one member.
//! Members without a logical ID, or with one outside the set, are destroyed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fleet_id::LogicalId;
use fleet_reconcile::StopSignal;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{GroupError, GroupResult};
use crate::plan::UpdatePlan;
use crate::rolling::RollingUpdate;
use crate::scaled::Scaled;
use crate::settings::GroupSettings;
use crate::supervisor::TickStats;

/// Supervisor for a group allocated by logical IDs.
#[derive(Debug)]
pub struct Quorum {
    scaled: Arc<Scaled>,
    logical_ids: Vec<LogicalId>,
    poll_interval: Duration,
    stop: StopSignal,
}

impl Quorum {
    pub fn new(scaled: Arc<Scaled>, logical_ids: Vec<LogicalId>, poll_interval: Duration) -> Self {
        Self {
            scaled,
            logical_ids,
            poll_interval,
            stop: StopSignal::new(),
        }
    }

    pub async fn run(&self) {
        info!(
            group_id = %self.scaled.group_id(),
            members = self.logical_ids.len(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting quorum"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.stop.stopped() => {
                    info!(group_id = %self.scaled.group_id(), "Quorum stopped");
                    break;
                }

                _ = ticker.tick() => {
                    self.converge().await;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// One reconciliation pass: replace missing members, remove strays.
    pub async fn converge(&self) -> TickStats {
        let mut stats = TickStats::default();

        let descriptions = match self.scaled.list().await {
            Ok(descriptions) => descriptions,
            Err(e) => {
                error!(group_id = %self.scaled.group_id(), error = %e, "Failed to check group");
                return stats;
            }
        };

        let mut tasks = JoinSet::new();

        let present: BTreeSet<&LogicalId> = descriptions
            .iter()
            .filter_map(|d| d.logical_id.as_ref())
            .collect();

        for logical_id in &self.logical_ids {
            if present.contains(logical_id) {
                continue;
            }
            warn!(
                group_id = %self.scaled.group_id(),
                logical_id = %logical_id,
                "Logical ID is missing a member, creating"
            );
            let scaled = Arc::clone(&self.scaled);
            let logical_id = logical_id.clone();
            tasks.spawn(async move { scaled.create_one(Some(logical_id)).await });
            stats.created += 1;
        }

        for description in &descriptions {
            let known = description
                .logical_id
                .as_ref()
                .is_some_and(|id| self.logical_ids.contains(id));
            if known {
                continue;
            }
            warn!(
                group_id = %self.scaled.group_id(),
                instance_id = %description.id,
                "Destroying member with unknown logical ID"
            );
            let scaled = Arc::clone(&self.scaled);
            let id = description.id.clone();
            tasks.spawn(async move { scaled.destroy(&id).await });
            stats.destroyed += 1;
        }

        if stats == TickStats::default() {
            debug!(group_id = %self.scaled.group_id(), "Quorum is complete");
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(group_id = %self.scaled.group_id(), error = %e, "Instance task failed");
            }
        }

        stats
    }

    /// Plan a change to `updated`. Membership is fixed for the lifetime of a
    /// quorum, so the plan is always a rolling update over the whole set.
    /// Replacements are health gated on the full logical ID count.
    pub async fn plan_update(
        &self,
        _current: &GroupSettings,
        updated: &Arc<GroupSettings>,
    ) -> GroupResult<UpdatePlan> {
        let current_ids: BTreeSet<&LogicalId> = self.logical_ids.iter().collect();
        let updated_ids: BTreeSet<&LogicalId> = updated.allocation().logical_ids.iter().collect();
        if updated.allocation().size != 0 || current_ids != updated_ids {
            return Err(GroupError::LogicalIdChange);
        }

        Ok(UpdatePlan::Rolling(RollingUpdate::new(
            format!(
                "Performs a rolling update on {} instances",
                self.logical_ids.len()
            ),
            Arc::clone(&self.scaled),
            Arc::clone(updated),
            self.logical_ids.len(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaled::tests::{properties, settings_with};
    use fleet_id::GroupId;
    use fleet_spi::{AllocationMethod, InstanceSpec, MemoryInstancePlugin, VanillaFlavor};

    const POLL: Duration = Duration::from_millis(1);

    fn ids() -> Vec<LogicalId> {
        vec!["10.0.0.1".into(), "10.0.0.2".into(), "10.0.0.3".into()]
    }

    fn quorum_settings(plugin: &Arc<MemoryInstancePlugin>, logical_ids: Vec<LogicalId>, init: &str) -> Arc<GroupSettings> {
        let mut config = properties(0, init);
        config.allocation = AllocationMethod::with_logical_ids(logical_ids);
        settings_with(plugin, Arc::new(VanillaFlavor), config)
    }

    fn quorum(plugin: &Arc<MemoryInstancePlugin>) -> (Quorum, Arc<GroupSettings>) {
        let settings = quorum_settings(plugin, ids(), "v1");
        let scaled = Arc::new(Scaled::new(GroupId::new("managers"), Arc::clone(&settings)));
        (Quorum::new(scaled, ids(), POLL), settings)
    }

    #[tokio::test]
    async fn test_converge_creates_every_logical_id() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (quorum, _) = quorum(&plugin);

        let stats = quorum.converge().await;
        assert_eq!(stats, TickStats { created: 3, destroyed: 0 });

        let mut seen: Vec<_> = plugin
            .instances()
            .await
            .into_values()
            .filter_map(|spec| spec.logical_id)
            .collect();
        seen.sort();
        assert_eq!(seen, ids());

        assert_eq!(quorum.converge().await, TickStats::default());
    }

    #[tokio::test]
    async fn test_converge_replaces_missing_and_removes_strays() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (quorum, _) = quorum(&plugin);
        quorum.converge().await;

        let tags = quorum.scaled.member_tags().clone();
        let victim = plugin
            .instances()
            .await
            .into_iter()
            .find(|(_, spec)| spec.logical_id == Some("10.0.0.2".into()))
            .map(|(id, _)| id)
            .unwrap();
        quorum.scaled.try_destroy(&victim).await.unwrap();

        let stray = plugin
            .seed(InstanceSpec {
                logical_id: Some("10.0.0.9".into()),
                tags: tags.clone(),
                ..Default::default()
            })
            .await;
        let anonymous = plugin
            .seed(InstanceSpec {
                tags,
                ..Default::default()
            })
            .await;

        let stats = quorum.converge().await;
        assert_eq!(stats, TickStats { created: 1, destroyed: 2 });

        let instances = plugin.instances().await;
        assert_eq!(instances.len(), 3);
        assert!(!instances.contains_key(&stray));
        assert!(!instances.contains_key(&anonymous));
    }

    #[tokio::test]
    async fn test_plan_rejects_membership_change() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (quorum, settings) = quorum(&plugin);

        let fewer = quorum_settings(&plugin, ids()[..2].to_vec(), "v1");
        let err = quorum.plan_update(&settings, &fewer).await.unwrap_err();
        assert!(matches!(err, GroupError::LogicalIdChange));

        let sized = settings_with(&plugin, Arc::new(VanillaFlavor), properties(3, "v1"));
        let err = quorum.plan_update(&settings, &sized).await.unwrap_err();
        assert!(matches!(err, GroupError::LogicalIdChange));
    }

    #[tokio::test]
    async fn test_plan_accepts_reordered_ids() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (quorum, settings) = quorum(&plugin);
        quorum.converge().await;

        let mut reordered = ids();
        reordered.reverse();
        let updated = quorum_settings(&plugin, reordered, "v2");

        let plan = quorum.plan_update(&settings, &updated).await.unwrap();
        assert_eq!(plan.explain(), "Performs a rolling update on 3 instances");
    }

    #[tokio::test]
    async fn test_same_config_rolls_nothing() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (quorum, settings) = quorum(&plugin);
        quorum.converge().await;

        let same = quorum_settings(&plugin, ids(), "v1");
        let plan = quorum.plan_update(&settings, &same).await.unwrap();
        assert_eq!(plan.explain(), "Performs a rolling update on 3 instances");

        plan.run(POLL).await.unwrap();
        assert_eq!(plugin.destroy_count(), 0);
    }
}
