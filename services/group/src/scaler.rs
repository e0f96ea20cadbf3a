//! Elastic supervisor.
//!
//! Mimics an autoscaling group: keeps the number of members equal to a
//! target size, creating or destroying the difference on every tick.
//! Surplus members are destroyed in ID order so that repeated or racing
//! ticks agree on the victims.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleet_reconcile::StopSignal;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{GroupError, GroupResult};
use crate::plan::{ScalerUpdatePlan, UpdatePlan};
use crate::rolling::RollingUpdate;
use crate::scaled::Scaled;
use crate::settings::{desired_and_undesired, GroupSettings};
use crate::supervisor::TickStats;

/// Supervisor for a group sized by count.
#[derive(Debug)]
pub struct ScalingGroup {
    scaled: Arc<Scaled>,
    /// Target size; settable on its own so a plan can resize mid-update.
    size: AtomicU32,
    poll_interval: Duration,
    stop: StopSignal,
}

impl ScalingGroup {
    pub fn new(scaled: Arc<Scaled>, size: u32, poll_interval: Duration) -> Self {
        Self {
            scaled,
            size: AtomicU32::new(size),
            poll_interval,
            stop: StopSignal::new(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size.load(Ordering::SeqCst)
    }

    pub fn set_size(&self, size: u32) {
        info!(group_id = %self.scaled.group_id(), size, "Set target size");
        self.size.store(size, Ordering::SeqCst);
    }

    /// Tick until stopped. The first tick runs immediately.
    pub async fn run(&self) {
        info!(
            group_id = %self.scaled.group_id(),
            size = self.size(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting scaling group"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.stop.stopped() => {
                    info!(group_id = %self.scaled.group_id(), "Scaling group stopped");
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

    /// One reconciliation pass.
    ///
    /// Everything dispatched here finishes before this returns, so the next
    /// pass always starts from a fresh listing.
    pub async fn converge(&self) -> TickStats {
        let mut stats = TickStats::default();

        let descriptions = match self.scaled.list().await {
            Ok(descriptions) => descriptions,
            Err(e) => {
                error!(group_id = %self.scaled.group_id(), error = %e, "Failed to check size of group");
                return stats;
            }
        };

        let actual = descriptions.len();
        let desired = self.size() as usize;
        let mut tasks = JoinSet::new();

        match actual.cmp(&desired) {
            CmpOrdering::Equal => {
                debug!(group_id = %self.scaled.group_id(), size = desired, "No action needed");
            }
            CmpOrdering::Greater => {
                let remove = actual - desired;
                info!(
                    group_id = %self.scaled.group_id(),
                    remove,
                    desired,
                    "Removing instances from group"
                );

                let mut sorted = descriptions;
                sorted.sort_by(|a, b| a.id.cmp(&b.id));

                for victim in sorted.into_iter().take(remove) {
                    let scaled = Arc::clone(&self.scaled);
                    tasks.spawn(async move { scaled.destroy(&victim.id).await });
                }
                stats.destroyed = remove;
            }
            CmpOrdering::Less => {
                let add = desired - actual;
                info!(
                    group_id = %self.scaled.group_id(),
                    add,
                    desired,
                    "Adding instances to group"
                );

                for _ in 0..add {
                    let scaled = Arc::clone(&self.scaled);
                    tasks.spawn(async move { scaled.create_one(None).await });
                }
                stats.created = add;
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(group_id = %self.scaled.group_id(), error = %e, "Instance task failed");
            }
        }

        stats
    }

    /// Plan a change from `current` to `updated`.
    pub async fn plan_update(
        self: &Arc<Self>,
        current: &GroupSettings,
        updated: &Arc<GroupSettings>,
    ) -> GroupResult<UpdatePlan> {
        if !updated.allocation().logical_ids.is_empty() {
            return Err(GroupError::AllocationChange);
        }

        // The live target, not `current`: a halted grow leaves the installed
        // settings ahead of the size actually being maintained.
        let original_size = self.size();
        let new_size = updated.allocation().size;
        let size_change = i64::from(new_size) - i64::from(original_size);

        let instances = self.scaled.list().await?;
        let (desired, undesired) = desired_and_undesired(instances, updated);

        let desc = match size_change.cmp(&0) {
            CmpOrdering::Equal => {
                let roll_count = undesired.len();
                if roll_count == 0 {
                    if current.instance_hash() == updated.instance_hash() {
                        return Ok(UpdatePlan::Noop);
                    }

                    // Usually a group with no members yet: only the
                    // configuration used for future members changes.
                    return Ok(UpdatePlan::Scaler(ScalerUpdatePlan {
                        desc: "Adjusts the instance configuration, no restarts necessary"
                            .to_string(),
                        original_size,
                        new_size,
                        rolling: None,
                        scaler: Arc::clone(self),
                    }));
                }

                format!("Performs a rolling update on {roll_count} instances")
            }
            CmpOrdering::Less => {
                let terminated = -size_change;
                let roll_count = (new_size as usize).saturating_sub(desired.len());
                if roll_count == 0 {
                    format!(
                        "Terminates {terminated} instances to reduce the group size to {new_size}"
                    )
                } else {
                    format!(
                        "Terminates {terminated} instances to reduce the group size to {new_size}, \
                         then performs a rolling update on {roll_count} instances"
                    )
                }
            }
            CmpOrdering::Greater => {
                let roll_count = undesired.len();
                if roll_count == 0 {
                    format!("Adds {size_change} instances to increase the group size to {new_size}")
                } else {
                    format!(
                        "Performs a rolling update on {roll_count} instances, \
                         then adds {size_change} instances to increase the group size to {new_size}"
                    )
                }
            }
        };

        let rolling = RollingUpdate::new(
            desc.clone(),
            Arc::clone(&self.scaled),
            Arc::clone(updated),
            new_size as usize,
        );

        Ok(UpdatePlan::Scaler(ScalerUpdatePlan {
            desc,
            original_size,
            new_size,
            rolling: Some(rolling),
            scaler: Arc::clone(self),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdateError;
    use crate::scaled::tests::{properties, settings_with};
    use fleet_id::GroupId;
    use fleet_spi::{MemoryInstancePlugin, VanillaFlavor};

    const POLL: Duration = Duration::from_millis(1);

    async fn group(
        plugin: &Arc<MemoryInstancePlugin>,
        members: usize,
        size: u32,
    ) -> (Arc<ScalingGroup>, Arc<GroupSettings>) {
        let settings = settings_with(plugin, Arc::new(VanillaFlavor), properties(size, "v1"));
        let scaled = Arc::new(Scaled::new(GroupId::new("workers"), Arc::clone(&settings)));
        for _ in 0..members {
            scaled.create_one(None).await;
        }
        (Arc::new(ScalingGroup::new(scaled, size, POLL)), settings)
    }

    #[tokio::test]
    async fn test_converge_creates_deficit() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, _) = group(&plugin, 1, 4).await;

        let stats = scaler.converge().await;
        assert_eq!(stats, TickStats { created: 3, destroyed: 0 });
        assert_eq!(plugin.instances().await.len(), 4);

        // Already at size: nothing more to do.
        assert_eq!(scaler.converge().await, TickStats::default());
    }

    #[tokio::test]
    async fn test_converge_destroys_lowest_ids() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, _) = group(&plugin, 4, 4).await;
        let ids: Vec<_> = plugin.instances().await.into_keys().collect();

        scaler.set_size(1);
        let stats = scaler.converge().await;
        assert_eq!(stats.destroyed, 3);

        let remaining: Vec<_> = plugin.instances().await.into_keys().collect();
        assert_eq!(remaining, vec![ids[3].clone()]);
    }

    #[tokio::test]
    async fn test_converge_tolerates_provision_failures() {
        let plugin = Arc::new(MemoryInstancePlugin::failing());
        let (scaler, _) = group(&plugin, 0, 2).await;

        // Provisioning fails; the tick still completes and reports what it
        // dispatched.
        let stats = scaler.converge().await;
        assert_eq!(stats.created, 2);
        assert!(plugin.instances().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, _) = group(&plugin, 0, 2).await;

        let running = tokio::spawn({
            let scaler = Arc::clone(&scaler);
            async move { scaler.run().await }
        });

        while plugin.instances().await.len() < 2 {
            tokio::time::sleep(POLL).await;
        }
        scaler.stop();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("loop should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_plan_noop() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, settings) = group(&plugin, 3, 3).await;
        let same = settings_with(&plugin, Arc::new(VanillaFlavor), properties(3, "v1"));

        let plan = scaler.plan_update(&settings, &same).await.unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.explain(), "Noop");
    }

    #[tokio::test]
    async fn test_plan_adjusts_configuration_of_empty_group() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, settings) = group(&plugin, 0, 3).await;
        let updated = settings_with(&plugin, Arc::new(VanillaFlavor), properties(3, "v2"));

        let plan = scaler.plan_update(&settings, &updated).await.unwrap();
        assert_eq!(
            plan.explain(),
            "Adjusts the instance configuration, no restarts necessary"
        );
        plan.run(POLL).await.unwrap();
        assert_eq!(plugin.destroy_count(), 0);
    }

    #[tokio::test]
    async fn test_plan_shrink_with_residual_roll() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, settings) = group(&plugin, 3, 3).await;
        let updated = settings_with(&plugin, Arc::new(VanillaFlavor), properties(2, "v2"));

        let plan = scaler.plan_update(&settings, &updated).await.unwrap();
        assert_eq!(
            plan.explain(),
            "Terminates 1 instances to reduce the group size to 2, \
             then performs a rolling update on 2 instances"
        );
    }

    #[tokio::test]
    async fn test_plan_grow_with_roll() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, settings) = group(&plugin, 3, 3).await;
        let updated = settings_with(&plugin, Arc::new(VanillaFlavor), properties(8, "v2"));

        let plan = scaler.plan_update(&settings, &updated).await.unwrap();
        assert_eq!(
            plan.explain(),
            "Performs a rolling update on 3 instances, \
             then adds 5 instances to increase the group size to 8"
        );
    }

    #[tokio::test]
    async fn test_shrink_lowers_size_before_rolling() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, settings) = group(&plugin, 3, 3).await;
        let updated = settings_with(&plugin, Arc::new(VanillaFlavor), properties(1, "v1"));

        let plan = scaler.plan_update(&settings, &updated).await.unwrap();
        assert_eq!(
            plan.explain(),
            "Terminates 2 instances to reduce the group size to 1"
        );
        plan.run(POLL).await.unwrap();
        assert_eq!(scaler.size(), 1);
    }

    #[tokio::test]
    async fn test_halted_grow_keeps_old_size() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, settings) = group(&plugin, 3, 3).await;
        let updated = settings_with(&plugin, Arc::new(VanillaFlavor), properties(8, "v2"));

        let plan = scaler.plan_update(&settings, &updated).await.unwrap();
        plan.stop();
        assert!(matches!(plan.run(POLL).await, Err(UpdateError::Halted)));
        assert_eq!(scaler.size(), 3);
    }

    #[tokio::test]
    async fn test_replan_after_halted_grow_still_grows() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, settings) = group(&plugin, 3, 3).await;
        let updated = settings_with(&plugin, Arc::new(VanillaFlavor), properties(8, "v2"));

        let plan = scaler.plan_update(&settings, &updated).await.unwrap();
        plan.stop();
        assert!(plan.run(POLL).await.is_err());

        // The registry has already installed `updated` as the current settings.
        let retry = scaler.plan_update(&updated, &updated).await.unwrap();
        assert_eq!(
            retry.explain(),
            "Performs a rolling update on 3 instances, \
             then adds 5 instances to increase the group size to 8"
        );
    }

    #[tokio::test]
    async fn test_plan_rejects_switch_to_logical_ids() {
        let plugin = Arc::new(MemoryInstancePlugin::new());
        let (scaler, settings) = group(&plugin, 0, 3).await;
        let mut config = properties(0, "v1");
        config.allocation = fleet_spi::AllocationMethod::with_logical_ids(vec!["a".into()]);
        let updated = settings_with(&plugin, Arc::new(VanillaFlavor), config);

        let err = scaler.plan_update(&settings, &updated).await.unwrap_err();
        assert!(matches!(err, GroupError::AllocationChange));
    }
}
