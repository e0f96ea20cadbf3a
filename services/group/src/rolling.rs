//! Rolling update state machine.
//!
//! Replaces members whose config hash differs from the target, one at a
//! time. Each destroy is gated on the expected number of new-config members
//! reporting healthy. The update never creates members itself; the owning
//! supervisor backfills capacity on its next tick.
//!
//! Health policy while waiting:
//! - any new-config member reporting unhealthy fails the update at once
//! - unknown health keeps the update waiting indefinitely; an operator has
//!   to stop it
//! - members with the old config are never health checked, so an update can
//!   repair a group whose current members are unhealthy

use std::sync::Arc;
use std::time::Duration;

use fleet_reconcile::StopSignal;
use fleet_spi::Health;
use tracing::{debug, info, warn};

use crate::error::UpdateError;
use crate::scaled::Scaled;
use crate::settings::{desired_and_undesired, GroupSettings};

/// A cancellable rolling update towards `updating_to`.
#[derive(Debug)]
pub struct RollingUpdate {
    desc: String,
    scaled: Arc<Scaled>,
    updating_to: Arc<GroupSettings>,
    /// Number of members the group is meant to have once the update is done.
    target_size: usize,
    stop: StopSignal,
}

impl RollingUpdate {
    pub fn new(
        desc: impl Into<String>,
        scaled: Arc<Scaled>,
        updating_to: Arc<GroupSettings>,
        target_size: usize,
    ) -> Self {
        Self {
            desc: desc.into(),
            scaled,
            updating_to,
            target_size,
            stop: StopSignal::new(),
        }
    }

    pub fn explain(&self) -> &str {
        &self.desc
    }

    /// Halt the update. The running `run` call returns `UpdateError::Halted`.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Drive the group until no member has an outdated config.
    pub async fn run(&self, poll_interval: Duration) -> Result<(), UpdateError> {
        let instances = self.scaled.list().await?;
        let (desired, _) = desired_and_undesired(instances, &self.updating_to);
        let mut expected_new_instances = desired.len();

        loop {
            self.wait_until_quiesced(
                poll_interval,
                expected_new_instances.min(self.target_size),
            )
            .await?;
            debug!(group_id = %self.scaled.group_id(), "Group has quiesced");

            let instances = match self.scaled.list().await {
                Ok(instances) => instances,
                Err(e) => {
                    warn!(group_id = %self.scaled.group_id(), error = %e, "Failed to list members, retrying");
                    continue;
                }
            };

            let (_, mut undesired) = desired_and_undesired(instances, &self.updating_to);
            if undesired.is_empty() {
                break;
            }

            info!(
                group_id = %self.scaled.group_id(),
                undesired = undesired.len(),
                "Found undesired instances"
            );

            // Deterministic victim order keeps repeated runs from picking
            // different members.
            undesired.sort_by(|a, b| a.id.cmp(&b.id));
            self.scaled.destroy(&undesired[0].id).await;

            expected_new_instances += 1;
        }

        info!(group_id = %self.scaled.group_id(), "Rolling update complete");
        Ok(())
    }

    /// Block until `expected` new-config members report healthy.
    async fn wait_until_quiesced(
        &self,
        poll_interval: Duration,
        expected: usize,
    ) -> Result<(), UpdateError> {
        let mut ticker = tokio::time::interval(poll_interval);
        // The first tick completes immediately; wait a full interval before
        // the first check so the supervisor gets a chance to backfill.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = self.stop.stopped() => {
                    info!(group_id = %self.scaled.group_id(), "Update halted by user");
                    return Err(UpdateError::Halted);
                }

                _ = ticker.tick() => {
                    let instances = match self.scaled.list().await {
                        Ok(instances) => instances,
                        Err(e) => {
                            warn!(group_id = %self.scaled.group_id(), error = %e, "Failed to list members, retrying");
                            continue;
                        }
                    };

                    let (matching, _) = desired_and_undesired(instances, &self.updating_to);

                    let mut healthy = 0;
                    for instance in &matching {
                        match self.scaled.health(instance).await {
                            Health::Healthy => healthy += 1,
                            Health::Unhealthy => {
                                warn!(
                                    group_id = %self.scaled.group_id(),
                                    instance_id = %instance.id,
                                    "Instance with new configuration is unhealthy"
                                );
                                return Err(UpdateError::Unhealthy(instance.id.clone()));
                            }
                            Health::Unknown => {}
                        }
                    }

                    if healthy >= expected {
                        return Ok(());
                    }

                    debug!(
                        group_id = %self.scaled.group_id(),
                        healthy,
                        expected,
                        "Waiting for group to quiesce"
                    );
                }
            }
        }
    }
}
