//! Supervisor dispatch.

use std::sync::Arc;
use std::time::Duration;

use fleet_spi::Allocation;

use crate::error::GroupResult;
use crate::plan::UpdatePlan;
use crate::quorum::Quorum;
use crate::scaled::Scaled;
use crate::scaler::ScalingGroup;
use crate::settings::GroupSettings;

/// What a single reconciliation pass dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub created: usize,
    pub destroyed: usize,
}

/// The background loop that keeps a group at its declared shape.
///
/// Chosen once at watch time from the allocation method and kept for the
/// lifetime of the watch.
#[derive(Debug, Clone)]
pub enum Supervisor {
    Scaling(Arc<ScalingGroup>),
    Quorum(Arc<Quorum>),
}

impl Supervisor {
    pub fn for_settings(
        scaled: Arc<Scaled>,
        settings: &GroupSettings,
        poll_interval: Duration,
    ) -> GroupResult<Self> {
        Ok(match settings.allocation().resolve()? {
            Allocation::Size(size) => {
                Supervisor::Scaling(Arc::new(ScalingGroup::new(scaled, size, poll_interval)))
            }
            Allocation::LogicalIds(ids) => {
                Supervisor::Quorum(Arc::new(Quorum::new(scaled, ids.to_vec(), poll_interval)))
            }
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Supervisor::Scaling(_) => "scaling",
            Supervisor::Quorum(_) => "quorum",
        }
    }

    pub async fn run(&self) {
        match self {
            Supervisor::Scaling(scaler) => scaler.run().await,
            Supervisor::Quorum(quorum) => quorum.run().await,
        }
    }

    pub fn stop(&self) {
        match self {
            Supervisor::Scaling(scaler) => scaler.stop(),
            Supervisor::Quorum(quorum) => quorum.stop(),
        }
    }

    pub async fn plan_update(
        &self,
        current: &GroupSettings,
        updated: &Arc<GroupSettings>,
    ) -> GroupResult<UpdatePlan> {
        match self {
            Supervisor::Scaling(scaler) => scaler.plan_update(current, updated).await,
            Supervisor::Quorum(quorum) => quorum.plan_update(current, updated).await,
        }
    }
}
