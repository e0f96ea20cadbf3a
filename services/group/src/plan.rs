//! Update plans.
//!
//! A plan is computed fresh for every describe/update call and never
//! persisted. The set of plans is closed: supervisors only ever produce a
//! no-op, a pure rolling update, or a resize combined with a rolling update.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::UpdateError;
use crate::rolling::RollingUpdate;
use crate::scaler::ScalingGroup;

/// Description of a no-op plan.
pub const NOOP: &str = "Noop";

/// A computed change to a group.
#[derive(Debug)]
pub enum UpdatePlan {
    /// Nothing to do.
    Noop,
    /// Replace outdated members of a fixed-size group.
    Rolling(RollingUpdate),
    /// Resize an elastic group and roll outdated members.
    Scaler(ScalerUpdatePlan),
}

impl UpdatePlan {
    /// Human-readable summary of what `run` will do.
    pub fn explain(&self) -> &str {
        match self {
            UpdatePlan::Noop => NOOP,
            UpdatePlan::Rolling(rolling) => rolling.explain(),
            UpdatePlan::Scaler(plan) => &plan.desc,
        }
    }

    /// Execute the plan.
    pub async fn run(&self, poll_interval: Duration) -> Result<(), UpdateError> {
        match self {
            UpdatePlan::Noop => Ok(()),
            UpdatePlan::Rolling(rolling) => rolling.run(poll_interval).await,
            UpdatePlan::Scaler(plan) => plan.run(poll_interval).await,
        }
    }

    /// Halt a running plan.
    pub fn stop(&self) {
        match self {
            UpdatePlan::Noop => {}
            UpdatePlan::Rolling(rolling) => rolling.stop(),
            UpdatePlan::Scaler(plan) => plan.stop(),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, UpdatePlan::Noop)
    }
}

/// Resize plus rolling update for an elastic group.
///
/// Shrinking happens before the roll so capacity that is about to be
/// removed is not replaced first; growing happens after the roll so new
/// capacity is created with the new configuration.
#[derive(Debug)]
pub struct ScalerUpdatePlan {
    pub(crate) desc: String,
    pub(crate) original_size: u32,
    pub(crate) new_size: u32,
    /// Absent when only the configuration changes and nothing needs rolling.
    pub(crate) rolling: Option<RollingUpdate>,
    pub(crate) scaler: Arc<ScalingGroup>,
}

impl ScalerUpdatePlan {
    pub async fn run(&self, poll_interval: Duration) -> Result<(), UpdateError> {
        if self.new_size < self.original_size {
            self.scaler.set_size(self.new_size);
        }

        if let Some(rolling) = &self.rolling {
            rolling.run(poll_interval).await?;
        }

        if self.new_size > self.original_size {
            self.scaler.set_size(self.new_size);
        }

        info!(
            original_size = self.original_size,
            new_size = self.new_size,
            "Scaler update plan finished"
        );
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(rolling) = &self.rolling {
            rolling.stop();
        }
    }
}
