//! Group registry.
//!
//! The process-wide table of watched groups. Each entry owns one supervisor
//! loop task and at most one in-flight update plan.
//!
//! Locking:
//! - `groups` guards the table and the plan install step. It is never held
//!   across a plugin call.
//! - each context's `state` guards its settings and current plan.
//!
//! The table starts empty and lives as long as the process; `shutdown`
//! cancels every loop and update and joins the loop tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fleet_id::{GroupId, InstanceId};
use fleet_spi::{GroupSpec, InstanceDescription, PluginLookup};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::error::{GroupError, GroupResult};
use crate::plan::UpdatePlan;
use crate::scaled::Scaled;
use crate::settings::{validate, GroupSettings};
use crate::supervisor::Supervisor;

/// Mutable part of a watched group.
struct ContextState {
    settings: Arc<GroupSettings>,
    update: Option<Arc<UpdatePlan>>,
    /// Bumped on every settings swap so a stale plan is never installed.
    generation: u64,
}

struct GroupContext {
    id: GroupId,
    supervisor: Supervisor,
    scaled: Arc<Scaled>,
    state: Mutex<ContextState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GroupContext {
    /// Stop the in-flight update and the supervisor loop, then wait for the
    /// loop task to exit.
    async fn halt(&self) {
        if let Some(plan) = self.state.lock().await.update.take() {
            plan.stop();
        }
        self.supervisor.stop();

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(group_id = %self.id, error = %e, "Supervisor task failed");
            }
        }
    }
}

/// Controller for all watched groups.
pub struct GroupPlugin {
    plugins: Arc<dyn PluginLookup>,
    poll_interval: Duration,
    groups: Mutex<HashMap<GroupId, Arc<GroupContext>>>,
}

impl GroupPlugin {
    pub fn new(plugins: Arc<dyn PluginLookup>, poll_interval: Duration) -> Self {
        Self {
            plugins,
            poll_interval,
            groups: Mutex::new(HashMap::new()),
        }
    }

    async fn context(&self, id: &GroupId) -> GroupResult<Arc<GroupContext>> {
        self.groups
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GroupError::NotWatched(id.clone()))
    }

    /// Start managing a group.
    #[instrument(skip_all, fields(group_id = %spec.id))]
    pub async fn watch_group(&self, spec: GroupSpec) -> GroupResult<()> {
        let settings = Arc::new(validate(&spec, self.plugins.as_ref()).await?);
        let scaled = Arc::new(Scaled::new(spec.id.clone(), Arc::clone(&settings)));
        let supervisor =
            Supervisor::for_settings(Arc::clone(&scaled), &settings, self.poll_interval)?;

        let mut groups = self.groups.lock().await;
        if groups.contains_key(&spec.id) {
            return Err(GroupError::AlreadyWatching(spec.id));
        }

        let task = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run().await }
        });

        info!(supervisor = supervisor.kind(), "Watching group");

        groups.insert(
            spec.id.clone(),
            Arc::new(GroupContext {
                id: spec.id,
                supervisor,
                scaled,
                state: Mutex::new(ContextState {
                    settings,
                    update: None,
                    generation: 0,
                }),
                task: Mutex::new(Some(task)),
            }),
        );
        Ok(())
    }

    /// Stop managing a group. Members are left running and tagged, so
    /// watching the same spec again resumes management of them.
    #[instrument(skip(self))]
    pub async fn unwatch_group(&self, id: &GroupId) -> GroupResult<()> {
        let context = self
            .groups
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| GroupError::NotWatched(id.clone()))?;

        context.halt().await;
        info!("Stopped watching group");
        Ok(())
    }

    /// Current members of a group.
    #[instrument(skip(self))]
    pub async fn inspect_group(&self, id: &GroupId) -> GroupResult<Vec<InstanceDescription>> {
        let context = self.context(id).await?;
        Ok(context.scaled.list().await?)
    }

    /// Explain what updating to `spec` would do, without doing it.
    #[instrument(skip_all, fields(group_id = %spec.id))]
    pub async fn describe_update(&self, spec: GroupSpec) -> GroupResult<String> {
        let updated = Arc::new(validate(&spec, self.plugins.as_ref()).await?);
        let context = self.context(&spec.id).await?;
        let current = Arc::clone(&context.state.lock().await.settings);

        let plan = context.supervisor.plan_update(&current, &updated).await?;
        Ok(plan.explain().to_string())
    }

    /// Update a group to `spec`, blocking until the update finishes, fails
    /// or is stopped.
    #[instrument(skip_all, fields(group_id = %spec.id))]
    pub async fn update_group(&self, spec: GroupSpec) -> GroupResult<()> {
        let updated = Arc::new(validate(&spec, self.plugins.as_ref()).await?);
        let context = self.context(&spec.id).await?;

        let (current, generation) = {
            let state = context.state.lock().await;
            if state.update.is_some() {
                return Err(GroupError::UpdateInProgress);
            }
            (Arc::clone(&state.settings), state.generation)
        };

        let plan = Arc::new(context.supervisor.plan_update(&current, &updated).await?);

        {
            let groups = self.groups.lock().await;
            match groups.get(&spec.id) {
                Some(registered) if Arc::ptr_eq(registered, &context) => {}
                _ => return Err(GroupError::NotWatched(spec.id)),
            }

            let mut state = context.state.lock().await;
            if state.update.is_some() {
                return Err(GroupError::UpdateInProgress);
            }
            if state.generation != generation {
                return Err(GroupError::SettingsChanged);
            }

            state.settings = Arc::clone(&updated);
            state.generation += 1;
            state.update = Some(Arc::clone(&plan));
            context.scaled.change_settings(updated).await;
        }

        info!(plan = plan.explain(), "Executing update plan");
        let result = plan.run(self.poll_interval).await;

        {
            let mut state = context.state.lock().await;
            if state
                .update
                .as_ref()
                .is_some_and(|installed| Arc::ptr_eq(installed, &plan))
            {
                state.update = None;
            }
        }

        match &result {
            Ok(()) => info!("Update complete"),
            Err(e) => warn!(error = %e, "Update did not complete"),
        }
        Ok(result?)
    }

    /// Halt the in-flight update of a group.
    #[instrument(skip(self))]
    pub async fn stop_update(&self, id: &GroupId) -> GroupResult<()> {
        let context = self.context(id).await?;
        let plan = context
            .state
            .lock()
            .await
            .update
            .take()
            .ok_or_else(|| GroupError::NotUpdating(id.clone()))?;

        plan.stop();
        info!("Stopping update");
        Ok(())
    }

    /// Stop managing a group and destroy all of its members.
    ///
    /// The group is unwatched even if some destroys fail; the survivors keep
    /// their membership tags and are reported in the error.
    #[instrument(skip(self))]
    pub async fn destroy_group(&self, id: &GroupId) -> GroupResult<()> {
        let context = self
            .groups
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| GroupError::NotWatched(id.clone()))?;

        context.halt().await;

        let members = context.scaled.list().await?;
        info!(members = members.len(), "Destroying group");

        let mut failed: Vec<InstanceId> = Vec::new();
        for member in members {
            if let Err(e) = context.scaled.try_destroy(&member.id).await {
                warn!(instance_id = %member.id, error = %e, "Failed to destroy member");
                failed.push(member.id);
            }
        }

        if !failed.is_empty() {
            return Err(GroupError::DestroyIncomplete {
                group: id.clone(),
                failed,
            });
        }
        Ok(())
    }

    /// Cancel every update and supervisor loop and wait for the loops to
    /// exit. Members are left in place.
    pub async fn shutdown(&self) {
        let contexts: Vec<_> = self.groups.lock().await.drain().map(|(_, c)| c).collect();
        info!(groups = contexts.len(), "Shutting down group controller");

        for context in contexts {
            context.halt().await;
        }
    }
}

impl std::fmt::Debug for GroupPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupPlugin")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_spi::{
        InstancePlugin, InstanceSpec, MemoryInstancePlugin, PluginResult, StaticPlugins, Tags,
        VanillaFlavor,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Holds the next armed listing until released.
    #[derive(Default)]
    struct GatedPlugin {
        inner: MemoryInstancePlugin,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl InstancePlugin for GatedPlugin {
        async fn validate(&self, properties: &serde_json::Value) -> PluginResult<()> {
            self.inner.validate(properties).await
        }

        async fn provision(&self, spec: InstanceSpec) -> PluginResult<InstanceId> {
            self.inner.provision(spec).await
        }

        async fn destroy(&self, id: &InstanceId) -> PluginResult<()> {
            self.inner.destroy(id).await
        }

        async fn describe_instances(&self, tags: &Tags) -> PluginResult<Vec<InstanceDescription>> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.describe_instances(tags).await
        }
    }

    fn registry() -> (GroupPlugin, Arc<MemoryInstancePlugin>) {
        let memory = Arc::new(MemoryInstancePlugin::new());
        let plugins = StaticPlugins::new()
            .with_instance("memory", memory.clone())
            .with_flavor("vanilla", Arc::new(VanillaFlavor));
        (
            GroupPlugin::new(Arc::new(plugins), Duration::from_millis(1)),
            memory,
        )
    }

    fn workers(size: u32, init: &str) -> GroupSpec {
        GroupSpec::new(
            "workers",
            json!({
                "Allocation": {"Size": size},
                "Instance": {"Plugin": "memory", "Properties": {}},
                "Flavor": {"Plugin": "vanilla", "Properties": {"Init": init}}
            }),
        )
    }

    #[tokio::test]
    async fn test_unknown_group_operations_fail() {
        let (registry, _) = registry();
        let id = GroupId::new("missing");

        assert!(matches!(registry.unwatch_group(&id).await, Err(GroupError::NotWatched(_))));
        assert!(matches!(registry.inspect_group(&id).await, Err(GroupError::NotWatched(_))));
        assert!(matches!(registry.stop_update(&id).await, Err(GroupError::NotWatched(_))));
        assert!(matches!(registry.destroy_group(&id).await, Err(GroupError::NotWatched(_))));
    }

    #[tokio::test]
    async fn test_stop_update_without_update() {
        let (registry, _) = registry();
        registry.watch_group(workers(1, "v1")).await.unwrap();

        let err = registry.stop_update(&GroupId::new("workers")).await.unwrap_err();
        assert!(matches!(err, GroupError::NotUpdating(_)));
        assert!(err.is_state());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_joins_loops() {
        let (registry, memory) = registry();
        registry.watch_group(workers(2, "v1")).await.unwrap();

        while memory.instances().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        registry.shutdown().await;

        // Nothing backfills once shutdown returns.
        let victim = memory.instances().await.into_keys().next().unwrap();
        memory.destroy(&victim).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(memory.instances().await.len(), 1);

        let err = registry.inspect_group(&GroupId::new("workers")).await.unwrap_err();
        assert!(matches!(err, GroupError::NotWatched(_)));
    }

    #[tokio::test]
    async fn test_destroy_ignores_foreign_instances() {
        let (registry, memory) = registry();
        let foreign = memory.seed(fleet_spi::InstanceSpec::default()).await;

        registry.watch_group(workers(2, "v1")).await.unwrap();
        while memory.instances().await.len() < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        registry.destroy_group(&GroupId::new("workers")).await.unwrap();

        let remaining: Vec<_> = memory.instances().await.into_keys().collect();
        assert_eq!(remaining, vec![foreign]);
    }

    #[tokio::test]
    async fn test_stale_plan_is_not_installed() {
        let gated = Arc::new(GatedPlugin::default());
        let plugins = StaticPlugins::new()
            .with_instance("memory", gated.clone())
            .with_flavor("vanilla", Arc::new(VanillaFlavor));
        // Long interval: after the first tick only planning lists members.
        let registry = Arc::new(GroupPlugin::new(Arc::new(plugins), Duration::from_secs(3600)));

        registry.watch_group(workers(2, "v1")).await.unwrap();
        while gated.inner.instances().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        gated.armed.store(true, Ordering::SeqCst);
        let stale = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.update_group(workers(3, "v2")).await }
        });
        gated.entered.notified().await;

        // Installs new settings while the first update is still planning.
        registry.update_group(workers(2, "v1")).await.unwrap();
        gated.release.notify_one();

        let err = stale.await.unwrap().unwrap_err();
        assert!(matches!(err, GroupError::SettingsChanged));
        assert!(err.is_state());

        registry.shutdown().await;
    }
}
