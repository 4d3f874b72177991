//! Leader election module.
//!
//! Only the lease holder dispatches. Becoming leader activates the
//! dispatcher and opens the readiness gate; losing the lease deactivates
//! the dispatcher and reports a fatal error to the orchestrator.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use courier_core::config::CourierConfig;
use courier_core::error::{CourierError, ElectionError, PipelineError};
use courier_core::pipeline::{HealthStatus, Pipeline};
use courier_targets::{
    ElectionConfig, ElectionState, LeaderElector, LeaderFlag, LeaseLock, ReadinessGate,
    RedisLease,
};

use super::ModuleHandle;
use super::dispatcher::Activation;

/// Resolve this replica's identity.
///
/// Order: configured pod name, `POD_NAME`, `HOSTNAME`, random id.
pub fn resolve_identity(pod_name: &str) -> String {
    if !pod_name.is_empty() {
        return pod_name.to_owned();
    }
    ["POD_NAME", "HOSTNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| format!("courier-{}", uuid::Uuid::new_v4()))
}

/// Initialize the leader election module.
///
/// Returns `None` when leader election is disabled. The lease lives in
/// Redis so every replica sees the same holder.
pub async fn init(
    config: &CourierConfig,
    activation: Activation,
    readiness: Arc<ReadinessGate>,
    fatal: mpsc::Sender<String>,
) -> anyhow::Result<Option<ModuleHandle>> {
    let election = &config.leader_election;
    if !election.enabled {
        tracing::info!("leader election disabled, dispatching unconditionally");
        return Ok(None);
    }

    let identity = resolve_identity(&election.pod_name);
    let lock: Arc<dyn LeaseLock> = Arc::new(
        RedisLease::connect(&config.redis, &election.namespace, &election.lock_name).await?,
    );
    tracing::info!(
        identity = %identity,
        lock = %election.lock_name,
        namespace = %election.namespace,
        "leader election configured"
    );

    let flag = LeaderFlag::default();
    let elector = LeaderElector::new(ElectionConfig::from_config(election, identity), lock)
        .on_started_leading({
            let activation = activation.clone();
            move |leading: CancellationToken| {
                activation.activate();
                readiness.ready();
                let activation = activation.clone();
                tokio::spawn(async move {
                    leading.cancelled().await;
                    activation.deactivate();
                });
            }
        })
        .on_stopped_leading(|| tracing::warn!("stopped leading, dispatcher paused"))
        .on_new_leader({
            let flag = flag.clone();
            move |leader: &str, own: &str| {
                flag.observe(leader, own);
                tracing::info!(leader, identity = own, is_leader = flag.is_leader(), "leader observed");
            }
        });

    let module = LeaderModule {
        elector: Arc::new(elector),
        fatal,
        cancel: None,
        task: None,
    };
    Ok(Some(ModuleHandle::new("leader-election", true, Box::new(module))))
}

pub struct LeaderModule {
    elector: Arc<LeaderElector>,
    fatal: mpsc::Sender<String>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Pipeline for LeaderModule {
    async fn start(&mut self) -> Result<(), CourierError> {
        if self.cancel.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let cancel = CancellationToken::new();
        let elector = self.elector.clone();
        let fatal = self.fatal.clone();
        let token = cancel.clone();
        self.task = Some(tokio::spawn(async move {
            match elector.run(token).await {
                ElectionError::Stopped { lock } => {
                    tracing::debug!(lock = %lock, "leader election stopped");
                }
                e => {
                    tracing::error!(error = %e, "leader election loop exited");
                    let _ = fatal.send(e.to_string()).await;
                }
            }
        }));
        self.cancel = Some(cancel);
        tracing::info!(identity = self.elector.identity(), "leader election running");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CourierError> {
        let Some(cancel) = self.cancel.take() else {
            return Err(PipelineError::NotRunning.into());
        };
        cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "leader election task panicked");
        }
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.cancel.is_none() {
            return HealthStatus::Unhealthy("not running".to_owned());
        }
        match self.elector.state() {
            ElectionState::Leading | ElectionState::Standby => HealthStatus::Healthy,
            ElectionState::Stopped => HealthStatus::Unhealthy("election stopped".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn configured_pod_name_wins() {
        assert_eq!(resolve_identity("pod-a"), "pod-a");
    }

    #[test]
    #[serial]
    fn falls_back_to_environment_then_random() {
        // SAFETY: Test isolation - serialized and cleaned up below
        unsafe {
            std::env::set_var("POD_NAME", "pod-env");
        }
        assert_eq!(resolve_identity(""), "pod-env");

        unsafe {
            std::env::remove_var("POD_NAME");
            std::env::remove_var("HOSTNAME");
        }
        let random = resolve_identity("");
        assert!(random.starts_with("courier-"));
        assert_ne!(random, resolve_identity(""));
    }

    #[tokio::test]
    async fn disabled_election_registers_nothing() {
        let config = CourierConfig::default();
        let (fatal, _rx) = mpsc::channel(1);
        let handle = init(
            &config,
            Activation::new(true),
            Arc::new(ReadinessGate::new(false, false)),
            fatal,
        )
        .await
        .unwrap();
        assert!(handle.is_none());
    }
}
