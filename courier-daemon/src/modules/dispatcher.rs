//! Delivery module.
//!
//! Consumes reports from the ingest channel and fans each result out to
//! the single-send targets, then the whole report to the batch targets.
//! While this replica is on standby, incoming reports are dropped.
//!
//! ```text
//! watch loop --Arc<Report>--> DispatchModule --> Dispatcher --> Client tasks
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use courier_core::error::{CourierError, PipelineError};
use courier_core::pipeline::{HealthStatus, Pipeline};
use courier_core::types::Report;
use courier_targets::Dispatcher;

use super::ModuleHandle;

/// Whether this replica currently dispatches.
#[derive(Debug, Clone)]
pub struct Activation(Arc<AtomicBool>);

impl Activation {
    pub fn new(active: bool) -> Self {
        Self(Arc::new(AtomicBool::new(active)))
    }

    pub fn activate(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn deactivate(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Initialize the delivery module.
pub fn init(
    dispatcher: Dispatcher,
    reports: mpsc::Receiver<Arc<Report>>,
    activation: Activation,
) -> ModuleHandle {
    let module = DispatchModule {
        dispatcher,
        reports: Some(reports),
        activation,
        cancel: None,
        task: None,
    };
    ModuleHandle::new("dispatcher", true, Box::new(module))
}

pub struct DispatchModule {
    dispatcher: Dispatcher,
    reports: Option<mpsc::Receiver<Arc<Report>>>,
    activation: Activation,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<mpsc::Receiver<Arc<Report>>>>,
}

impl Pipeline for DispatchModule {
    async fn start(&mut self) -> Result<(), CourierError> {
        if self.cancel.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let reports = self
            .reports
            .take()
            .ok_or_else(|| PipelineError::InitFailed("report channel already consumed".to_owned()))?;

        let cancel = CancellationToken::new();
        self.task = Some(tokio::spawn(dispatch_loop(
            self.dispatcher.clone(),
            reports,
            self.activation.clone(),
            cancel.clone(),
        )));
        self.cancel = Some(cancel);
        tracing::info!(active = self.activation.is_active(), "dispatcher running");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CourierError> {
        let Some(cancel) = self.cancel.take() else {
            return Err(PipelineError::NotRunning.into());
        };
        cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                // keep the receiver so the module can be started again
                Ok(reports) => self.reports = Some(reports),
                Err(e) => tracing::warn!(error = %e, "dispatch loop panicked"),
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match &self.task {
            None => HealthStatus::Unhealthy("not running".to_owned()),
            Some(task) if task.is_finished() => {
                HealthStatus::Unhealthy("report channel closed".to_owned())
            }
            Some(_) => HealthStatus::Healthy,
        }
    }
}

async fn dispatch_loop(
    dispatcher: Dispatcher,
    mut reports: mpsc::Receiver<Arc<Report>>,
    activation: Activation,
    cancel: CancellationToken,
) -> mpsc::Receiver<Arc<Report>> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("dispatch loop shutting down");
                break;
            }
            report = reports.recv() => {
                let Some(report) = report else {
                    tracing::info!("report channel closed, dispatch loop exiting");
                    break;
                };
                if !activation.is_active() {
                    tracing::debug!(report = %report.name, "standby replica, report dropped");
                    continue;
                }
                deliver(&dispatcher, report).await;
            }
        }
    }
    reports
}

/// Fan out one report. Delivery tasks are not awaited.
async fn deliver(dispatcher: &Dispatcher, report: Arc<Report>) {
    tracing::debug!(
        report = %report.name,
        namespace = %report.namespace,
        results = report.results.len(),
        "dispatching report"
    );
    for result in &report.results {
        let _ = dispatcher.dispatch_result(report.clone(), result).await;
    }
    let _ = dispatcher.dispatch_report(report);
}
