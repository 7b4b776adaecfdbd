use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::HandlerError;
use crate::model::{Job, POLL_INTERVAL};
use crate::store::{JobStore, LeaseWrite, RetryOutcome};

/// A handler pinned to a payload shape, external to this engine. A real
/// deployment pins one handler per payload shape (§4.4 "Processing").
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &Value) -> Result<(), HandlerError>;
}

/// C4 Worker Runtime: the lease/process/ack loop of §4.4.
///
/// One instance is one long-running agent with a stable `worker_id`
/// assigned at construction. Any number of instances may run in the same
/// process or across processes; they coordinate purely through the
/// durable store's claim primitive.
pub struct WorkerRuntime {
    store: Arc<dyn JobStore>,
    worker_id: String,
}

impl WorkerRuntime {
    pub fn new(store: Arc<dyn JobStore>, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Runs until `stop` is flipped to `true`. A job already in flight
    /// when `stop` flips is allowed to finish; the worker never preempts
    /// its own work (§4.4 "Shutdown").
    pub async fn run(&self, handler: Arc<dyn JobHandler>, mut stop: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, "worker started");
        loop {
            if *stop.borrow() {
                break;
            }

            match self.store.acquire_lease(&self.worker_id).await {
                Ok(Some(job)) => self.process_job(job, handler.as_ref()).await,
                Ok(None) => self.wait_or_stop(&mut stop).await,
                Err(err) => {
                    error!(worker_id = %self.worker_id, error = %err, "lease acquisition failed, retrying next poll tick");
                    self.wait_or_stop(&mut stop).await;
                }
            }
        }
        info!(worker_id = %self.worker_id, "worker stopped");
    }

    async fn wait_or_stop(&self, stop: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = sleep(POLL_INTERVAL) => {}
            _ = stop.changed() => {}
        }
    }

    async fn process_job(&self, job: Job, handler: &dyn JobHandler) {
        let job_id = job.id;
        let trace_id = job.trace_id;

        match handler.handle(&job.payload).await {
            Ok(()) => self.ack(job_id, trace_id).await,
            Err(err) => self.fail(job_id, trace_id, &err).await,
        }
    }

    async fn ack(&self, job_id: Uuid, trace_id: Uuid) {
        match self.store.ack_completed(job_id, &self.worker_id).await {
            Ok(LeaseWrite::Applied) => {
                info!(job_id = %job_id, trace_id = %trace_id, "job completed");
            }
            Ok(LeaseWrite::LeaseStolen) => {
                debug!(job_id = %job_id, worker_id = %self.worker_id, "lease stolen before ack could apply");
            }
            Err(err) => {
                error!(job_id = %job_id, trace_id = %trace_id, error = %err, "failed to persist completion");
            }
        }
    }

    async fn fail(&self, job_id: Uuid, trace_id: Uuid, err: &HandlerError) {
        match self
            .store
            .fail_attempt(job_id, &self.worker_id, &err.message)
            .await
        {
            Ok(RetryOutcome::Retried) => {
                warn!(job_id = %job_id, trace_id = %trace_id, error = %err, "job failed, retry scheduled");
            }
            Ok(RetryOutcome::DeadLettered(entry)) => {
                warn!(job_id = %job_id, trace_id = %trace_id, dlq_id = %entry.id, error = %err, "retries exhausted, job dead-lettered");
            }
            Ok(RetryOutcome::LeaseStolen) => {
                debug!(job_id = %job_id, worker_id = %self.worker_id, "lease stolen before failure could be recorded");
            }
            Err(store_err) => {
                error!(job_id = %job_id, trace_id = %trace_id, error = %store_err, "failed to persist job failure");
            }
        }
    }
}
