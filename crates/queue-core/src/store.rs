use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{DeadLetterEntry, Job, JobStatus, Metrics};

/// The fields a caller supplies to submit a new job; everything else
/// (`id`, `status`, `retry_count`, `created_at`) is assigned by the store
/// at insert time (§4.3 step 4).
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: String,
    pub payload: Value,
    pub idempotency_key: Option<String>,
    pub max_retries: i32,
    pub trace_id: Uuid,
}

/// Result of an ack/retry/dead-letter write that is conditioned on
/// `worker_id = self AND status = 'running'` (§5, §9 design notes). A
/// lagging worker whose lease was already stolen by a peer observes
/// `LeaseStolen` instead of mutating the newer lease holder's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseWrite {
    Applied,
    LeaseStolen,
}

/// Result of a failed-attempt write: either the job re-enters `pending`
/// with a delayed `created_at`, or its retry budget is exhausted and it is
/// dead-lettered in the same transaction (§4.4).
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    Retried,
    DeadLettered(DeadLetterEntry),
    LeaseStolen,
}

/// C1 Durable Store contract (§4.1).
///
/// Implementations must provide the atomic "select-and-claim" primitive
/// described there; `acquire_lease` is this workspace's instance of it.
/// Every method that mutates job state does so in a single transaction;
/// no method here may partially apply its effect.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Step 1 of submission: look up a job by idempotency key, if present.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError>;

    /// Count of `status = running` jobs for a tenant, used by the
    /// concurrency admission check (§4.2, §4.3 step 3).
    async fn running_count(&self, tenant_id: &str) -> Result<i64, StoreError>;

    /// Insert a new `pending` job (§4.3 step 4). On a unique-constraint
    /// race for `idempotency_key`, implementations return
    /// [`StoreError::IdempotencyConflict`] so the caller can re-read the
    /// now-visible existing row (§4.3 "Ordering note").
    async fn insert_pending(&self, new_job: NewJob) -> Result<Job, StoreError>;

    /// Atomically claim one eligible job for `worker_id` (§4.4 "Lease
    /// acquisition"). Returns `None` if no job is eligible.
    async fn acquire_lease(&self, worker_id: &str) -> Result<Option<Job>, StoreError>;

    /// Acknowledge successful completion (§4.4 "Acknowledgement").
    async fn ack_completed(&self, job_id: Uuid, worker_id: &str) -> Result<LeaseWrite, StoreError>;

    /// Record a failed attempt; the store decides retry vs. dead-letter
    /// from the row's own `retry_count`/`max_retries` inside the
    /// transaction (§4.4 "Retry", "Dead-letter").
    async fn fail_attempt(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_message: &str,
    ) -> Result<RetryOutcome, StoreError>;

    /// Extend a held lease without altering any other field. Not called
    /// by the default worker loop (the lease duration is fixed), but part
    /// of the contract for handlers that manage their own long-running
    /// work and need to keep a lease alive past it.
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<LeaseWrite, StoreError>;

    /// C5: full job row by id.
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// C5: most recent jobs for a tenant, optionally filtered by status,
    /// ordered by `created_at` descending.
    async fn list_jobs(
        &self,
        tenant_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError>;

    /// C5: aggregate counts, optionally scoped to one tenant.
    async fn metrics(&self, tenant_id: Option<&str>) -> Result<Metrics, StoreError>;
}
