//! In-memory fakes for [`queue_core::JobStore`] and [`queue_core::RateGate`].
//!
//! These exist so unit tests (in `queue-core` itself) and integration
//! tests (in the binaries) can exercise the submission/worker/query
//! orchestration without a real Postgres or Redis connection.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queue_core::{
    Admission, DeadLetterEntry, Job, JobStatus, JobStore, LeaseWrite, Metrics, NewJob, RateGate,
    RetryOutcome, StatusCounts, StoreError, LEASE_DURATION,
};
use uuid::Uuid;

// Re-exported so callers don't need to depend on queue-core directly for
// these constants when wiring up tests.
pub use queue_core::{CONCURRENCY_LIMIT, SUBMISSION_LIMIT, SUBMISSION_WINDOW_MS};

/// In-memory [`JobStore`] backed by a single `Mutex<HashMap>`. Single
/// process, single test only: there is no cross-process coordination.
#[derive(Default)]
pub struct InMemoryStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    dead_letters: Mutex<HashMap<Uuid, DeadLetterEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count_for_tenant(&self, tenant_id: &str) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.tenant_id == tenant_id)
            .count()
    }

    /// Test helper: force a job straight into `running` without going
    /// through [`JobStore::acquire_lease`], used to set up concurrency
    /// scenarios directly.
    pub async fn force_running(&self, job_id: Uuid, worker_id: &str) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&job_id) {
            job.status = JobStatus::Running;
            job.worker_id = Some(worker_id.to_string());
            job.lease_expires_at = Some(Utc::now() + LEASE_DURATION);
            job.started_at.get_or_insert(Utc::now());
        }
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().unwrap().len()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .find(|job| job.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn running_count(&self, tenant_id: &str) -> Result<i64, StoreError> {
        let count = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.tenant_id == tenant_id && job.status == JobStatus::Running)
            .count();
        Ok(count as i64)
    }

    async fn insert_pending(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();

        if let Some(key) = new_job.idempotency_key.as_deref() {
            if jobs
                .values()
                .any(|job| job.idempotency_key.as_deref() == Some(key))
            {
                return Err(StoreError::IdempotencyConflict);
            }
        }

        let job = Job {
            id: Uuid::new_v4(),
            tenant_id: new_job.tenant_id,
            status: JobStatus::Pending,
            payload: new_job.payload,
            idempotency_key: new_job.idempotency_key,
            retry_count: 0,
            max_retries: new_job.max_retries,
            lease_expires_at: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            trace_id: new_job.trace_id,
        };
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn acquire_lease(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();

        let candidate_id = jobs
            .values()
            .filter(|job| is_claimable(job, now))
            .min_by_key(|job| job.created_at)
            .map(|job| job.id);

        let Some(id) = candidate_id else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).expect("candidate id came from this map");
        job.status = JobStatus::Running;
        job.worker_id = Some(worker_id.to_string());
        job.lease_expires_at = Some(now + LEASE_DURATION);
        if job.started_at.is_none() {
            job.started_at = Some(now);
        }
        Ok(Some(job.clone()))
    }

    async fn ack_completed(&self, job_id: Uuid, worker_id: &str) -> Result<LeaseWrite, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&job_id) else {
            return Err(StoreError::NotFound(job_id));
        };
        if job.status != JobStatus::Running || job.worker_id.as_deref() != Some(worker_id) {
            return Ok(LeaseWrite::LeaseStolen);
        }
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.worker_id = None;
        job.lease_expires_at = None;
        Ok(LeaseWrite::Applied)
    }

    async fn fail_attempt(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_message: &str,
    ) -> Result<RetryOutcome, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&job_id) else {
            return Err(StoreError::NotFound(job_id));
        };
        if job.status != JobStatus::Running || job.worker_id.as_deref() != Some(worker_id) {
            return Ok(RetryOutcome::LeaseStolen);
        }

        job.error_message = Some(error_message.to_string());

        // §9 OQ3: compare the row's retry count *before* this failure
        // against max_retries. A job with max_retries=3 tolerates 3
        // retried failures and is dead-lettered on its 4th, still
        // carrying retry_count=3 (§8 worked example).
        if job.retry_count >= job.max_retries {
            job.status = JobStatus::Failed;
            job.worker_id = None;
            job.lease_expires_at = None;

            let entry = DeadLetterEntry {
                id: Uuid::new_v4(),
                job_id: job.id,
                payload: job.payload.clone(),
                final_error: error_message.to_string(),
                failed_at: Utc::now(),
                trace_id: job.trace_id,
            };
            drop(jobs);
            self.dead_letters
                .lock()
                .unwrap()
                .insert(entry.job_id, entry.clone());
            Ok(RetryOutcome::DeadLettered(entry))
        } else {
            let backoff_ms = queue_core::retry_backoff_ms(job.retry_count);
            job.retry_count += 1;
            job.status = JobStatus::Pending;
            job.worker_id = None;
            job.lease_expires_at = None;
            job.created_at = Utc::now() + chrono::Duration::milliseconds(backoff_ms);
            Ok(RetryOutcome::Retried)
        }
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<LeaseWrite, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&job_id) else {
            return Err(StoreError::NotFound(job_id));
        };
        if job.status != JobStatus::Running || job.worker_id.as_deref() != Some(worker_id) {
            return Ok(LeaseWrite::LeaseStolen);
        }
        job.lease_expires_at = Some(Utc::now() + LEASE_DURATION);
        Ok(LeaseWrite::Applied)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn list_jobs(
        &self,
        tenant_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.tenant_id == tenant_id)
            .filter(|job| status.map(|s| s == job.status).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn metrics(&self, tenant_id: Option<&str>) -> Result<Metrics, StoreError> {
        let jobs = self.jobs.lock().unwrap();
        let mut counts = StatusCounts::default();
        let mut total = 0i64;
        for job in jobs.values() {
            if let Some(tenant) = tenant_id {
                if job.tenant_id != tenant {
                    continue;
                }
            }
            total += 1;
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        drop(jobs);

        let dlq_size = match tenant_id {
            None => self.dead_letters.lock().unwrap().len() as i64,
            Some(tenant) => {
                let jobs = self.jobs.lock().unwrap();
                self.dead_letters
                    .lock()
                    .unwrap()
                    .keys()
                    .filter(|job_id| {
                        jobs.get(job_id)
                            .map(|job| job.tenant_id == tenant)
                            .unwrap_or(false)
                    })
                    .count() as i64
            }
        };

        Ok(Metrics {
            jobs_total: total,
            jobs_by_status: counts,
            dlq_size,
        })
    }
}

fn is_claimable(job: &Job, now: DateTime<Utc>) -> bool {
    match job.status {
        JobStatus::Pending => job.created_at <= now,
        JobStatus::Running => job
            .lease_expires_at
            .map(|expires| expires < now)
            .unwrap_or(false),
        _ => false,
    }
}

/// In-memory sliding-window [`RateGate`]. Never fails open: there is no
/// substrate to be unreachable in tests.
#[derive(Default)]
pub struct InMemoryRateGate {
    windows: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl InMemoryRateGate {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateGate for InMemoryRateGate {
    async fn check_rate_limit(&self, tenant_id: &str) -> Admission {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::milliseconds(SUBMISSION_WINDOW_MS);
        let mut windows = self.windows.lock().unwrap();
        let entries = windows.entry(tenant_id.to_string()).or_default();
        entries.retain(|ts| *ts >= cutoff);

        if entries.len() as u32 >= SUBMISSION_LIMIT {
            return Admission::Deny;
        }
        entries.push(now);
        Admission::Allow
    }
}
