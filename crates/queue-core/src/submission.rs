use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{RateLimitReason, StoreError, SubmitError};
use crate::model::{SubmitOutcome, DEFAULT_MAX_RETRIES};
use crate::rate::{Admission, RateGate};
use crate::store::{JobStore, NewJob};

/// C3 Submission Service: `submit(tenantId, payload, idempotencyKey?)` (§4.3).
pub struct SubmissionService<'a> {
    store: &'a dyn JobStore,
    rate_gate: &'a dyn RateGate,
}

impl<'a> SubmissionService<'a> {
    pub fn new(store: &'a dyn JobStore, rate_gate: &'a dyn RateGate) -> Self {
        Self { store, rate_gate }
    }

    /// Runs the full admission + insertion procedure of §4.3, in order.
    pub async fn submit(
        &self,
        tenant_id: &str,
        payload: Value,
        idempotency_key: Option<String>,
    ) -> Result<SubmitOutcome, SubmitError> {
        if tenant_id.trim().is_empty() {
            return Err(SubmitError::InvalidArgument(
                "tenantId must be non-empty".to_string(),
            ));
        }
        if payload.is_null() {
            return Err(SubmitError::InvalidArgument(
                "payload is required".to_string(),
            ));
        }

        // Step 1: idempotent resubmission short-circuits every admission
        // gate and returns the original job untouched.
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                return Ok(SubmitOutcome {
                    job_id: existing.id,
                    status: existing.status,
                    trace_id: existing.trace_id,
                });
            }
        }

        // Step 2: submission-rate admission.
        if !self.rate_gate.check_rate_limit(tenant_id).await.is_allowed() {
            return Err(SubmitError::RateLimited {
                reason: RateLimitReason::SubmissionRate,
            });
        }

        // Step 3: concurrency admission, read from the durable store.
        let running = self.store.running_count(tenant_id).await?;
        if self.rate_gate.check_concurrent_limit(running) == Admission::Deny {
            return Err(SubmitError::RateLimited {
                reason: RateLimitReason::Concurrency,
            });
        }

        // Step 4: allocate a trace id and insert. A unique-constraint loss
        // against a concurrent duplicate submission surfaces as
        // `IdempotencyConflict`; the losing request re-reads the
        // now-visible row instead of erroring (§4.3 "Ordering note").
        let trace_id = Uuid::new_v4();
        let new_job = NewJob {
            tenant_id: tenant_id.to_string(),
            payload,
            idempotency_key: idempotency_key.clone(),
            max_retries: DEFAULT_MAX_RETRIES,
            trace_id,
        };

        match self.store.insert_pending(new_job).await {
            Ok(job) => {
                info!(job_id = %job.id, tenant_id, trace_id = %trace_id, "job submitted");
                Ok(SubmitOutcome {
                    job_id: job.id,
                    status: job.status,
                    trace_id: job.trace_id,
                })
            }
            Err(StoreError::IdempotencyConflict) => {
                let key = idempotency_key.as_deref().unwrap_or_default();
                warn!(tenant_id, key, "idempotency key race lost, returning existing job");
                let existing = self
                    .store
                    .find_by_idempotency_key(key)
                    .await?
                    .ok_or(StoreError::IdempotencyConflict)?;
                Ok(SubmitOutcome {
                    job_id: existing.id,
                    status: existing.status,
                    trace_id: existing.trace_id,
                })
            }
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_testing::{InMemoryRateGate, InMemoryStore};
    use serde_json::json;

    #[tokio::test]
    async fn rejects_empty_tenant() {
        let store = InMemoryStore::new();
        let gate = InMemoryRateGate::new();
        let service = SubmissionService::new(&store, &gate);

        let err = service
            .submit("", json!({"task": "x"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn idempotent_resubmit_returns_same_job() {
        let store = InMemoryStore::new();
        let gate = InMemoryRateGate::new();
        let service = SubmissionService::new(&store, &gate);

        let first = service
            .submit("tenant-a", json!({"task": "x"}), Some("key-1".to_string()))
            .await
            .unwrap();
        let second = service
            .submit("tenant-a", json!({"task": "x"}), Some("key-1".to_string()))
            .await
            .unwrap();

        assert_eq!(first.job_id, second.job_id);
        assert_eq!(first.trace_id, second.trace_id);
        assert_eq!(store.job_count_for_tenant("tenant-a").await, 1);
    }

    #[tokio::test]
    async fn eleventh_submission_in_window_is_rate_limited() {
        let store = InMemoryStore::new();
        let gate = InMemoryRateGate::new();
        let service = SubmissionService::new(&store, &gate);

        for _ in 0..10 {
            service
                .submit("tenant-b", json!({"task": "x"}), None)
                .await
                .unwrap();
        }

        let err = service
            .submit("tenant-b", json!({"task": "x"}), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::RateLimited {
                reason: RateLimitReason::SubmissionRate
            }
        ));
    }

    #[tokio::test]
    async fn sixth_concurrent_running_job_is_rate_limited() {
        let store = InMemoryStore::new();
        let gate = InMemoryRateGate::new();
        let service = SubmissionService::new(&store, &gate);

        for _ in 0..5 {
            let outcome = service
                .submit("tenant-c", json!({"task": "x"}), None)
                .await
                .unwrap();
            store.force_running(outcome.job_id, "worker-1").await;
        }

        let err = service
            .submit("tenant-c", json!({"task": "x"}), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::RateLimited {
                reason: RateLimitReason::Concurrency
            }
        ));
    }
}
