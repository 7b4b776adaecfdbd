use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default retry budget for a freshly submitted job (§3, §6 Constants).
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Maximum wall-clock a single lease attempt may run before a peer may
/// steal it back (§4.4).
pub const LEASE_DURATION: chrono::Duration = chrono::Duration::minutes(5);

/// Worker inter-poll sleep, used for both "no work" and "transient error"
/// (§4.4, §5: the same wait serves both cases).
pub const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Base and cap for the exponential retry backoff (§4.4, §6 Constants).
pub const RETRY_BACKOFF_BASE_MS: i64 = 30_000;
pub const RETRY_BACKOFF_CAP_MS: i64 = 600_000;

/// One of the four terminal/non-terminal states a [`Job`] can occupy (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A unit of work flowing through the queue. Field-for-field mirror of §3.
///
/// Invariant enforced by every writer in this workspace: `status = running`
/// iff both `worker_id` and `lease_expires_at` are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: String,
    pub status: JobStatus,
    pub payload: Value,
    pub idempotency_key: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub trace_id: Uuid,
}

/// Terminal resting place for a job that exhausted its retry budget (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub payload: Value,
    pub final_error: String,
    pub failed_at: DateTime<Utc>,
    pub trace_id: Uuid,
}

/// Outcome of [`crate::submission::submit`] (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub trace_id: Uuid,
}

/// Per-tenant job-status histogram plus dead-letter count (§4.5).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub jobs_total: i64,
    pub jobs_by_status: StatusCounts,
    pub dlq_size: i64,
}

/// Compute the exponential backoff for a retry, in milliseconds (§4.4).
///
/// `retry_count` is the value *before* incrementing.
pub fn retry_backoff_ms(retry_count: i32) -> i64 {
    let exponent = retry_count.max(0).min(62) as u32;
    let scaled = RETRY_BACKOFF_BASE_MS.saturating_mul(1i64 << exponent);
    scaled.min(RETRY_BACKOFF_CAP_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_the_cap() {
        assert_eq!(retry_backoff_ms(0), 30_000);
        assert_eq!(retry_backoff_ms(1), 60_000);
        assert_eq!(retry_backoff_ms(2), 120_000);
        assert_eq!(retry_backoff_ms(3), 240_000);
        assert_eq!(retry_backoff_ms(10), RETRY_BACKOFF_CAP_MS);
    }

    #[test]
    fn status_round_trips_through_db_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_db(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::from_db("bogus"), None);
    }
}
