use async_trait::async_trait;

/// Submissions allowed per tenant per sliding window (§4.2, §6 Constants).
pub const SUBMISSION_LIMIT: u32 = 10;
/// Width of the submission-rate sliding window, in milliseconds.
pub const SUBMISSION_WINDOW_MS: i64 = 60_000;
/// In-flight `running` jobs allowed per tenant (§4.2, §6 Constants).
pub const CONCURRENCY_LIMIT: i64 = 5;

/// Admission decision returned by both gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Admission {
    Allow,
    Deny,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        matches!(self, Admission::Allow)
    }
}

/// C2 Rate Gate contract (§4.2).
///
/// `check_rate_limit` owns its own ephemeral state (a keyed sorted set);
/// `check_concurrent_limit` is a pure function of a count the caller reads
/// from the durable store. It never touches the keyed store and so never
/// fails open (§4.2 "Failure policy").
#[async_trait]
pub trait RateGate: Send + Sync {
    /// Evict stale entries, check cardinality, and (if allowed) record
    /// this submission attempt for `tenant_id`. Fails open (returns
    /// `Allow` and emits a warning) if the keyed store is unreachable.
    async fn check_rate_limit(&self, tenant_id: &str) -> Admission;

    /// Pure comparison against the concurrency cap; never fails open.
    fn check_concurrent_limit(&self, running_count: i64) -> Admission {
        if running_count >= CONCURRENCY_LIMIT {
            Admission::Deny
        } else {
            Admission::Allow
        }
    }
}
