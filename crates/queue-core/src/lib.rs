//! # queue-core
//!
//! A durable, multi-tenant background job queue built on top of a
//! relational store. Tenants submit opaque JSON payloads; workers lease,
//! execute, acknowledge, retry with exponential backoff, and ultimately
//! dead-letter jobs that exhaust their retry budget. Per-tenant admission
//! control limits both submission rate and in-flight concurrency.
//!
//! This crate is policy-light: it defines the data model, the
//! [`JobStore`] and [`RateGate`] trait contracts, and the orchestration
//! (submission, worker loop, query surface) that sits on top of them. The
//! durable-store and rate-gate implementations live in sibling crates
//! (`queue-postgres`, `queue-rate-redis`); in-memory fakes for testing
//! live in `queue-testing`.
//!
//! ## Architecture
//!
//! ```text
//! Submitter ──► SubmissionService ──► JobStore (C1) ◄── QueryService
//!                     │                    ▲
//!                     ▼                    │
//!                 RateGate (C2)      WorkerRuntime (C4)
//! ```
//!
//! ## Key invariants
//!
//! 1. `status = running` iff both `worker_id` and `lease_expires_at` are set.
//! 2. `retry_count <= max_retries` at all times.
//! 3. An `idempotency_key`, when present, identifies exactly one job.
//! 4. Every dead-letter entry has a matching `failed` job with the same
//!    `trace_id` and a byte-identical payload snapshot.
//! 5. Among jobs eligible to lease at time `t`, the one with the smallest
//!    `created_at` is claimed first.
//! 6. At most one worker holds a lease on a given job at any time.

mod error;
mod model;
mod query;
mod rate;
mod store;
mod submission;
mod worker;

pub use error::{HandlerError, QueryError, RateLimitReason, StoreError, SubmitError};
pub use model::{
    retry_backoff_ms, DeadLetterEntry, Job, JobStatus, Metrics, StatusCounts, SubmitOutcome,
    DEFAULT_MAX_RETRIES, LEASE_DURATION, POLL_INTERVAL, RETRY_BACKOFF_BASE_MS, RETRY_BACKOFF_CAP_MS,
};
pub use query::QueryService;
pub use rate::{Admission, RateGate, CONCURRENCY_LIMIT, SUBMISSION_LIMIT, SUBMISSION_WINDOW_MS};
pub use store::{JobStore, LeaseWrite, NewJob, RetryOutcome};
pub use submission::SubmissionService;
pub use worker::{JobHandler, WorkerRuntime};
