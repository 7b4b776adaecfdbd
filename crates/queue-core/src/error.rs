use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the submission path (C3).
///
/// Variants map directly onto the HTTP status codes in the external
/// interface table: `InvalidArgument` -> 400, `RateLimited` -> 429,
/// `Store` -> 500.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rate limited: {reason}")]
    RateLimited { reason: RateLimitReason },

    #[error("durable store error: {0}")]
    Store(#[from] StoreError),
}

/// Distinguishes the two admission gates so the HTTP layer can return the
/// message text pinned by the external interface table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    SubmissionRate,
    Concurrency,
}

impl RateLimitReason {
    /// The exact human-readable message the external interface requires.
    pub fn message(self) -> &'static str {
        match self {
            RateLimitReason::SubmissionRate => "Maximum 10 jobs per minute allowed",
            RateLimitReason::Concurrency => "Maximum 5 concurrent jobs allowed",
        }
    }
}

/// Errors surfaced by the durable store (C1).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("idempotency key already in use")]
    IdempotencyConflict,

    #[error("invalid persisted data: {0}")]
    InvalidData(String),

    #[error("transient store error: {0}")]
    Transient(#[source] anyhow::Error),
}

/// Errors surfaced by the query surface (C5).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A normalized job-handler failure (§4.4 "Processing").
///
/// The worker runtime never propagates a raw handler error; it always
/// reduces the failure to this shape before deciding retry vs. dead-letter.
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::new(err.to_string())
    }
}
