use async_trait::async_trait;
use queue_core::{HandlerError, JobHandler};
use serde_json::Value;
use tracing::info;

/// Default handler wired into the binary when no payload-specific handler
/// is configured: it logs the payload and acknowledges the job. A real
/// deployment replaces this with a handler pinned to its own payload
/// shape (§4.4 "Processing").
pub struct LoggingJobHandler;

#[async_trait]
impl JobHandler for LoggingJobHandler {
    async fn handle(&self, payload: &Value) -> Result<(), HandlerError> {
        info!(%payload, "processing job");
        Ok(())
    }
}
