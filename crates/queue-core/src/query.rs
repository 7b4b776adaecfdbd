use uuid::Uuid;

use crate::error::QueryError;
use crate::model::{Job, JobStatus, Metrics};
use crate::store::JobStore;

/// C5 Query Surface: read-only projections over the durable store (§4.5).
pub struct QueryService<'a> {
    store: &'a dyn JobStore,
}

impl<'a> QueryService<'a> {
    pub fn new(store: &'a dyn JobStore) -> Self {
        Self { store }
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> Result<Job, QueryError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(QueryError::NotFound(job_id))
    }

    pub async fn list_jobs(
        &self,
        tenant_id: &str,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<Job>, QueryError> {
        let limit = if limit <= 0 { 50 } else { limit };
        Ok(self.store.list_jobs(tenant_id, status, limit).await?)
    }

    pub async fn get_running_job_count(&self, tenant_id: &str) -> Result<i64, QueryError> {
        Ok(self.store.running_count(tenant_id).await?)
    }

    pub async fn get_metrics(&self, tenant_id: Option<&str>) -> Result<Metrics, QueryError> {
        Ok(self.store.metrics(tenant_id).await?)
    }
}
