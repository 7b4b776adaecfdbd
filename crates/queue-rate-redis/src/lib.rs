//! Redis-backed sliding-window [`RateGate`] (§4.2 C2).
//!
//! A sorted set per tenant holds one member per submission, scored by the
//! submission's millisecond timestamp. `check_rate_limit` evicts expired
//! members, checks cardinality against [`SUBMISSION_LIMIT`], and (if
//! allowed) inserts a fresh member and refreshes the key's TTL.

use async_trait::async_trait;
use chrono::Utc;
use queue_core::{Admission, RateGate, SUBMISSION_LIMIT, SUBMISSION_WINDOW_MS};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const DEFAULT_KEY_PREFIX: &str = "queue:rate:v1";
/// Sorted-set TTL, per §4.2 step 4.
const KEY_TTL_SECONDS: i64 = 60;

/// Redis-backed implementation of [`RateGate`].
#[derive(Clone)]
pub struct RedisRateGate {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisRateGate {
    /// Opens a connection and pings it once, so construction fails fast on
    /// a misconfigured URL rather than on the first admission check.
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        let mut health_connection = connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut health_connection)
            .await?;

        Ok(Self {
            connection,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    fn key_for(&self, tenant_id: &str) -> String {
        compose_key(&self.key_prefix, tenant_id)
    }

    /// The fallible half of `check_rate_limit`, split out so the trait
    /// method can collapse any transport error into fail-open `Allow`.
    async fn try_check_rate_limit(&self, tenant_id: &str) -> redis::RedisResult<Admission> {
        let key = self.key_for(tenant_id);
        let now_ms = Utc::now().timestamp_millis();
        let cutoff_ms = now_ms - SUBMISSION_WINDOW_MS;

        let mut connection = self.connection.clone();

        let _: i64 = connection.zrembyscore(&key, "-inf", cutoff_ms).await?;
        let cardinality: i64 = connection.zcard(&key).await?;

        if cardinality >= i64::from(SUBMISSION_LIMIT) {
            return Ok(Admission::Deny);
        }

        // Uniqueness suffix so two submissions landing in the same
        // millisecond don't collide on the same sorted-set member.
        let member = format!("{now_ms}-{}", fastrand::u32(..));
        let _: i64 = connection.zadd(&key, member, now_ms).await?;
        let _: bool = connection.expire(&key, KEY_TTL_SECONDS).await?;

        Ok(Admission::Allow)
    }
}

#[async_trait]
impl RateGate for RedisRateGate {
    async fn check_rate_limit(&self, tenant_id: &str) -> Admission {
        match self.try_check_rate_limit(tenant_id).await {
            Ok(admission) => admission,
            Err(err) => {
                tracing::warn!(tenant_id, error = %err, "rate gate unreachable, failing open");
                Admission::Allow
            }
        }
    }
}

fn compose_key(key_prefix: &str, tenant_id: &str) -> String {
    format!("{key_prefix}:{tenant_id}")
}

#[cfg(test)]
mod tests {
    use super::compose_key;

    #[test]
    fn compose_key_joins_prefix_and_tenant() {
        assert_eq!(
            compose_key("queue:rate:v1", "tenant-a"),
            "queue:rate:v1:tenant-a"
        );
    }
}
