use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use safar_core::repository::SearchSessionStore;
use safar_core::search::SearchSession;
use safar_core::{CoreError, CoreResult};
use tracing::debug;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

fn session_key(s_id: &str) -> String {
    format!("search:{}", s_id)
}

fn redis_error(e: redis::RedisError) -> CoreError {
    CoreError::StorageError(format!("redis: {}", e))
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter; true while `key` is within `limit` for the
    /// current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

#[async_trait]
impl SearchSessionStore for RedisClient {
    async fn save_session(&self, session: &SearchSession, ttl_seconds: u64) -> CoreResult<()> {
        let payload = serde_json::to_string(session).map_err(|e| CoreError::InternalError(e.to_string()))?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error)?;
        conn.set_ex::<_, _, ()>(session_key(session.s_id()), payload, ttl_seconds)
            .await
            .map_err(redis_error)?;
        debug!("Search session {} cached for {}s", session.s_id(), ttl_seconds);
        Ok(())
    }

    async fn get_session(&self, s_id: &str) -> CoreResult<Option<SearchSession>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error)?;
        let payload: Option<String> = conn.get(session_key(s_id)).await.map_err(redis_error)?;
        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(|e| CoreError::StorageError(format!("corrupt search session {}: {}", s_id, e)))
    }
}
