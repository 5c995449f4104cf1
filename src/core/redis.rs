use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    pub(crate) async fn rate_limit(
        &self,
        key: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<bool, RedisError> {
        let current = self.increment_window(key, window_seconds).await?;
        Ok(current.map_or(true, |current| current <= limit as i64))
    }

    /// Bumps the fixed-window counter at `key`; `None` while disconnected.
    async fn increment_window(
        &self,
        key: &str,
        window_seconds: u64,
    ) -> Result<Option<i64>, RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(None);
        };

        let script = redis::Script::new(
            r#"
            local current = redis.call("INCR", KEYS[1])
            if current == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return current
        "#,
        );

        let current: i64 =
            script.key(key).arg(window_seconds as i64).invoke_async(&mut manager).await?;
        Ok(Some(current))
    }

    async fn window_count(&self, key: &str) -> Result<i64, RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(0);
        };
        let current: Option<i64> = cmd("GET").arg(key).query_async(&mut manager).await?;
        Ok(current.unwrap_or(0))
    }
}

/// Counts failed attempts per key in a fixed window. Only failures are recorded, so callers
/// check `exhausted` before acting and call `record_failure` when the attempt was rejected.
#[async_trait]
pub(crate) trait AttemptLimiter: Send + Sync {
    /// Whether `key` already used up its `limit` failures in the current window.
    async fn exhausted(&self, key: &str, limit: u64) -> bool;

    async fn record_failure(&self, key: &str, window_seconds: u64);
}

#[async_trait]
impl AttemptLimiter for RedisHandle {
    async fn exhausted(&self, key: &str, limit: u64) -> bool {
        match self.window_count(key).await {
            Ok(current) => current >= limit as i64,
            Err(err) => {
                tracing::warn!(key, error = %err, "Attempt limiter unavailable");
                false
            }
        }
    }

    async fn record_failure(&self, key: &str, window_seconds: u64) {
        if let Err(err) = self.increment_window(key, window_seconds).await {
            tracing::warn!(key, error = %err, "Failed to record attempt");
        }
    }
}

/// Key for a fixed-window limiter: `rl:{scope}:{subject}`.
pub(crate) fn rate_limit_key(scope: &str, subject: &str) -> String {
    format!("rl:{scope}:{}", subject.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disconnected_handle_allows_requests() {
        let redis = RedisHandle::new("redis://127.0.0.1:1/0".to_string());

        assert!(matches!(redis.health().await, RedisHealth::Disconnected));
        for _ in 0..3 {
            assert!(redis.rate_limit("rl:purge:admin", 1, 60).await.unwrap());
            redis.record_failure("rl:purge:admin", 60).await;
            assert!(!redis.exhausted("rl:purge:admin", 1).await);
        }
    }

    #[test]
    fn rate_limit_key_normalizes_subject() {
        assert_eq!(rate_limit_key("login", " Ada@School.org "), "rl:login:ada@school.org");
    }
}
