//! Counters shared across instances through Redis.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;

use super::{Hit, RateLimitStore};
use crate::error::{AppError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RedisRateLimitStore {
    conn: ConnectionManager,
}

impl RedisRateLimitStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| AppError::internal("timed out connecting to Redis"))??;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<Hit> {
        let mut conn = self.conn.clone();
        let window_ms = window.as_millis() as i64;

        let count: u64 = conn.incr(key, 1u64).await?;
        if count == 1 {
            let _: bool = conn.pexpire(key, window_ms).await?;
        }

        let ttl_ms: i64 = conn.pttl(key).await?;
        let reset_after = if ttl_ms > 0 {
            Duration::from_millis(ttl_ms as u64)
        } else {
            // Key lost its expiry (e.g. a crash between INCR and PEXPIRE)
            let _: bool = conn.pexpire(key, window_ms).await?;
            window
        };

        Ok(Hit { count, reset_after })
    }

    async fn decrement(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let remaining: i64 = conn.decr(key, 1i64).await?;
        if remaining < 0 {
            let _: i64 = conn.del(key).await?;
        }
        Ok(())
    }

    async fn reset_key(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        assert!(RedisRateLimitStore::connect("not a url").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_falls_back_to_disabled() {
        let store = super::super::connect_store(Some("redis://127.0.0.1:1")).await;
        assert_eq!(store.backend(), "disabled");
    }
}
