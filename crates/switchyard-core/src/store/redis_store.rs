//! Redis-backed coordination store

use super::{window_member, CoordinationStore, WindowDecision, DEFAULT_KEY_PREFIX};
use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// KEYS[1] window; ARGV now_ms, window_ms, limit, member
const SLIDING_WINDOW_LUA: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local current = redis.call('ZCARD', key)

if current < limit then
  redis.call('ZADD', key, now, ARGV[4])
  redis.call('PEXPIRE', key, window)
  return {1, limit - current - 1, now + window}
end
return {0, 0, now + window}
";

/// KEYS[1] window; ARGV now_ms, window_ms, member
const WINDOW_RECORD_LUA: &str = r"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', tonumber(ARGV[1]) - tonumber(ARGV[2]))
redis.call('ZADD', KEYS[1], ARGV[1], ARGV[3])
redis.call('PEXPIRE', KEYS[1], ARGV[2])
return 1
";

/// KEYS[1] window; ARGV now_ms, window_ms
const WINDOW_COUNT_LUA: &str = r"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', tonumber(ARGV[1]) - tonumber(ARGV[2]))
return redis.call('ZCARD', KEYS[1])
";

/// KEYS[1] counter; ARGV delta, ttl_ms
const INCR_FLOAT_LUA: &str = r"
local value = redis.call('INCRBYFLOAT', KEYS[1], ARGV[1])
if redis.call('PTTL', KEYS[1]) < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return value
";

/// KEYS[1] lock; ARGV token
const COMPARE_AND_DELETE_LUA: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis coordination store
///
/// # Security Features
///
/// - Keys are prefixed to isolate from other Redis data
/// - Consider enabling Redis AUTH and TLS in production
pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    /// Key prefix
    prefix: String,
    sliding_window: Script,
    window_record: Script,
    window_count: Script,
    incr_float: Script,
    compare_and_delete: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Create a new Redis store with the default prefix
    ///
    /// # Errors
    ///
    /// Returns error if Redis URL is invalid
    pub fn new(redis_url: &str) -> Result<Self> {
        Self::with_prefix(redis_url, DEFAULT_KEY_PREFIX)
    }

    /// Create with a custom key prefix
    ///
    /// # Errors
    ///
    /// Returns error if Redis URL is invalid
    pub fn with_prefix(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Configuration(format!("invalid Redis URL: {}", e)))?;

        info!(prefix = %prefix, "Redis coordination store configured");
        Ok(Self {
            client,
            connection: OnceCell::new(),
            prefix: prefix.to_string(),
            sliding_window: Script::new(SLIDING_WINDOW_LUA),
            window_record: Script::new(WINDOW_RECORD_LUA),
            window_count: Script::new(WINDOW_COUNT_LUA),
            incr_float: Script::new(INCR_FLOAT_LUA),
            compare_and_delete: Script::new(COMPARE_AND_DELETE_LUA),
        })
    }

    /// Build the full Redis key
    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Get the shared multiplexed connection, connecting on first use
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                debug!("Opening Redis connection");
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| Error::Store(format!("Redis connection failed: {}", e)))
            })
            .await?;
        Ok(conn.clone())
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().max(1) as u64
}

#[async_trait]
impl CoordinationStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis GET failed: {}", e)))?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection().await?;
        redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis SET failed: {}", e)))?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.build_key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis SET NX failed: {}", e)))?;
        Ok(reply.is_some())
    }

    async fn incr_by_float(&self, key: &str, delta: f64, ttl: Duration) -> Result<f64> {
        let mut conn = self.get_connection().await?;
        let reply: String = self
            .incr_float
            .key(self.build_key(key))
            .arg(delta)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis INCRBYFLOAT failed: {}", e)))?;
        reply
            .parse()
            .map_err(|e| Error::Serialization(format!("counter '{}' is not a float: {}", key, e)))
    }

    async fn sliding_window(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowDecision> {
        let mut conn = self.get_connection().await?;
        let (allowed, remaining, reset_at_ms): (i64, i64, i64) = self
            .sliding_window
            .key(self.build_key(key))
            .arg(now_ms)
            .arg(millis(window))
            .arg(limit)
            .arg(window_member(now_ms))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis sliding window failed: {}", e)))?;

        Ok(WindowDecision {
            allowed: allowed == 1,
            remaining: remaining.max(0) as u32,
            reset_at_ms,
        })
    }

    async fn window_record(&self, key: &str, window: Duration, now_ms: i64) -> Result<()> {
        let mut conn = self.get_connection().await?;
        self.window_record
            .key(self.build_key(key))
            .arg(now_ms)
            .arg(millis(window))
            .arg(window_member(now_ms))
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis window record failed: {}", e)))?;
        Ok(())
    }

    async fn window_count(&self, key: &str, window: Duration, now_ms: i64) -> Result<u32> {
        let mut conn = self.get_connection().await?;
        let count: i64 = self
            .window_count
            .key(self.build_key(key))
            .arg(now_ms)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis window count failed: {}", e)))?;
        Ok(count.max(0) as u32)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let deleted: i64 = self
            .compare_and_delete
            .key(self.build_key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis compare-and-delete failed: {}", e)))?;
        Ok(deleted == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let deleted: i64 = redis::cmd("DEL")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis DEL failed: {}", e)))?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis PING failed: {}", e)))?;
        Ok(())
    }
}
