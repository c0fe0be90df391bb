//! Redis-backed window store.
//!
//! Each window is a sorted set whose members are event ids scored by their
//! admission second. The admit step runs as a Lua script so that it is atomic
//! across every process sharing the Redis instance.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, error};

use super::backend::{AdmitOutcome, AdmitRequest, Occupancy, WindowStore};
use crate::error::{QuotaError, Result};

/// Sliding window admit step.
///
/// KEYS[1]: sorted set key
/// ARGV[1]: cutoff (records scored below it are discarded)
/// ARGV[2]: maximum events
/// ARGV[3]: now
/// ARGV[4]: key expiry in seconds
/// ARGV[5..]: members to insert
///
/// Returns: {admitted (0/1), occupancy, oldest or -1}
const ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local cutoff = tonumber(ARGV[1])
local max_events = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])
local hits = #ARGV - 4

redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. cutoff)

local count = redis.call('ZCARD', key)
local admitted = 0

if count + hits <= max_events then
    for i = 5, #ARGV do
        redis.call('ZADD', key, now, ARGV[i])
    end
    count = count + hits
    admitted = 1
end

redis.call('EXPIRE', key, ttl)

local oldest = -1
local first = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if first[2] then
    oldest = math.floor(tonumber(first[2]))
end

return {admitted, count, oldest}
"#;

/// Read-only occupancy of a window.
///
/// KEYS[1]: sorted set key
/// ARGV[1]: cutoff
///
/// Returns: {count, oldest or -1}
const PEEK_SCRIPT: &str = r#"
local key = KEYS[1]
local cutoff = tonumber(ARGV[1])

local count = redis.call('ZCOUNT', key, cutoff, '+inf')
local oldest = -1
local first = redis.call('ZRANGEBYSCORE', key, cutoff, '+inf', 'WITHSCORES', 'LIMIT', 0, 1)
if first[2] then
    oldest = math.floor(tonumber(first[2]))
end

return {count, oldest}
"#;

/// RedisWindowStore keeps windows in a shared Redis instance.
pub struct RedisWindowStore {
    conn: ConnectionManager,
    admit: Script,
    peek: Script,
}

impl RedisWindowStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            admit: Script::new(ADMIT_SCRIPT),
            peek: Script::new(PEEK_SCRIPT),
        }
    }

    /// Open a managed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            error!(error = %e, "Failed to connect to window store");
            QuotaError::Store(e)
        })?;
        debug!("Connected to Redis window store");
        Ok(Self::new(conn))
    }
}

fn oldest_from_reply(raw: i64) -> Option<i64> {
    (raw >= 0).then_some(raw)
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn try_admit(&self, request: &AdmitRequest<'_>) -> Result<AdmitOutcome> {
        let mut invocation = self.admit.key(request.key);
        invocation
            .arg(request.cutoff())
            .arg(request.max_events)
            .arg(request.now)
            .arg(request.ttl_secs);
        for member in request.members {
            invocation.arg(member);
        }

        let result: Vec<i64> = invocation.invoke_async(&mut self.conn.clone()).await?;

        if result.len() < 3 {
            return Err(QuotaError::UnexpectedReply(format!(
                "admit script returned {} values",
                result.len()
            )));
        }

        Ok(AdmitOutcome {
            admitted: result[0] == 1,
            occupancy: result[1].max(0) as u64,
            oldest: oldest_from_reply(result[2]),
        })
    }

    async fn peek(&self, key: &str, window_secs: i64, now: i64) -> Result<Occupancy> {
        let result: Vec<i64> = self
            .peek
            .key(key)
            .arg(now - window_secs)
            .invoke_async(&mut self.conn.clone())
            .await?;

        if result.len() < 2 {
            return Err(QuotaError::UnexpectedReply(format!(
                "peek script returned {} values",
                result.len()
            )));
        }

        Ok(Occupancy {
            count: result[0].max(0) as u64,
            oldest: oldest_from_reply(result[1]),
        })
    }

    async fn release(&self, key: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        redis::cmd("ZREM")
            .arg(key)
            .arg(members)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
