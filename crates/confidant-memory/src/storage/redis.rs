//! Redis sorted-set backend
//!
//! Members are stored as `"{order}:{text}"` so that identical lines written at
//! different times remain distinct set members. Append and seed run as Lua
//! scripts, making score assignment and add-if-absent atomic on the server.

use super::ScoredSetStore;
use crate::error::{ChatError, ChatResult};
use crate::history::HistoryEntry;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::debug;

const APPEND_SCRIPT: &str = r#"
local score = tonumber(ARGV[1])
local last = redis.call('ZRANGE', KEYS[1], -1, -1, 'WITHSCORES')
if last[2] then
  local top = tonumber(last[2])
  if top >= score then
    score = top + 1
  end
end
redis.call('ZADD', KEYS[1], score, string.format('%d', score) .. ':' .. ARGV[2])
return score
"#;

const SEED_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
for i = 1, #ARGV, 2 do
  redis.call('ZADD', KEYS[1], ARGV[i], ARGV[i + 1])
end
return 1
"#;

/// Ordered-set store backed by Redis sorted sets
#[derive(Clone)]
pub struct RedisScoredSetStore {
    connection: ConnectionManager,
    append_script: Script,
    seed_script: Script,
}

impl RedisScoredSetStore {
    /// Wrap an existing connection manager
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            append_script: Script::new(APPEND_SCRIPT),
            seed_script: Script::new(SEED_SCRIPT),
        }
    }

    /// Connect to the Redis server at `url`
    pub async fn connect(url: &str) -> ChatResult<Self> {
        let client = redis::Client::open(url).map_err(|e| ChatError::store("connect", e))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| ChatError::store("connect", e))?;

        debug!("Connected history store to redis");
        Ok(Self::new(connection))
    }

    /// Handle to the shared connection, e.g. for a rate limiter on the same server
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn encode_member(entry: &HistoryEntry) -> String {
    format!("{}:{}", entry.order, entry.text)
}

fn decode_member(member: String, score: f64) -> HistoryEntry {
    let text = match member.split_once(':') {
        Some((_, text)) => text.to_string(),
        None => member,
    };
    HistoryEntry::new(text, score as i64)
}

fn decode_all(raw: Vec<(String, f64)>) -> Vec<HistoryEntry> {
    raw.into_iter()
        .map(|(member, score)| decode_member(member, score))
        .collect()
}

#[async_trait::async_trait]
impl ScoredSetStore for RedisScoredSetStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn append(&self, key: &str, text: &str, floor: i64) -> ChatResult<i64> {
        let mut con = self.connection.clone();
        self.append_script
            .key(key)
            .arg(floor)
            .arg(text)
            .invoke_async(&mut con)
            .await
            .map_err(|e| ChatError::store("zadd", e))
    }

    async fn insert_if_absent(&self, key: &str, entries: &[HistoryEntry]) -> ChatResult<bool> {
        if entries.is_empty() {
            return Ok(false);
        }

        let mut invocation = self.seed_script.key(key);
        for entry in entries {
            invocation.arg(entry.order).arg(encode_member(entry));
        }

        let mut con = self.connection.clone();
        let written: i64 = invocation
            .invoke_async(&mut con)
            .await
            .map_err(|e| ChatError::store("seed", e))?;

        Ok(written == 1)
    }

    async fn range_by_score(&self, key: &str, min: i64, max: i64) -> ChatResult<Vec<HistoryEntry>> {
        let mut con = self.connection.clone();
        let raw: Vec<(String, f64)> = con
            .zrangebyscore_withscores(key, min, max)
            .await
            .map_err(|e| ChatError::store("zrangebyscore", e))?;

        Ok(decode_all(raw))
    }

    async fn tail(&self, key: &str, limit: usize) -> ChatResult<Vec<HistoryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let start = -(isize::try_from(limit).unwrap_or(isize::MAX));
        let mut con = self.connection.clone();
        let raw: Vec<(String, f64)> = con
            .zrange_withscores(key, start, -1)
            .await
            .map_err(|e| ChatError::store("zrange", e))?;

        Ok(decode_all(raw))
    }

    async fn exists(&self, key: &str) -> ChatResult<bool> {
        let mut con = self.connection.clone();
        con.exists(key)
            .await
            .map_err(|e| ChatError::store("exists", e))
    }
}
