use std::time::Duration;

use redis::Value;

use crate::{Decision, SlidegateError};

/// Sliding-window-log admission, executed atomically by Redis.
///
/// KEYS[1] is the identity's window key (a sorted set, one member per admitted
/// cost unit, scored by admission time). ARGV is `now_ms`, `window_ms`,
/// `limit`, `ttl_ms`, `cost`. Replies `{allowed, remaining, retry_after_ms}`.
pub const ADMISSION_SCRIPT: &str = r#"
    local window_key = KEYS[1]

    local now_ms = tonumber(ARGV[1])
    local window_ms = tonumber(ARGV[2])
    local limit = tonumber(ARGV[3])
    local ttl_ms = tonumber(ARGV[4])
    local cost = tonumber(ARGV[5] or "1") or 1

    local max_cost = 100
    if cost < 1 then cost = 1 end
    if cost > max_cost then cost = max_cost end

    -- evict events that left the window, [0, now - window]
    redis.call("ZREMRANGEBYSCORE", window_key, 0, now_ms - window_ms)

    local count = tonumber(redis.call("ZCARD", window_key))

    if count + cost <= limit then
        local time_array = redis.call("TIME")

        for i = 1, cost do
            local member = string.format("%s:%s:%d", time_array[1], time_array[2], count + i)
            redis.call("ZADD", window_key, now_ms, member)
        end

        redis.call("PEXPIRE", window_key, ttl_ms)

        return {1, limit - (count + cost), 0}
    end

    local retry_after_ms = 0
    local oldest = redis.call("ZRANGE", window_key, 0, 0, "WITHSCORES")
    if #oldest >= 2 then
        retry_after_ms = (tonumber(oldest[2]) + window_ms) - now_ms
        if retry_after_ms < 0 then retry_after_ms = 0 end
    end

    local remaining = limit - count
    if remaining < 0 then remaining = 0 end

    return {0, remaining, retry_after_ms}
"#;

/// Positional arguments of [`ADMISSION_SCRIPT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AdmissionArgs {
    pub now_ms: u64,
    pub window_ms: u64,
    pub limit: u64,
    pub ttl_ms: u64,
    pub cost: u64,
}

impl AdmissionArgs {
    pub(crate) fn to_argv(self) -> [u64; 5] {
        [
            self.now_ms,
            self.window_ms,
            self.limit,
            self.ttl_ms,
            self.cost,
        ]
    }
}

/// Turn the raw `{allowed, remaining, retry_after_ms}` reply into a [`Decision`].
pub(crate) fn parse_admission_reply(reply: &[Value]) -> Result<Decision, SlidegateError> {
    let [allowed, remaining, retry_after_ms, ..] = reply else {
        return Err(SlidegateError::UnexpectedReply(format!(
            "expected 3 elements, got {}",
            reply.len()
        )));
    };

    let remaining = value_to_i64(remaining).max(0) as u64;

    if value_to_i64(allowed) == 1 {
        Ok(Decision::allowed(remaining))
    } else {
        let retry_after = Duration::from_millis(value_to_i64(retry_after_ms).max(0) as u64);
        Ok(Decision::rejected(remaining, retry_after))
    }
}

/// Read a numeric reply element, whatever its wire encoding.
///
/// Anything that cannot be read as a number yields 0.
pub(crate) fn value_to_i64(value: &Value) -> i64 {
    match value {
        Value::Int(value) => *value,
        Value::Double(value) => *value as i64,
        Value::Boolean(value) => i64::from(*value),
        Value::SimpleString(value) => parse_numeric(value),
        Value::BulkString(bytes) => std::str::from_utf8(bytes).map_or(0, parse_numeric),
        _ => 0,
    }
}

fn parse_numeric(value: &str) -> i64 {
    let value = value.trim();

    value
        .parse::<i64>()
        .or_else(|_| value.parse::<f64>().map(|value| value as i64))
        .unwrap_or(0)
}
