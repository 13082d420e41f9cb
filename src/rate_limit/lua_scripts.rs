/// Lua script for fixed-window counting in Redis
///
/// Increment and expiry run inside one script so the TTL is set exactly once
/// per window: only the increment that opens a window (count == 1) sets it,
/// and a key that somehow lost its TTL gets one re-applied instead of living
/// forever. Running this non-atomically (INCR then EXPIRE from the client)
/// can reset the TTL on precisely the request that starts a new window.
///
/// KEYS[1] = the counter key
/// ARGV[1] = window duration (seconds)
///
/// Returns: [count after increment, seconds until the window expires]
pub const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local window = tonumber(ARGV[1])

local count = redis.call('INCR', key)

if count == 1 then
    redis.call('EXPIRE', key, window)
end

local ttl = redis.call('TTL', key)
if ttl < 0 then
    redis.call('EXPIRE', key, window)
    ttl = window
end

return {count, ttl}
"#;
