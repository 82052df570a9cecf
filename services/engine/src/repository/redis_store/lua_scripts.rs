//! Redis Lua scripts for atomic operations
//!
//! Redis runs each script without interleaving other commands, which is what
//! makes a ledger commit all-or-nothing on this backend.

/// Lua script to open an account if the id is free
///
/// Keys: [account_key, account_index]
/// Args: [account_id, initial_balance, now_ms]
///
/// Returns: 1 if created, 0 if the account already exists
pub const OPEN_ACCOUNT_SCRIPT: &str = r#"
local account = KEYS[1]
local index = KEYS[2]

if redis.call('EXISTS', account) == 1 then
  return 0
end

redis.call('HSET', account,
  'account_id', ARGV[1],
  'balance', ARGV[2],
  'initial_balance', ARGV[2],
  'version', '0',
  'last_sequence', '0',
  'created_at_ms', ARGV[3],
  'updated_at_ms', ARGV[3]
)
redis.call('ZADD', index, ARGV[3], ARGV[1])
return 1
"#;

/// Lua script applying one ledger commit under the account version guard
///
/// Keys: [account_key, ledger_key, results_key, commit_key, hand_key, open_hands_index]
/// Args: [expected_version, new_balance, last_sequence or '', now_ms, receipt_json,
///        result_json or '', hand_mode (none|open|update), hand_expected_version,
///        hand_version, hand_json, hand_id, hand_still_open (1|0), entry_json...]
///
/// Returns: 1 applied, 0 account version moved, -1 no such account, -2 hand version moved
pub const COMMIT_SCRIPT: &str = r#"
local account = KEYS[1]
local ledger = KEYS[2]
local results = KEYS[3]
local commit = KEYS[4]
local hand = KEYS[5]
local open_hands = KEYS[6]

if redis.call('EXISTS', account) == 0 then
  return -1
end

local current = tonumber(redis.call('HGET', account, 'version') or '0')
if current ~= tonumber(ARGV[1]) then
  return 0
end

local hand_mode = ARGV[7]
if hand_mode == 'open' then
  if redis.call('EXISTS', hand) == 1 then
    return -2
  end
elseif hand_mode == 'update' then
  local stored = tonumber(redis.call('HGET', hand, 'version') or '-1')
  if stored ~= tonumber(ARGV[8]) then
    return -2
  end
end

redis.call('HSET', account,
  'balance', ARGV[2],
  'version', tostring(current + 1),
  'updated_at_ms', ARGV[4]
)
if ARGV[3] ~= '' then
  redis.call('HSET', account, 'last_sequence', ARGV[3])
end

for i = 13, #ARGV do
  redis.call('RPUSH', ledger, ARGV[i])
end

if ARGV[6] ~= '' then
  redis.call('RPUSH', results, ARGV[6])
end

if hand_mode ~= 'none' then
  redis.call('HSET', hand, 'version', ARGV[9], 'data', ARGV[10])
  if ARGV[12] == '1' then
    redis.call('ZADD', open_hands, ARGV[4], ARGV[11])
  else
    redis.call('ZREM', open_hands, ARGV[11])
  end
end

redis.call('SET', commit, ARGV[5])
return 1
"#;

/// Lua script for compare-and-swap hand update with versioning
///
/// Keys: [hand_key, open_hands_index]
/// Args: [expected_version, new_version, hand_json, hand_id, now_ms, hand_still_open (1|0)]
///
/// Returns: 1 if updated, 0 if version mismatch
pub const SAVE_HAND_SCRIPT: &str = r#"
local hand = KEYS[1]
local expected = tonumber(ARGV[1])

local current = tonumber(redis.call('HGET', hand, 'version') or '-1')
if current ~= expected then
  return 0
end

redis.call('HSET', hand, 'version', ARGV[2], 'data', ARGV[3])
if ARGV[6] == '1' then
  redis.call('ZADD', KEYS[2], ARGV[5], ARGV[4])
else
  redis.call('ZREM', KEYS[2], ARGV[4])
end
return 1
"#;
