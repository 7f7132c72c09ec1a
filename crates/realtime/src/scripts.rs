//! Server-side Lua scripts.
//!
//! Every mutation of cached vote state or the chat dedup/ring pair runs as
//! one of these scripts, so the check-then-act sequence executes without
//! interleaving from other clients. Concurrent casts from the same voter
//! (retries, double-clicks, multiple tabs) are expected traffic; scripts
//! are the reason they cannot corrupt the single-choice invariant.
//!
//! Status conventions: `1` applied, `0` no-op, negative = validation
//! failure (`-1` vote not active, `-2` unknown option, `-3` option killed).

/// Cast a vote.
///
/// `KEYS[1]` = vote blob; `ARGV[1]` = option id, `ARGV[2]` = voter key.
/// Returns `{status, retracted_from}`: when the vote is single-choice, any
/// prior choice by the same voter is retracted in the same script and its
/// option id reported back for the unvote notification. A duplicate cast
/// returns `{0, 0}`.
pub const CAST: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then return {-1, 0} end
local vote = cjson.decode(raw)
local target = tonumber(ARGV[1])
local voter = ARGV[2]

local topt = nil
for _, opt in ipairs(vote.options) do
    if opt.option_id == target then topt = opt break end
end
if topt == nil then return {-2, 0} end
if topt.killed then return {-3, 0} end

for _, v in ipairs(topt.voters) do
    if v == voter then return {0, 0} end
end

local retracted = 0
if not vote.multivote then
    for _, opt in ipairs(vote.options) do
        if opt.option_id ~= target then
            for i, v in ipairs(opt.voters) do
                if v == voter then
                    table.remove(opt.voters, i)
                    retracted = opt.option_id
                    break
                end
            end
        end
    end
end

table.insert(topt.voters, voter)
redis.call('SET', KEYS[1], cjson.encode(vote))
return {1, retracted}
";

/// Retract a vote.
///
/// `KEYS[1]` = vote blob; `ARGV[1]` = option id, `ARGV[2]` = voter key.
/// Returns `1` if removed, `0` if the voter did not hold the option.
pub const RETRACT: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local vote = cjson.decode(raw)
local target = tonumber(ARGV[1])
local voter = ARGV[2]

for _, opt in ipairs(vote.options) do
    if opt.option_id == target then
        for i, v in ipairs(opt.voters) do
            if v == voter then
                table.remove(opt.voters, i)
                redis.call('SET', KEYS[1], cjson.encode(vote))
                return 1
            end
        end
        return 0
    end
end
return -2
";

/// Register a write-in option already inserted durably.
///
/// `KEYS[1]` = vote blob; `ARGV[1]` = option id, `ARGV[2]` = option text.
/// Re-checks `writein_allowed` and liveness so a concurrent config change
/// or closure rejects the registration (the caller then rolls back the
/// durable row).
pub const ADD_OPTION: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local vote = cjson.decode(raw)
if not vote.writein_allowed then return -2 end

local opt = {}
opt['option_id'] = tonumber(ARGV[1])
opt['text'] = ARGV[2]
opt['killed'] = false
opt['voters'] = {}
table.insert(vote.options, opt)
redis.call('SET', KEYS[1], cjson.encode(vote))
return 1
";

/// Set or clear an option's killed flag.
///
/// `KEYS[1]` = vote blob; `ARGV[1]` = option id, `ARGV[2]` = `'1'`/`'0'`,
/// `ARGV[3]` = reason (empty for none).
pub const KILL_OPTION: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local vote = cjson.decode(raw)
local target = tonumber(ARGV[1])
local killed = ARGV[2] == '1'

for _, opt in ipairs(vote.options) do
    if opt.option_id == target then
        opt.killed = killed
        if killed and ARGV[3] ~= '' then
            opt.killed_text = ARGV[3]
        else
            opt.killed_text = nil
        end
        redis.call('SET', KEYS[1], cjson.encode(vote))
        return 1
    end
end
return -2
";

/// Apply a partial configuration update.
///
/// `KEYS[1]` = vote blob, `KEYS[2]` = close-time zset; `ARGV[1]` = patch
/// JSON (`multivote`/`writein_allowed`/`votes_hidden` plus `set_close`,
/// `close_time`, `close_ms`), `ARGV[2]` = the vote's schedule member.
pub const SET_CONFIG: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local vote = cjson.decode(raw)
local patch = cjson.decode(ARGV[1])

if patch.multivote ~= nil then vote.multivote = patch.multivote end
if patch.writein_allowed ~= nil then vote.writein_allowed = patch.writein_allowed end
if patch.votes_hidden ~= nil then vote.votes_hidden = patch.votes_hidden end

if patch.set_close then
    if patch.close_time then
        vote.close_time = patch.close_time
        redis.call('ZADD', KEYS[2], patch.close_ms, ARGV[2])
    else
        vote.close_time = nil
        redis.call('ZREM', KEYS[2], ARGV[2])
    end
end

redis.call('SET', KEYS[1], cjson.encode(vote))
return 1
";

/// Append a chat message if its dedup token is unseen.
///
/// `KEYS[1]` = dedup zset, `KEYS[2]` = channel ring, `KEYS[3]` = flush
/// worklist; `ARGV[1]` = token, `ARGV[2]` = microsecond score, `ARGV[3]` =
/// message JSON, `ARGV[4]` = ring capacity, `ARGV[5]` = channel id.
/// Returns `1` if appended, `0` for a duplicate.
pub const CHAT_APPEND: &str = r"
if redis.call('ZSCORE', KEYS[1], ARGV[1]) then return 0 end
redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
redis.call('RPUSH', KEYS[2], ARGV[3])
redis.call('LTRIM', KEYS[2], -tonumber(ARGV[4]), -1)
redis.call('SADD', KEYS[3], ARGV[5])
return 1
";
